//! 3D color lookup tables stored as 2D images.
//!
//! A table is a 512x512 image holding 64 cells of 64x64 texels, eight cells
//! per row. Cell `n` (row-major) holds every color whose blue channel
//! quantizes to `n`; inside a cell red grows along x and green along the rows.

use image::RgbaImage;

/// Edge length of a lookup image, in texels.
pub const LUT_SIZE: u32 = 512;
/// Quantization steps per channel.
pub const LUT_STEPS: u32 = 64;
const CELLS_PER_ROW: u32 = LUT_SIZE / LUT_STEPS;

/// Maps `color` through the table read by `sample(s, t)`.
///
/// Blue selects two neighbouring cells, red/green address a texel center in
/// each, and the two lookups are mixed by the fractional part of blue. Alpha
/// is taken from the table.
pub fn grade(color: [f32; 4], sample: impl Fn(f32, f32) -> [f32; 4]) -> [f32; 4] {
    let blue = color[2] * (LUT_STEPS - 1) as f32;
    let cells = CELLS_PER_ROW as f32;
    let cell = |index: f32| {
        let row = (index / cells).floor();
        [index - row * cells, row]
    };
    let lo = cell(blue.floor());
    let hi = cell(blue.ceil());

    let cell_extent = 1.0 / cells;
    let half_texel = 0.5 / LUT_SIZE as f32;
    let span = cell_extent - 1.0 / LUT_SIZE as f32;
    let coord = |q: [f32; 2]| {
        [
            q[0] * cell_extent + half_texel + span * color[0],
            q[1] * cell_extent + half_texel + span * color[1],
        ]
    };

    let [s1, t1] = coord(lo);
    let [s2, t2] = coord(hi);
    mix(sample(s1, t1), sample(s2, t2), blue.fract())
}

/// Blends the graded color over the original. Only RGB is graded; alpha
/// stays the source's. Exact at both ends of the intensity range.
pub fn blend(color: [f32; 4], graded: [f32; 4], intensity: f32) -> [f32; 4] {
    let mut out = mix(color, graded, intensity);
    out[3] = color[3];
    out
}

fn mix(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|i| a[i] * (1.0 - t) + b[i] * t)
}

/// Builds a lookup image from a per-color transform on normalized RGB.
pub fn lut_from_fn(transform: impl Fn([f32; 3]) -> [f32; 3]) -> RgbaImage {
    let step = (LUT_STEPS - 1) as f32;
    RgbaImage::from_fn(LUT_SIZE, LUT_SIZE, |x, y| {
        let blue = (y / LUT_STEPS) * CELLS_PER_ROW + x / LUT_STEPS;
        let rgb = [
            (x % LUT_STEPS) as f32 / step,
            (y % LUT_STEPS) as f32 / step,
            blue as f32 / step,
        ];
        let [r, g, b] = transform(rgb).map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
        image::Rgba([r, g, b, 255])
    })
}

/// The table that maps every color to itself (up to 6-bit quantization).
pub fn identity_lut() -> RgbaImage {
    lut_from_fn(|rgb| rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(img: &RgbaImage) -> impl Fn(f32, f32) -> [f32; 4] + '_ {
        move |s, t| {
            let x = ((s * LUT_SIZE as f32) as u32).min(LUT_SIZE - 1);
            let y = ((t * LUT_SIZE as f32) as u32).min(LUT_SIZE - 1);
            img.get_pixel(x, y).0.map(|c| c as f32 / 255.0)
        }
    }

    #[test]
    fn identity_table_preserves_primaries() {
        let lut = identity_lut();
        for color in [
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 1.0],
            [1.0, 1.0, 1.0, 1.0],
            [0.0, 0.0, 0.0, 1.0],
        ] {
            let out = grade(color, sampler(&lut));
            for (a, b) in out.iter().zip(color) {
                assert!((a - b).abs() < 1e-6, "{color:?} -> {out:?}");
            }
        }
    }

    #[test]
    fn blue_selects_cells_row_major() {
        // cell 9 sits in the second row, second column
        let lut = lut_from_fn(|[_, _, b]| [b, 0.0, 0.0]);
        let px = lut.get_pixel(64 + 3, 64 + 5);
        assert_eq!(px.0[0], (9.0f32 / 63.0 * 255.0).round() as u8);
    }

    #[test]
    fn constant_table_grades_everything_to_one_color() {
        let lut = lut_from_fn(|_| [0.2, 0.4, 0.6]);
        let out = grade([0.37, 0.81, 0.52, 1.0], sampler(&lut));
        let expect = [51.0, 102.0, 153.0].map(|v: f32| v / 255.0);
        for (a, b) in out.iter().zip(expect) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn blend_is_exact_at_the_ends() {
        let c = [0.3, 0.7, 0.1, 0.5];
        let g = [0.9, 0.2, 0.4, 1.0];
        assert_eq!(blend(c, g, 0.0), c);
        assert_eq!(blend(c, g, 1.0), [0.9, 0.2, 0.4, 0.5]);
    }
}
