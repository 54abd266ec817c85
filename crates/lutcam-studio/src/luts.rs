//! Filters the studio can cycle through.

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;
use lutcam_engine::render::{FilterDir, ImageLutLoader, LutRoots, LutSource, lut};

/// Procedural tables registered with the loader at startup.
pub fn bundled() -> Vec<(&'static str, RgbaImage)> {
    vec![
        ("identity", lut::identity_lut()),
        ("teal-orange", lut::lut_from_fn(teal_orange)),
        ("mono", lut::lut_from_fn(mono)),
        ("warm", lut::lut_from_fn(|[r, g, b]| [r * 1.08 + 0.03, g, b * 0.85])),
        ("invert", lut::lut_from_fn(|[r, g, b]| [1.0 - r, 1.0 - g, 1.0 - b])),
    ]
}

fn luma([r, g, b]: [f32; 3]) -> f32 {
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

fn mono(rgb: [f32; 3]) -> [f32; 3] {
    let y = luma(rgb);
    [y, y, y]
}

/// Pushes shadows toward teal and highlights toward orange.
fn teal_orange(rgb: [f32; 3]) -> [f32; 3] {
    let y = luma(rgb);
    let shadow = [0.0, 0.45, 0.5];
    let highlight = [1.0, 0.6, 0.3];
    std::array::from_fn(|i| {
        let tint = shadow[i] * (1.0 - y) + highlight[i] * y;
        rgb[i] * 0.7 + tint * 0.3
    })
}

/// The ordered filter list plus a loader that can resolve every entry.
pub struct FilterBank {
    pub names: Vec<String>,
    pub sources: Vec<LutSource>,
    pub loader: Arc<ImageLutLoader>,
}

impl FilterBank {
    pub fn new(files: &[PathBuf]) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut loader = ImageLutLoader::new(LutRoots::new(cwd, std::env::temp_dir()));
        let mut names = Vec::new();
        let mut sources = Vec::new();

        for (name, table) in bundled() {
            loader = loader.with_bundled(name, table);
            names.push(name.to_string());
            sources.push(LutSource::bundled(name));
        }
        for path in files {
            names.push(path.display().to_string());
            sources.push(LutSource::file(path.clone(), FilterDir::Support));
        }

        Self {
            names,
            sources,
            loader: Arc::new(loader),
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Index after `current`, wrapping; the first entry when nothing is active.
    pub fn next(&self, current: Option<usize>) -> Option<usize> {
        if self.sources.is_empty() {
            return None;
        }
        Some(current.map_or(0, |i| (i + 1) % self.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_follow_bundled_tables() {
        let bank = FilterBank::new(&[PathBuf::from("film.png")]);
        assert_eq!(bank.len(), bundled().len() + 1);
        assert_eq!(bank.names[0], "identity");
        assert_eq!(
            bank.sources.last(),
            Some(&LutSource::file("film.png", FilterDir::Support))
        );
    }

    #[test]
    fn next_wraps_around() {
        let bank = FilterBank::new(&[]);
        assert_eq!(bank.next(None), Some(0));
        assert_eq!(bank.next(Some(bank.len() - 1)), Some(0));
        assert_eq!(bank.next(Some(1)), Some(2));
    }

    #[test]
    fn mono_is_gray() {
        let [r, g, b] = mono([0.9, 0.1, 0.4]);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }
}
