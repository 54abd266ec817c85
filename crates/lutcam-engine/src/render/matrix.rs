/// 4x4 transform in column-major order, the layout GL uniforms expect.
///
/// Builder methods post-multiply: `m.rotated(..)` yields `m * R`, so the last
/// operation applied in code is the first one applied to a vertex.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mat4(pub [f32; 16]);

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    #[inline]
    fn at(&self, row: usize, col: usize) -> f32 {
        self.0[col * 4 + row]
    }

    pub fn mul(&self, rhs: &Mat4) -> Mat4 {
        let mut out = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = (0..4).map(|k| self.at(row, k) * rhs.at(k, col)).sum();
            }
        }
        Mat4(out)
    }

    pub fn scaled(&self, x: f32, y: f32, z: f32) -> Mat4 {
        let mut out = self.0;
        for (col, factor) in [x, y, z].into_iter().enumerate() {
            for row in 0..4 {
                out[col * 4 + row] *= factor;
            }
        }
        Mat4(out)
    }

    /// Mirrors across the vertical (`x`) and/or horizontal (`y`) axis.
    pub fn flipped(&self, x: bool, y: bool) -> Mat4 {
        let sign = |flip: bool| if flip { -1.0 } else { 1.0 };
        self.scaled(sign(x), sign(y), 1.0)
    }

    /// Rotation by `degrees` around the axis `(x, y, z)`.
    ///
    /// Multiples of 90 degrees produce exact 0/±1 entries, so quarter turns
    /// compose and invert without drift.
    pub fn rotated(&self, degrees: f32, x: f32, y: f32, z: f32) -> Mat4 {
        self.mul(&Mat4::rotation(degrees, x, y, z))
    }

    pub fn rotation(degrees: f32, x: f32, y: f32, z: f32) -> Mat4 {
        let (s, c) = sin_cos_degrees(degrees);
        let len = (x * x + y * y + z * z).sqrt();
        if len == 0.0 {
            return Mat4::IDENTITY;
        }
        let (x, y, z) = (x / len, y / len, z / len);
        let nc = 1.0 - c;

        let mut m = Mat4::IDENTITY.0;
        m[0] = x * x * nc + c;
        m[1] = x * y * nc + z * s;
        m[2] = z * x * nc - y * s;
        m[4] = x * y * nc - z * s;
        m[5] = y * y * nc + c;
        m[6] = y * z * nc + x * s;
        m[8] = z * x * nc + y * s;
        m[9] = y * z * nc - x * s;
        m[10] = z * z * nc + c;
        Mat4(m)
    }

    pub fn transform_point(&self, p: [f32; 3]) -> [f32; 4] {
        let v = [p[0], p[1], p[2], 1.0];
        std::array::from_fn(|row| (0..4).map(|k| self.at(row, k) * v[k]).sum())
    }

    /// Columns as nested arrays, the shape shader uniform structs use.
    pub fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        std::array::from_fn(|col| std::array::from_fn(|row| self.at(row, col)))
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Mat4::IDENTITY
    }
}

fn sin_cos_degrees(degrees: f32) -> (f32, f32) {
    let turns = degrees / 90.0;
    if turns.fract() == 0.0 {
        match (turns as i64).rem_euclid(4) {
            0 => (0.0, 1.0),
            1 => (1.0, 0.0),
            2 => (0.0, -1.0),
            _ => (-1.0, 0.0),
        }
    } else {
        degrees.to_radians().sin_cos()
    }
}
