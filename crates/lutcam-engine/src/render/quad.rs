//! Full-screen quad geometry, triangle-fan order: upper-left, lower-left,
//! lower-right, upper-right.

pub const QUAD_POSITIONS: [[f32; 3]; 4] = [
    [-1.0, 1.0, 0.0],
    [-1.0, -1.0, 0.0],
    [1.0, -1.0, 0.0],
    [1.0, 1.0, 0.0],
];

/// Texture coordinates matching [`QUAD_POSITIONS`]; t = 0 is the first row
/// of texture memory and sits at the bottom edge.
///
/// Frames arrive top row first, so after the camera pass the offscreen image
/// is upside down in GL terms. The color pass matrix flips it back.
pub const QUAD_TEX_COORDS: [[f32; 2]; 4] = [[0.0, 1.0], [0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];

/// Index list turning the fan into two triangles.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];
