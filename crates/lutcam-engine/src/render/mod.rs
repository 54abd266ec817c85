//! Frame compositing.
//!
//! Two passes per frame: [`CameraPass`] copies the external stream texture
//! into an offscreen target, [`ColorPass`] grades that target through a
//! lookup table onto the bound surface. [`FrameCompositor`] owns both plus
//! the [`SnapshotCapturer`], and is driven from the render thread.
//!
//! Conventions follow GL: column-major matrices, NDC y up, texture t = 0 at
//! the first row in memory.

mod camera_pass;
mod capture;
mod color_pass;
mod compositor;
mod filter;
pub mod lut;
mod matrix;
mod quad;
mod target;

pub use camera_pass::CameraPass;
pub use capture::{CaptureRequest, CaptureSink, CapturedImage, SnapshotCapturer, capture_matrix};
pub use color_pass::ColorPass;
pub use compositor::{CompositorConfig, CompositorParts, FrameCompositor, SourceKind};
pub use filter::{
    DEFAULT_INTENSITY, FilterDir, FilterState, ImageLutLoader, LutLoader, LutRoots, LutSource,
    SharedIntensity,
};
pub use lut::LUT_SIZE;
pub use matrix::Mat4;
pub use quad::{QUAD_INDICES, QUAD_POSITIONS, QUAD_TEX_COORDS};
pub use target::OffscreenTarget;
