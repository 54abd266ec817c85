use thiserror::Error;

use super::{ProgramKind, TextureKind};

/// Failure of a single GL-level call.
///
/// These are recoverable from the render thread's point of view: the frame
/// that hit one is logged and skipped, the loop carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("unknown texture handle {0}")]
    UnknownTexture(u32),

    #[error("unknown framebuffer handle {0}")]
    UnknownFramebuffer(u32),

    #[error("unknown program handle {0}")]
    UnknownProgram(u32),

    #[error("{program:?} cannot sample a {found:?} texture on unit {unit}")]
    SamplerMismatch {
        program: ProgramKind,
        unit: usize,
        found: TextureKind,
    },

    #[error("{program:?} needs a texture bound on unit {unit}")]
    MissingTexture { program: ProgramKind, unit: usize },

    #[error("texture {0} is sampled while attached to the bound framebuffer")]
    FeedbackLoop(u32),

    #[error("texture dimensions must be non-zero")]
    ZeroSize,

    #[error("upload of {got} bytes does not fit a {width}x{height} RGBA texture")]
    SizeMismatch { width: u32, height: u32, got: usize },

    #[error("pixel readback failed: {0}")]
    Readback(String),

    #[error("presentable surface has no frame: {0}")]
    SurfaceUnavailable(String),
}
