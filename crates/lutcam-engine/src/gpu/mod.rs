//! GL-call interface.
//!
//! Everything the compositor does to the GPU goes through [`GpuApi`]: typed
//! handles instead of raw integers, one call per GL-level operation. The
//! headless backend implements it on the CPU ([`software::SoftwareGpu`]),
//! the wgpu backend on a real device.
//!
//! Handles are only meaningful for the context that created them. Objects
//! owned by long-lived passes are wrapped in [`Scoped`], which returns the
//! handle to a [`ResourceBin`] on drop; the bin is emptied on the render
//! thread where a context is current.

mod api;
mod error;
mod resources;
pub mod software;

pub use api::{
    FilterMode, FramebufferId, GpuApi, ProgramId, ProgramKind, QuadDraw, QuadUniforms,
    TextureDesc, TextureId, TextureKind,
};
pub(crate) use api::validate_bindings;
pub use error::GpuError;
pub use resources::{GpuHandle, ResourceBin, Scoped};
