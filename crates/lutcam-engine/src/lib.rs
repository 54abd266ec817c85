//! LUT camera-filter engine.
//!
//! A camera (or any frame producer) feeds an external texture; every frame is
//! copied offscreen, graded through a 512x512 color lookup table and
//! presented on an output target, all on a dedicated render thread. Frames
//! can be captured back to memory on request.
//!
//! Layers, bottom up:
//! - [`gpu`]: the GL-call interface and a software implementation of it
//! - [`device`]: display/context/surface bring-up behind [`device::GraphicsPlatform`]
//! - [`backend`]: the headless and wgpu platforms
//! - [`render`]: the two-pass frame compositor, lookup tables and capture
//! - [`thread`]: the render thread and its lifecycle rules
//! - [`pipeline`]: [`FilterPipeline`], the facade applications use

pub mod backend;
pub mod device;
pub mod gpu;
pub mod logging;
pub mod pipeline;
pub mod render;
pub mod source;
pub mod thread;
pub mod time;

pub use pipeline::{Collaborators, FilterPipeline, PipelineConfig, PipelineError};
