//! [`GraphicsPlatform`](crate::device::GraphicsPlatform) implementations.
//!
//! [`headless`] runs on the CPU and presents into memory; [`native`] drives
//! a wgpu device and presents to winit windows.

pub mod headless;
pub mod native;
