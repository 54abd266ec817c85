use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::gpu::{GpuApi, GpuError, ResourceBin};

use super::{ColorPass, FilterState, Mat4, OffscreenTarget};

/// Raw RGBA8 pixels of one captured frame, bottom row first.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl CapturedImage {
    /// Row `y`, counted from the bottom.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * 4;
        let start = y as usize * stride;
        &self.pixels[start..start + stride]
    }

    /// Pixels reordered top row first, the layout image encoders expect.
    pub fn to_top_down(&self) -> Vec<u8> {
        (0..self.height)
            .rev()
            .flat_map(|y| self.row(y).iter().copied())
            .collect()
    }
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Receives captured frames. Called on the render thread, so heavy work
/// (encoding, disk I/O) belongs on another thread.
pub trait CaptureSink: Send + Sync {
    fn on_image_available(&self, image: CapturedImage);
}

impl<F> CaptureSink for F
where
    F: Fn(CapturedImage) + Send + Sync,
{
    fn on_image_available(&self, image: CapturedImage) {
        self(image)
    }
}

/// One-shot capture flag plus a completion counter, shared by the pipeline
/// handle and the compositor.
#[derive(Debug, Clone, Default)]
pub struct CaptureRequest {
    pending: Arc<AtomicBool>,
    completed: Arc<AtomicU64>,
}

impl CaptureRequest {
    pub fn request(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clears the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    fn mark_completed(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }
}

/// Orientation of an exported still relative to the live preview: a quarter
/// turn clockwise and a horizontal mirror on top of the preview transform.
pub fn capture_matrix(base: &Mat4) -> Mat4 {
    base.rotated(-90.0, 0.0, 0.0, 1.0).flipped(true, false)
}

/// Redirects the color pass into a capture-sized target and reads it back.
pub struct SnapshotCapturer {
    target: OffscreenTarget,
    sink: Arc<dyn CaptureSink>,
}

impl SnapshotCapturer {
    pub fn new(
        gpu: &mut dyn GpuApi,
        bin: &ResourceBin,
        width: u32,
        height: u32,
        sink: Arc<dyn CaptureSink>,
    ) -> Result<Self, GpuError> {
        Ok(Self {
            target: OffscreenTarget::new(gpu, bin, width, height)?,
            sink,
        })
    }

    pub fn capture(
        &self,
        gpu: &mut dyn GpuApi,
        pass: &ColorPass,
        base: &Mat4,
        filter: &FilterState,
        clear: [f32; 4],
        request: &CaptureRequest,
    ) -> Result<(), GpuError> {
        let (width, height) = self.target.size();
        self.target.bind(gpu)?;
        pass.draw(gpu, &capture_matrix(base), filter, clear)?;
        let pixels = gpu.read_pixels(width, height)?;
        gpu.bind_framebuffer(None)?;

        log::debug!("captured {width}x{height} frame");
        self.sink.on_image_available(CapturedImage {
            width,
            height,
            pixels,
        });
        request.mark_completed();
        Ok(())
    }
}

impl fmt::Debug for SnapshotCapturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCapturer")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
