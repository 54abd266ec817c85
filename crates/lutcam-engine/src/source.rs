//! Producers of the external frames the compositor samples.
//!
//! A [`TextureSource`] is handed the compositor's external texture when a
//! context comes up. It pushes new content into that texture on the render
//! thread (`import_latest`, called at the start of every draw) and uses the
//! [`RenderRequester`] to wake the render thread whenever a frame arrives.

use parking_lot::Mutex;
use thiserror::Error;

use crate::gpu::{GpuApi, GpuError, TextureId};
use crate::thread::RenderRequester;

pub trait TextureSource: Send + Sync {
    /// Binds the source to `texture` of a freshly created context.
    fn attach(&self, texture: TextureId, width: u32, height: u32, on_frame: RenderRequester);

    /// Applies the most recent frame, if any arrived since the last call.
    fn import_latest(&self, gpu: &mut dyn GpuApi, texture: TextureId) -> Result<(), GpuError>;

    /// The context is going away; stop touching its texture.
    fn detach(&self);
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("frame of {width}x{height} needs {expected} bytes, got {got}")]
pub struct FrameSizeError {
    pub width: u32,
    pub height: u32,
    pub expected: usize,
    pub got: usize,
}

/// One RGBA8 frame, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, FrameSizeError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(FrameSizeError {
                width,
                height,
                expected,
                got: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }
}

#[derive(Default)]
struct SourceState {
    attached: Option<(TextureId, u32, u32)>,
    requester: Option<RenderRequester>,
    latest: Option<Frame>,
    imported: u64,
    dropped: u64,
}

/// Latest-frame mailbox fed from the CPU.
///
/// Producers call [`CpuFrameSource::push_frame`] from any thread. Only the
/// newest frame is kept; older unimported ones are counted as dropped.
#[derive(Default)]
pub struct CpuFrameSource {
    state: Mutex<SourceState>,
}

impl CpuFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&self, frame: Frame) {
        let requester = {
            let mut state = self.state.lock();
            if state.latest.replace(frame).is_some() {
                state.dropped += 1;
            }
            state.requester.clone()
        };
        if let Some(requester) = requester {
            requester.request_render();
        }
    }

    pub fn frames_imported(&self) -> u64 {
        self.state.lock().imported
    }

    pub fn frames_dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached.is_some()
    }
}

impl TextureSource for CpuFrameSource {
    fn attach(&self, texture: TextureId, width: u32, height: u32, on_frame: RenderRequester) {
        let mut state = self.state.lock();
        state.attached = Some((texture, width, height));
        state.requester = Some(on_frame);
    }

    fn import_latest(&self, gpu: &mut dyn GpuApi, texture: TextureId) -> Result<(), GpuError> {
        let frame = {
            let mut state = self.state.lock();
            let Some((_, width, height)) = state.attached else {
                return Ok(());
            };
            match state.latest.take() {
                Some(frame) if (frame.width, frame.height) == (width, height) => frame,
                Some(frame) => {
                    log::warn!(
                        "dropping {}x{} frame, source texture is {width}x{height}",
                        frame.width,
                        frame.height
                    );
                    state.dropped += 1;
                    return Ok(());
                }
                None => return Ok(()),
            }
        };
        gpu.upload_texture(texture, frame.width, frame.height, &frame.rgba)?;
        self.state.lock().imported += 1;
        Ok(())
    }

    fn detach(&self) {
        let mut state = self.state.lock();
        state.attached = None;
        state.requester = None;
    }
}
