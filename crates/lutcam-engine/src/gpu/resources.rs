use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{FramebufferId, GpuApi, ProgramId, TextureId};

/// Any GPU object that can be scheduled for deletion.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GpuHandle {
    Texture(TextureId),
    Framebuffer(FramebufferId),
    Program(ProgramId),
}

impl From<TextureId> for GpuHandle {
    fn from(id: TextureId) -> Self {
        GpuHandle::Texture(id)
    }
}

impl From<FramebufferId> for GpuHandle {
    fn from(id: FramebufferId) -> Self {
        GpuHandle::Framebuffer(id)
    }
}

impl From<ProgramId> for GpuHandle {
    fn from(id: ProgramId) -> Self {
        GpuHandle::Program(id)
    }
}

impl GpuHandle {
    fn delete(self, gpu: &mut dyn GpuApi) {
        match self {
            GpuHandle::Texture(id) => gpu.delete_texture(id),
            GpuHandle::Framebuffer(id) => gpu.delete_framebuffer(id),
            GpuHandle::Program(id) => gpu.delete_program(id),
        }
    }
}

#[derive(Debug, Default)]
struct BinState {
    generation: u64,
    pending: Vec<GpuHandle>,
}

/// Deferred deletion queue for objects of one context.
///
/// Dropping a [`Scoped`] handle can happen anywhere; the actual delete call
/// is issued by [`ResourceBin::collect`] on the render thread. When the
/// context itself goes away its objects die with it, so
/// [`ResourceBin::invalidate`] discards the queue and bumps the generation:
/// handles adopted before that point are silently forgotten on drop.
#[derive(Clone, Default)]
pub struct ResourceBin {
    state: Arc<Mutex<BinState>>,
}

impl ResourceBin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adopt<H>(&self, handle: H) -> Scoped<H>
    where
        H: Into<GpuHandle> + Copy,
    {
        Scoped {
            handle,
            generation: self.state.lock().generation,
            bin: self.clone(),
        }
    }

    /// Deletes everything dropped since the last collection. Returns the
    /// number of objects deleted.
    pub fn collect(&self, gpu: &mut dyn GpuApi) -> usize {
        let pending = std::mem::take(&mut self.state.lock().pending);
        let count = pending.len();
        for handle in pending {
            handle.delete(gpu);
        }
        if count > 0 {
            log::trace!("deleted {count} gpu objects");
        }
        count
    }

    /// Marks every outstanding handle as belonging to a dead context.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        state.pending.clear();
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn release(&self, handle: GpuHandle, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.pending.push(handle);
        }
    }
}

impl fmt::Debug for ResourceBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResourceBin")
            .field("generation", &state.generation)
            .field("pending", &state.pending.len())
            .finish()
    }
}

/// Owning wrapper around a GPU handle; queues the object for deletion when
/// dropped.
pub struct Scoped<H>
where
    H: Into<GpuHandle> + Copy,
{
    handle: H,
    generation: u64,
    bin: ResourceBin,
}

impl<H> Scoped<H>
where
    H: Into<GpuHandle> + Copy,
{
    pub fn get(&self) -> H {
        self.handle
    }
}

impl<H> Drop for Scoped<H>
where
    H: Into<GpuHandle> + Copy,
{
    fn drop(&mut self) {
        self.bin.release(self.handle.into(), self.generation);
    }
}

impl<H> fmt::Debug for Scoped<H>
where
    H: Into<GpuHandle> + Copy + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scoped").field(&self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::TextureDesc;
    use crate::gpu::software::SoftwareGpu;

    #[test]
    fn dropped_handles_are_deleted_on_collect() {
        let mut gpu = SoftwareGpu::standalone(4, 4);
        let bin = ResourceBin::new();

        let tex = bin.adopt(gpu.create_texture(&TextureDesc::color(2, 2)).unwrap());
        let fbo = bin.adopt(gpu.create_framebuffer(tex.get()).unwrap());
        assert_eq!(gpu.device().lock().live_objects(), 2);

        drop(fbo);
        drop(tex);
        assert_eq!(bin.pending(), 2);
        assert_eq!(bin.collect(&mut gpu), 2);
        assert_eq!(gpu.device().lock().live_objects(), 0);
        assert_eq!(bin.collect(&mut gpu), 0);
    }

    #[test]
    fn handles_from_an_invalidated_context_are_forgotten() {
        let mut gpu = SoftwareGpu::standalone(4, 4);
        let bin = ResourceBin::new();

        let stale = bin.adopt(gpu.create_texture(&TextureDesc::color(2, 2)).unwrap());
        bin.invalidate();
        let fresh = bin.adopt(gpu.create_texture(&TextureDesc::color(2, 2)).unwrap());

        drop(stale);
        assert_eq!(bin.pending(), 0);
        drop(fresh);
        assert_eq!(bin.pending(), 1);
    }
}
