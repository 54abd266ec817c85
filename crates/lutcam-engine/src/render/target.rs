use crate::gpu::{FramebufferId, GpuApi, GpuError, ResourceBin, Scoped, TextureDesc, TextureId};

/// Framebuffer with a single RGBA color texture.
#[derive(Debug)]
pub struct OffscreenTarget {
    // Field order matters: the framebuffer is queued for deletion before its
    // attachment.
    framebuffer: Scoped<FramebufferId>,
    texture: Scoped<TextureId>,
    width: u32,
    height: u32,
}

impl OffscreenTarget {
    pub fn new(
        gpu: &mut dyn GpuApi,
        bin: &ResourceBin,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuError> {
        let texture = bin.adopt(gpu.create_texture(&TextureDesc::color(width, height))?);
        let framebuffer = bin.adopt(gpu.create_framebuffer(texture.get())?);
        Ok(Self {
            framebuffer,
            texture,
            width,
            height,
        })
    }

    pub fn bind(&self, gpu: &mut dyn GpuApi) -> Result<(), GpuError> {
        gpu.bind_framebuffer(Some(self.framebuffer.get()))
    }

    pub fn texture(&self) -> TextureId {
        self.texture.get()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
