use crate::gpu::{
    GpuApi, GpuError, ProgramId, ProgramKind, QuadDraw, QuadUniforms, ResourceBin, Scoped,
    TextureId,
};

use super::{Mat4, OffscreenTarget, QUAD_POSITIONS, QUAD_TEX_COORDS};

/// First pass: copies the external stream texture into an offscreen 2D
/// texture that ordinary samplers can read.
#[derive(Debug)]
pub struct CameraPass {
    program: Scoped<ProgramId>,
    target: OffscreenTarget,
    input: TextureId,
}

impl CameraPass {
    pub fn new(
        gpu: &mut dyn GpuApi,
        bin: &ResourceBin,
        input: TextureId,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuError> {
        Ok(Self {
            program: bin.adopt(gpu.create_program(ProgramKind::ExternalCopy)?),
            target: OffscreenTarget::new(gpu, bin, width, height)?,
            input,
        })
    }

    /// Renders into the offscreen target and leaves it bound.
    pub fn draw(&self, gpu: &mut dyn GpuApi, clear: [f32; 4]) -> Result<(), GpuError> {
        self.target.bind(gpu)?;
        gpu.clear(clear)?;
        gpu.draw_quad(&QuadDraw {
            program: self.program.get(),
            matrix: &Mat4::IDENTITY,
            positions: &QUAD_POSITIONS,
            tex_coords: &QUAD_TEX_COORDS,
            textures: [Some(self.input), None],
            uniforms: QuadUniforms::default(),
        })
    }

    pub fn output(&self) -> TextureId {
        self.target.texture()
    }
}
