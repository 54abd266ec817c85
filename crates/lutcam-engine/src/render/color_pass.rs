use crate::gpu::{
    GpuApi, GpuError, ProgramId, ProgramKind, QuadDraw, QuadUniforms, ResourceBin, Scoped,
    TextureId,
};

use super::{FilterState, Mat4, QUAD_POSITIONS, QUAD_TEX_COORDS};

/// Second pass: samples the camera pass output and grades it through the
/// current lookup table into whatever framebuffer is bound.
#[derive(Debug)]
pub struct ColorPass {
    program: Scoped<ProgramId>,
    input: TextureId,
}

impl ColorPass {
    pub fn new(
        gpu: &mut dyn GpuApi,
        bin: &ResourceBin,
        input: TextureId,
    ) -> Result<Self, GpuError> {
        Ok(Self {
            program: bin.adopt(gpu.create_program(ProgramKind::ColorLut)?),
            input,
        })
    }

    pub fn draw(
        &self,
        gpu: &mut dyn GpuApi,
        matrix: &Mat4,
        filter: &FilterState,
        clear: [f32; 4],
    ) -> Result<(), GpuError> {
        gpu.clear(clear)?;
        gpu.draw_quad(&QuadDraw {
            program: self.program.get(),
            matrix,
            positions: &QUAD_POSITIONS,
            tex_coords: &QUAD_TEX_COORDS,
            textures: [Some(self.input), filter.lut_texture()],
            uniforms: QuadUniforms {
                filter_enabled: filter.enabled(),
                intensity: filter.intensity(),
            },
        })
    }
}
