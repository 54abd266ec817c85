use crate::render::Mat4;

use super::GpuError;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Backend-specific name of the object.
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// Texture object of the current context.
    TextureId
);
handle!(
    /// Framebuffer object with one color attachment.
    FramebufferId
);
handle!(
    /// Linked shader program.
    ProgramId
);

/// What a texture holds and therefore which samplers may read it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureKind {
    /// Externally produced frames (camera stream). Sampled only by
    /// [`ProgramKind::ExternalCopy`].
    External,
    /// Ordinary RGBA8 2D texture: offscreen targets and lookup images.
    Color2d,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextureDesc {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
}

impl TextureDesc {
    /// Color attachment for an offscreen pass.
    pub fn color(width: u32, height: u32) -> Self {
        Self {
            kind: TextureKind::Color2d,
            width,
            height,
            min_filter: FilterMode::Nearest,
            mag_filter: FilterMode::Linear,
        }
    }

    /// Stream texture fed by a frame producer.
    pub fn external(width: u32, height: u32) -> Self {
        Self {
            kind: TextureKind::External,
            width,
            height,
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
        }
    }

    /// Lookup image. Must be sampled nearest so cells never bleed into each other.
    pub fn lookup(width: u32, height: u32) -> Self {
        Self {
            kind: TextureKind::Color2d,
            width,
            height,
            min_filter: FilterMode::Nearest,
            mag_filter: FilterMode::Nearest,
        }
    }
}

/// The two shader programs the pipeline knows about.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ProgramKind {
    /// Copies an external stream texture (unit 0) into the bound target.
    ExternalCopy,
    /// Samples a 2D texture (unit 0) and optionally grades it through a
    /// lookup image (unit 1).
    ColorLut,
}

impl ProgramKind {
    fn sampler(self, unit: usize) -> Option<TextureKind> {
        match (self, unit) {
            (ProgramKind::ExternalCopy, 0) => Some(TextureKind::External),
            (ProgramKind::ColorLut, 0 | 1) => Some(TextureKind::Color2d),
            _ => None,
        }
    }

    fn requires(self, unit: usize) -> bool {
        unit == 0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct QuadUniforms {
    pub filter_enabled: bool,
    pub intensity: f32,
}

/// One full-quad draw: four vertices in triangle-fan order.
#[derive(Debug, Copy, Clone)]
pub struct QuadDraw<'a> {
    pub program: ProgramId,
    pub matrix: &'a Mat4,
    pub positions: &'a [[f32; 3]; 4],
    pub tex_coords: &'a [[f32; 2]; 4],
    /// Texture units 0 and 1.
    pub textures: [Option<TextureId>; 2],
    pub uniforms: QuadUniforms,
}

/// GL-level operations used by the compositor.
///
/// All calls must come from the thread on which the owning context is
/// current; implementations are `Send` so the context can move to its render
/// thread, never shared.
pub trait GpuApi: Send {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError>;

    /// Replaces the full contents of `texture`. `rgba` rows go from t = 0 upward.
    fn upload_texture(
        &mut self,
        texture: TextureId,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<(), GpuError>;

    fn delete_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self, color: TextureId) -> Result<FramebufferId, GpuError>;

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    fn create_program(&mut self, kind: ProgramKind) -> Result<ProgramId, GpuError>;

    fn delete_program(&mut self, program: ProgramId);

    /// `None` binds the presentable surface.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<(), GpuError>;

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);

    fn clear(&mut self, color: [f32; 4]) -> Result<(), GpuError>;

    fn draw_quad(&mut self, draw: &QuadDraw<'_>) -> Result<(), GpuError>;

    /// Reads `width x height` RGBA8 pixels from the origin of the bound
    /// framebuffer, bottom row first.
    fn read_pixels(&mut self, width: u32, height: u32) -> Result<Vec<u8>, GpuError>;
}

/// Checks the texture bindings of a draw against the program's samplers and
/// the current color attachment.
pub(crate) fn validate_bindings(
    program: ProgramKind,
    textures: &[Option<(TextureId, TextureKind)>; 2],
    attachment: Option<TextureId>,
) -> Result<(), GpuError> {
    for (unit, binding) in textures.iter().enumerate() {
        match (binding, program.sampler(unit)) {
            (None, _) if program.requires(unit) => {
                return Err(GpuError::MissingTexture { program, unit });
            }
            (None, _) => {}
            (Some((_, found)), expected) if expected != Some(*found) => {
                return Err(GpuError::SamplerMismatch {
                    program,
                    unit,
                    found: *found,
                });
            }
            (Some((id, _)), _) if Some(*id) == attachment => {
                return Err(GpuError::FeedbackLoop(id.0));
            }
            (Some(_), _) => {}
        }
    }
    Ok(())
}
