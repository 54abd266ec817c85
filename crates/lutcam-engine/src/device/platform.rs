use crate::gpu::GpuApi;

use super::{ConfigAttribs, SessionError, SurfaceError, SwapStatus};

/// Something a window surface can be created for.
pub trait OutputTarget: Clone + Send + Sync + 'static {
    /// Pins the target's buffer size; the pipeline renders at a fixed size.
    fn set_fixed_size(&self, width: u32, height: u32);

    /// Current size in physical pixels.
    fn size(&self) -> (u32, u32);
}

/// Native graphics bring-up: displays, framebuffer configs, contexts,
/// window surfaces and presentation.
///
/// One implementation per platform layer. The trait mirrors the life cycle
/// the render thread drives, not any particular native API; everything that
/// can fail recoverably returns a status instead of an error.
pub trait GraphicsPlatform: Send + 'static {
    type Display: Send;
    type Config: Send;
    type Context: Send;
    type Surface: Send;
    type Gl: GpuApi + 'static;
    type Target: OutputTarget;

    fn get_display(&mut self) -> Result<Self::Display, SessionError>;

    /// Returns the implementation's `(major, minor)` version.
    fn initialize(&mut self, display: &Self::Display) -> Result<(u32, u32), SessionError>;

    /// Every config the display offers, in the platform's preference order.
    fn configs(
        &mut self,
        display: &Self::Display,
    ) -> Result<Vec<(Self::Config, ConfigAttribs)>, SessionError>;

    fn create_context(
        &mut self,
        display: &Self::Display,
        config: &Self::Config,
        client_version: u32,
    ) -> Result<Self::Context, SessionError>;

    fn create_surface(
        &mut self,
        display: &Self::Display,
        config: &Self::Config,
        target: &Self::Target,
    ) -> Result<Self::Surface, SurfaceError>;

    /// Binds `surface` and `context` to the calling thread, or unbinds with
    /// `None`.
    fn make_current(
        &mut self,
        display: &Self::Display,
        current: Option<(&mut Self::Surface, &Self::Context)>,
    ) -> Result<(), SurfaceError>;

    /// GL entry points for the current context and surface.
    fn create_gl(&mut self, context: &Self::Context, surface: &Self::Surface) -> Self::Gl;

    fn swap_buffers(&mut self, display: &Self::Display, surface: &mut Self::Surface)
    -> SwapStatus;

    fn destroy_surface(&mut self, display: &Self::Display, surface: Self::Surface);

    fn destroy_context(
        &mut self,
        display: &Self::Display,
        context: Self::Context,
    ) -> Result<(), SessionError>;

    fn terminate(&mut self, display: Self::Display);
}
