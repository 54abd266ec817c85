use super::{ConfigSpec, GraphicsPlatform, SessionError, SurfaceError, SwapFailure, SwapStatus};

/// Owns one display connection, config, context and (optionally) window
/// surface, and sequences their creation and destruction.
///
/// Must live on the thread that renders with it. Every teardown method is
/// idempotent.
pub struct GraphicsContextSession<P: GraphicsPlatform> {
    platform: P,
    spec: ConfigSpec,
    display: Option<P::Display>,
    config: Option<P::Config>,
    context: Option<P::Context>,
    surface: Option<P::Surface>,
    // Bound to `surface`; dropped before it.
    gl: Option<P::Gl>,
}

impl<P: GraphicsPlatform> GraphicsContextSession<P> {
    pub fn new(platform: P, spec: ConfigSpec) -> Self {
        Self {
            platform,
            spec,
            display: None,
            config: None,
            context: None,
            surface: None,
            gl: None,
        }
    }

    /// Connects to the display, chooses a config and creates the context.
    /// No surface exists afterwards.
    pub fn start(&mut self) -> Result<(), SessionError> {
        log::debug!(
            "session start on {:?}",
            std::thread::current().name().unwrap_or("?")
        );
        self.destroy_surface();

        if self.display.is_none() {
            let display = self.platform.get_display()?;
            let (major, minor) = self.platform.initialize(&display)?;
            log::info!("graphics display initialized (v{major}.{minor})");
            self.display = Some(display);
        }
        let Some(display) = self.display.as_ref() else {
            return Err(SessionError::NoDisplay("display vanished during start".into()));
        };

        if self.config.is_none() {
            let configs = self.platform.configs(display)?;
            let offered = configs.len();
            let config = self
                .spec
                .choose(configs)
                .ok_or_else(|| SessionError::NoConfig(self.spec.to_string()))?;
            log::debug!("chose config for {} out of {offered}", self.spec);
            self.config = Some(config);
        }
        let Some(config) = self.config.as_ref() else {
            return Err(SessionError::NoConfig(self.spec.to_string()));
        };

        if self.context.is_none() {
            let context =
                self.platform
                    .create_context(display, config, self.spec.client_version)?;
            self.context = Some(context);
            log::debug!("context created");
        }
        Ok(())
    }

    /// Creates a window surface for `target` and makes it current with the
    /// context. Any previous surface is destroyed first.
    pub fn create_surface(&mut self, target: &P::Target) -> Result<(), SurfaceError> {
        self.destroy_surface();

        let (Some(display), Some(config), Some(context)) =
            (&self.display, &self.config, &self.context)
        else {
            return Err(SurfaceError::NoContext);
        };

        let mut surface = match self.platform.create_surface(display, config, target) {
            Ok(surface) => surface,
            Err(e) => {
                log::error!("create_surface failed: {e}");
                return Err(e);
            }
        };

        if let Err(e) = self
            .platform
            .make_current(display, Some((&mut surface, context)))
        {
            log::warn!("make_current failed: {e}");
            self.platform.destroy_surface(display, surface);
            return Err(e);
        }

        self.surface = Some(surface);
        Ok(())
    }

    /// GL entry points for the current surface. `None` without one.
    pub fn create_gl(&mut self) -> Option<&mut P::Gl> {
        let (Some(context), Some(surface)) = (&self.context, &self.surface) else {
            return None;
        };
        self.gl = Some(self.platform.create_gl(context, surface));
        self.gl.as_mut()
    }

    pub fn gl_mut(&mut self) -> Option<&mut P::Gl> {
        self.gl.as_mut()
    }

    /// Presents the back buffer.
    pub fn swap(&mut self) -> SwapStatus {
        match (&self.display, &mut self.surface) {
            (Some(display), Some(surface)) => self.platform.swap_buffers(display, surface),
            _ => SwapStatus::BadSurface(SwapFailure::BadSurface),
        }
    }

    pub fn destroy_surface(&mut self) {
        self.gl = None;
        let Some(surface) = self.surface.take() else {
            return;
        };
        if let Some(display) = &self.display {
            if let Err(e) = self.platform.make_current(display, None) {
                log::warn!("unbinding surface failed: {e}");
            }
            self.platform.destroy_surface(display, surface);
            log::debug!("surface destroyed");
        }
    }

    /// Destroys the context and disconnects from the display.
    ///
    /// Teardown continues past a failed context destruction; the error is
    /// returned afterwards.
    pub fn finish(&mut self) -> Result<(), SessionError> {
        self.destroy_surface();
        self.config = None;

        let Some(display) = self.display.take() else {
            self.context = None;
            return Ok(());
        };
        let result = match self.context.take() {
            Some(context) => self.platform.destroy_context(&display, context),
            None => Ok(()),
        };
        self.platform.terminate(display);
        log::debug!("session finished");
        result
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    pub fn spec(&self) -> &ConfigSpec {
        &self.spec
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }
}

impl<P: GraphicsPlatform> Drop for GraphicsContextSession<P> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("session teardown: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessPlatform, HeadlessTarget};
    use crate::device::{ConfigAttribs, Renderable};
    use crate::gpu::GpuApi;

    fn session() -> GraphicsContextSession<HeadlessPlatform> {
        GraphicsContextSession::new(HeadlessPlatform::new(), ConfigSpec::new(true, 3))
    }

    #[test]
    fn start_then_surface_then_swap() {
        let mut s = session();
        let target = HeadlessTarget::new(4, 4);
        s.start().unwrap();
        assert!(s.has_context());
        assert!(!s.has_surface());

        s.create_surface(&target).unwrap();
        let gl = s.create_gl().unwrap();
        gl.clear([0.0, 1.0, 0.0, 1.0]).unwrap();
        assert_eq!(s.swap(), SwapStatus::Success);
        assert_eq!(target.frames_presented(), 1);
        assert_eq!(target.last_frame().unwrap().pixel(0, 0), [0, 255, 0, 255]);
    }

    #[test]
    fn no_matching_config_is_fatal() {
        let platform = HeadlessPlatform::with_configs(vec![ConfigAttribs {
            red: 5,
            green: 6,
            blue: 5,
            alpha: 0,
            depth: 16,
            stencil: 0,
            renderable: Renderable::GLES3,
        }]);
        let mut s = GraphicsContextSession::new(platform, ConfigSpec::new(true, 3));
        assert!(matches!(s.start(), Err(SessionError::NoConfig(_))));
    }

    #[test]
    fn invalid_target_fails_surface_creation() {
        let mut s = session();
        let target = HeadlessTarget::new(4, 4);
        target.invalidate();
        s.start().unwrap();
        assert_eq!(
            s.create_surface(&target),
            Err(SurfaceError::BadNativeWindow)
        );
        assert!(!s.has_surface());
        assert!(s.create_gl().is_none());
    }

    #[test]
    fn surface_requires_context() {
        let mut s = session();
        assert_eq!(
            s.create_surface(&HeadlessTarget::new(1, 1)),
            Err(SurfaceError::NoContext)
        );
        assert_eq!(s.swap(), SwapStatus::BadSurface(SwapFailure::BadSurface));
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut s = session();
        s.start().unwrap();
        s.create_surface(&HeadlessTarget::new(2, 2)).unwrap();
        s.destroy_surface();
        s.destroy_surface();
        assert!(s.has_context());
        s.finish().unwrap();
        s.finish().unwrap();
        assert!(!s.has_context());
        assert!(s.platform().monitor().contexts_alive() == 0);
    }

    #[test]
    fn lost_target_reports_bad_surface_on_swap() {
        let mut s = session();
        let target = HeadlessTarget::new(2, 2);
        s.start().unwrap();
        s.create_surface(&target).unwrap();
        target.invalidate();
        assert_eq!(
            s.swap(),
            SwapStatus::BadSurface(SwapFailure::BadNativeWindow)
        );
    }
}
