//! An in-process platform backed by the software GPU.
//!
//! Contexts are [`SoftwareDevice`]s and window surfaces are pixel buffers
//! that get copied into a [`HeadlessTarget`] on every swap. Tests and
//! offscreen tools use it; the [`ContextLossTrigger`] and
//! [`HeadlessTarget::invalidate`] knobs reproduce the failures a real
//! display reports.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::device::{
    ConfigAttribs, GraphicsPlatform, OutputTarget, Renderable, SessionError, SurfaceError,
    SwapFailure, SwapStatus,
};
use crate::gpu::software::{PixelBuffer, SharedDevice, SharedPixels, SoftwareDevice, SoftwareGpu};

struct TargetInner {
    size: Mutex<(u32, u32)>,
    valid: AtomicBool,
    presented: Mutex<Option<PixelBuffer>>,
    frames: AtomicU64,
}

/// Stand-in for a window: receives presented frames.
#[derive(Clone)]
pub struct HeadlessTarget {
    inner: Arc<TargetInner>,
}

impl HeadlessTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(TargetInner {
                size: Mutex::new((width, height)),
                valid: AtomicBool::new(true),
                presented: Mutex::new(None),
                frames: AtomicU64::new(0),
            }),
        }
    }

    /// The native window went away: surfaces can no longer be created on
    /// it and swaps to existing ones fail.
    pub fn invalidate(&self) {
        self.inner.valid.store(false, Ordering::SeqCst);
    }

    pub fn restore(&self) {
        self.inner.valid.store(true, Ordering::SeqCst);
    }

    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::SeqCst)
    }

    pub fn frames_presented(&self) -> u64 {
        self.inner.frames.load(Ordering::SeqCst)
    }

    /// Copy of the most recently presented frame, bottom row first.
    pub fn last_frame(&self) -> Option<PixelBuffer> {
        self.inner.presented.lock().clone()
    }

    fn present(&self, frame: &PixelBuffer) {
        *self.inner.presented.lock() = Some(frame.clone());
        self.inner.frames.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for HeadlessTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessTarget")
            .field("size", &self.size())
            .field("valid", &self.is_valid())
            .field("frames", &self.frames_presented())
            .finish()
    }
}

impl OutputTarget for HeadlessTarget {
    fn set_fixed_size(&self, width: u32, height: u32) {
        *self.inner.size.lock() = (width, height);
    }

    fn size(&self) -> (u32, u32) {
        *self.inner.size.lock()
    }
}

#[derive(Default)]
struct Counters {
    contexts_alive: AtomicUsize,
    contexts_created: AtomicU64,
    surfaces_alive: AtomicUsize,
    lose_context: AtomicBool,
    current: Mutex<Option<SharedDevice>>,
}

/// Makes the next swap report a lost context.
#[derive(Clone)]
pub struct ContextLossTrigger {
    counters: Arc<Counters>,
}

impl ContextLossTrigger {
    pub fn lose(&self) {
        self.counters.lose_context.store(true, Ordering::SeqCst);
    }
}

/// Read-only view of a platform's object counts, usable after the platform
/// has moved to its render thread.
#[derive(Clone)]
pub struct HeadlessMonitor {
    counters: Arc<Counters>,
}

impl HeadlessMonitor {
    pub fn contexts_alive(&self) -> usize {
        self.counters.contexts_alive.load(Ordering::SeqCst)
    }

    pub fn contexts_created(&self) -> u64 {
        self.counters.contexts_created.load(Ordering::SeqCst)
    }

    pub fn surfaces_alive(&self) -> usize {
        self.counters.surfaces_alive.load(Ordering::SeqCst)
    }

    /// GPU objects alive in the context GL was last created for.
    pub fn live_objects(&self) -> Option<usize> {
        self.counters
            .current
            .lock()
            .as_ref()
            .map(|device| device.lock().live_objects())
    }
}

#[derive(Debug)]
pub struct HeadlessDisplay {
    _private: (),
}

#[derive(Debug, Copy, Clone)]
pub struct HeadlessConfig {
    index: usize,
}

pub struct HeadlessContext {
    id: u64,
    device: SharedDevice,
}

pub struct HeadlessSurface {
    target: HeadlessTarget,
    back: SharedPixels,
}

pub struct HeadlessPlatform {
    configs: Vec<ConfigAttribs>,
    counters: Arc<Counters>,
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessPlatform {
    /// Offers RGBA8 configs with 16 and 24 bit depth, renderable with both
    /// client versions.
    pub fn new() -> Self {
        let es = Renderable::GLES2 | Renderable::GLES3;
        Self::with_configs(vec![
            ConfigAttribs::rgba8(16, 0, es),
            ConfigAttribs::rgba8(24, 8, es),
        ])
    }

    pub fn with_configs(configs: Vec<ConfigAttribs>) -> Self {
        Self {
            configs,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn context_loss_trigger(&self) -> ContextLossTrigger {
        ContextLossTrigger {
            counters: self.counters.clone(),
        }
    }

    pub fn monitor(&self) -> HeadlessMonitor {
        HeadlessMonitor {
            counters: self.counters.clone(),
        }
    }
}

impl GraphicsPlatform for HeadlessPlatform {
    type Display = HeadlessDisplay;
    type Config = HeadlessConfig;
    type Context = HeadlessContext;
    type Surface = HeadlessSurface;
    type Gl = SoftwareGpu;
    type Target = HeadlessTarget;

    fn get_display(&mut self) -> Result<HeadlessDisplay, SessionError> {
        Ok(HeadlessDisplay { _private: () })
    }

    fn initialize(&mut self, _display: &HeadlessDisplay) -> Result<(u32, u32), SessionError> {
        Ok((1, 5))
    }

    fn configs(
        &mut self,
        _display: &HeadlessDisplay,
    ) -> Result<Vec<(HeadlessConfig, ConfigAttribs)>, SessionError> {
        Ok(self
            .configs
            .iter()
            .enumerate()
            .map(|(index, attribs)| (HeadlessConfig { index }, *attribs))
            .collect())
    }

    fn create_context(
        &mut self,
        _display: &HeadlessDisplay,
        config: &HeadlessConfig,
        client_version: u32,
    ) -> Result<HeadlessContext, SessionError> {
        let attribs = self
            .configs
            .get(config.index)
            .ok_or_else(|| SessionError::CreateContext(format!("bad config {}", config.index)))?;
        let wanted = match client_version {
            2 => Renderable::GLES2,
            3 => Renderable::GLES3,
            v => {
                return Err(SessionError::CreateContext(format!(
                    "unsupported client version {v}"
                )));
            }
        };
        if !attribs.renderable.contains(wanted) {
            return Err(SessionError::CreateContext(format!(
                "config {} cannot render client version {client_version}",
                config.index
            )));
        }

        let id = self.counters.contexts_created.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.contexts_alive.fetch_add(1, Ordering::SeqCst);
        log::debug!("headless context {id} created");
        Ok(HeadlessContext {
            id,
            device: Arc::new(Mutex::new(SoftwareDevice::new())),
        })
    }

    fn create_surface(
        &mut self,
        _display: &HeadlessDisplay,
        _config: &HeadlessConfig,
        target: &HeadlessTarget,
    ) -> Result<HeadlessSurface, SurfaceError> {
        if !target.is_valid() {
            return Err(SurfaceError::BadNativeWindow);
        }
        let (width, height) = target.size();
        self.counters.surfaces_alive.fetch_add(1, Ordering::SeqCst);
        Ok(HeadlessSurface {
            target: target.clone(),
            back: Arc::new(Mutex::new(PixelBuffer::new(width, height))),
        })
    }

    fn make_current(
        &mut self,
        _display: &HeadlessDisplay,
        current: Option<(&mut HeadlessSurface, &HeadlessContext)>,
    ) -> Result<(), SurfaceError> {
        match current {
            Some((surface, _)) if !surface.target.is_valid() => Err(SurfaceError::MakeCurrent(
                "native window is no longer valid".into(),
            )),
            Some((_, context)) => {
                log::trace!("context {} current", context.id);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn create_gl(&mut self, context: &HeadlessContext, surface: &HeadlessSurface) -> SoftwareGpu {
        *self.counters.current.lock() = Some(context.device.clone());
        SoftwareGpu::new(context.device.clone(), surface.back.clone())
    }

    fn swap_buffers(
        &mut self,
        _display: &HeadlessDisplay,
        surface: &mut HeadlessSurface,
    ) -> SwapStatus {
        if self.counters.lose_context.swap(false, Ordering::SeqCst) {
            return SwapStatus::ContextLost;
        }
        if !surface.target.is_valid() {
            return SwapStatus::BadSurface(SwapFailure::BadNativeWindow);
        }
        surface.target.present(&surface.back.lock());
        SwapStatus::Success
    }

    fn destroy_surface(&mut self, _display: &HeadlessDisplay, surface: HeadlessSurface) {
        drop(surface);
        self.counters.surfaces_alive.fetch_sub(1, Ordering::SeqCst);
    }

    fn destroy_context(
        &mut self,
        _display: &HeadlessDisplay,
        context: HeadlessContext,
    ) -> Result<(), SessionError> {
        let mut current = self.counters.current.lock();
        if current
            .as_ref()
            .is_some_and(|device| Arc::ptr_eq(device, &context.device))
        {
            *current = None;
        }
        self.counters.contexts_alive.fetch_sub(1, Ordering::SeqCst);
        log::debug!("headless context {} destroyed", context.id);
        Ok(())
    }

    fn terminate(&mut self, _display: HeadlessDisplay) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuApi, TextureDesc};

    fn bring_up(
        platform: &mut HeadlessPlatform,
        target: &HeadlessTarget,
    ) -> (HeadlessDisplay, HeadlessContext, HeadlessSurface) {
        let display = platform.get_display().unwrap();
        platform.initialize(&display).unwrap();
        let (config, _) = platform.configs(&display).unwrap().remove(0);
        let context = platform.create_context(&display, &config, 3).unwrap();
        let surface = platform.create_surface(&display, &config, target).unwrap();
        (display, context, surface)
    }

    #[test]
    fn swap_presents_the_back_buffer() {
        let mut platform = HeadlessPlatform::new();
        let target = HeadlessTarget::new(2, 1);
        let (display, context, mut surface) = bring_up(&mut platform, &target);

        let mut gl = platform.create_gl(&context, &surface);
        gl.clear([1.0, 0.0, 0.0, 1.0]).unwrap();
        assert!(target.last_frame().is_none());
        assert_eq!(platform.swap_buffers(&display, &mut surface), SwapStatus::Success);
        assert_eq!(target.frames_presented(), 1);
        assert_eq!(target.last_frame().unwrap().pixel(1, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn context_loss_is_reported_once() {
        let mut platform = HeadlessPlatform::new();
        let trigger = platform.context_loss_trigger();
        let target = HeadlessTarget::new(1, 1);
        let (display, _context, mut surface) = bring_up(&mut platform, &target);

        trigger.lose();
        assert_eq!(
            platform.swap_buffers(&display, &mut surface),
            SwapStatus::ContextLost
        );
        assert_eq!(platform.swap_buffers(&display, &mut surface), SwapStatus::Success);
        assert_eq!(target.frames_presented(), 1);
    }

    #[test]
    fn monitor_tracks_contexts_and_objects() {
        let mut platform = HeadlessPlatform::new();
        let monitor = platform.monitor();
        let target = HeadlessTarget::new(1, 1);
        let (display, context, surface) = bring_up(&mut platform, &target);
        assert_eq!(monitor.contexts_alive(), 1);
        assert_eq!(monitor.live_objects(), None);

        let mut gl = platform.create_gl(&context, &surface);
        gl.create_texture(&TextureDesc::color(1, 1)).unwrap();
        assert_eq!(monitor.live_objects(), Some(1));

        drop(gl);
        platform.destroy_surface(&display, surface);
        platform.destroy_context(&display, context).unwrap();
        assert_eq!(monitor.contexts_alive(), 0);
        assert_eq!(monitor.surfaces_alive(), 0);
        assert_eq!(monitor.contexts_created(), 1);
        assert_eq!(monitor.live_objects(), None);
    }

    #[test]
    fn unsupported_client_version_fails() {
        let mut platform = HeadlessPlatform::with_configs(vec![ConfigAttribs::rgba8(
            16,
            0,
            Renderable::GLES2,
        )]);
        let display = platform.get_display().unwrap();
        let (config, _) = platform.configs(&display).unwrap().remove(0);
        assert!(matches!(
            platform.create_context(&display, &config, 3),
            Err(SessionError::CreateContext(_))
        ));
        assert!(platform.create_context(&display, &config, 2).is_ok());
    }

    #[test]
    fn restored_target_accepts_surfaces_again() {
        let mut platform = HeadlessPlatform::new();
        let target = HeadlessTarget::new(1, 1);
        let display = platform.get_display().unwrap();
        let (config, _) = platform.configs(&display).unwrap().remove(0);

        target.invalidate();
        assert_eq!(
            platform.create_surface(&display, &config, &target).err(),
            Some(SurfaceError::BadNativeWindow)
        );
        target.restore();
        assert!(platform.create_surface(&display, &config, &target).is_ok());
    }
}
