#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use lutcam_engine::backend::headless::{
    HeadlessConfig, HeadlessContext, HeadlessDisplay, HeadlessPlatform, HeadlessSurface,
    HeadlessTarget,
};
use lutcam_engine::device::{
    ConfigAttribs, GraphicsPlatform, SessionError, SurfaceError, SwapStatus,
};
use lutcam_engine::gpu::GpuApi;
use lutcam_engine::gpu::software::SoftwareGpu;
use lutcam_engine::thread::{RenderRequester, Renderer};

pub type EventLog = Arc<Mutex<Vec<&'static str>>>;

/// Headless platform that records every call the session makes.
pub struct RecordingPlatform {
    inner: HeadlessPlatform,
    log: EventLog,
}

impl RecordingPlatform {
    pub fn new(inner: HeadlessPlatform) -> (Self, EventLog) {
        let log = EventLog::default();
        (
            Self {
                inner,
                log: log.clone(),
            },
            log,
        )
    }

    fn record(&self, event: &'static str) {
        self.log.lock().push(event);
    }
}

impl GraphicsPlatform for RecordingPlatform {
    type Display = HeadlessDisplay;
    type Config = HeadlessConfig;
    type Context = HeadlessContext;
    type Surface = HeadlessSurface;
    type Gl = SoftwareGpu;
    type Target = HeadlessTarget;

    fn get_display(&mut self) -> Result<HeadlessDisplay, SessionError> {
        self.record("get_display");
        self.inner.get_display()
    }

    fn initialize(&mut self, display: &HeadlessDisplay) -> Result<(u32, u32), SessionError> {
        self.record("initialize");
        self.inner.initialize(display)
    }

    fn configs(
        &mut self,
        display: &HeadlessDisplay,
    ) -> Result<Vec<(HeadlessConfig, ConfigAttribs)>, SessionError> {
        self.record("configs");
        self.inner.configs(display)
    }

    fn create_context(
        &mut self,
        display: &HeadlessDisplay,
        config: &HeadlessConfig,
        client_version: u32,
    ) -> Result<HeadlessContext, SessionError> {
        self.record("create_context");
        self.inner.create_context(display, config, client_version)
    }

    fn create_surface(
        &mut self,
        display: &HeadlessDisplay,
        config: &HeadlessConfig,
        target: &HeadlessTarget,
    ) -> Result<HeadlessSurface, SurfaceError> {
        self.record("create_surface");
        self.inner.create_surface(display, config, target)
    }

    fn make_current(
        &mut self,
        display: &HeadlessDisplay,
        current: Option<(&mut HeadlessSurface, &HeadlessContext)>,
    ) -> Result<(), SurfaceError> {
        self.record(if current.is_some() {
            "make_current"
        } else {
            "release_current"
        });
        self.inner.make_current(display, current)
    }

    fn create_gl(&mut self, context: &HeadlessContext, surface: &HeadlessSurface) -> SoftwareGpu {
        self.record("create_gl");
        self.inner.create_gl(context, surface)
    }

    fn swap_buffers(
        &mut self,
        display: &HeadlessDisplay,
        surface: &mut HeadlessSurface,
    ) -> SwapStatus {
        self.record("swap");
        self.inner.swap_buffers(display, surface)
    }

    fn destroy_surface(&mut self, display: &HeadlessDisplay, surface: HeadlessSurface) {
        self.record("destroy_surface");
        self.inner.destroy_surface(display, surface)
    }

    fn destroy_context(
        &mut self,
        display: &HeadlessDisplay,
        context: HeadlessContext,
    ) -> Result<(), SessionError> {
        self.record("destroy_context");
        self.inner.destroy_context(display, context)
    }

    fn terminate(&mut self, display: HeadlessDisplay) {
        self.record("terminate");
        self.inner.terminate(display)
    }
}

/// Renderer that counts its callbacks. With a gate, every draw blocks until
/// the gate is opened.
#[derive(Default)]
pub struct CountingRenderer {
    pub created: AtomicUsize,
    pub draws_started: AtomicUsize,
    pub draws: AtomicUsize,
    pub released: AtomicUsize,
    gate: Option<(Mutex<bool>, Condvar)>,
}

impl CountingRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some((Mutex::new(false), Condvar::new())),
            ..Self::default()
        })
    }

    pub fn open_gate(&self) {
        if let Some((open, cv)) = &self.gate {
            *open.lock() = true;
            cv.notify_all();
        }
    }

    pub fn draws(&self) -> usize {
        self.draws.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl Renderer for CountingRenderer {
    fn on_context_created(&self, gpu: &mut dyn GpuApi, _requester: &RenderRequester) {
        gpu.clear([0.0, 0.0, 0.0, 1.0]).ok();
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    fn on_draw_frame(&self, gpu: &mut dyn GpuApi) {
        self.draws_started.fetch_add(1, Ordering::SeqCst);
        if let Some((open, cv)) = &self.gate {
            let mut open = open.lock();
            while !*open {
                cv.wait(&mut open);
            }
        }
        gpu.clear([0.0, 1.0, 0.0, 1.0]).ok();
        self.draws.fetch_add(1, Ordering::SeqCst);
    }

    fn on_context_released(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Polls `cond` until it holds or two seconds pass.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

pub fn init_test_logging() {
    lutcam_engine::logging::init_logging(
        lutcam_engine::logging::LoggingConfig::default()
            .with_default_level(log::LevelFilter::Debug),
    );
}
