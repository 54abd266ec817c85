//! The public entry point: a LUT camera-filter pipeline bound to one output
//! target and one render thread.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::device::{ConfigSpec, GraphicsPlatform, OutputTarget, SessionError};
use crate::gpu::GpuApi;
use crate::render::{
    CaptureRequest, CaptureSink, CompositorConfig, CompositorParts, DEFAULT_INTENSITY,
    FrameCompositor, LutLoader, LutSource, SharedIntensity, SourceKind,
};
use crate::source::TextureSource;
use crate::thread::{
    RenderRequester, RenderState, RenderStats, RenderThread, Renderer, Scheduler, ThreadError,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Thread(#[from] ThreadError),
}

/// Construction parameters of a [`FilterPipeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Fixed render size; the output target is pinned to it.
    pub width: u32,
    pub height: u32,
    pub source_kind: SourceKind,
    pub client_version: u32,
    pub with_depth_buffer: bool,
    pub clear_color: [f32; 4],
    pub initial_intensity: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            source_kind: SourceKind::CameraBack,
            client_version: 3,
            with_depth_buffer: true,
            clear_color: [1.0, 1.0, 1.0, 1.0],
            initial_intensity: DEFAULT_INTENSITY,
        }
    }
}

impl PipelineConfig {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_source_kind(mut self, kind: SourceKind) -> Self {
        self.source_kind = kind;
        self
    }

    pub fn with_client_version(mut self, version: u32) -> Self {
        self.client_version = version;
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.initial_intensity = intensity;
        self
    }

    pub fn config_spec(&self) -> ConfigSpec {
        ConfigSpec::new(self.with_depth_buffer, self.client_version)
    }
}

/// Application objects the pipeline calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn TextureSource>,
    pub loader: Arc<dyn LutLoader>,
    pub sink: Arc<dyn CaptureSink>,
}

struct CompositorRenderer {
    compositor: Mutex<FrameCompositor>,
}

impl Renderer for CompositorRenderer {
    fn on_context_created(&self, gpu: &mut dyn GpuApi, requester: &RenderRequester) {
        if let Err(e) = self.compositor.lock().on_context_created(gpu, requester) {
            log::error!("compositor setup failed: {e}");
        }
    }

    fn on_draw_frame(&self, gpu: &mut dyn GpuApi) {
        if let Err(e) = self.compositor.lock().draw_frame(gpu) {
            log::warn!("frame skipped: {e}");
        }
    }

    fn on_context_released(&self) {
        self.compositor.lock().on_context_released();
    }
}

/// Grades a camera stream through a lookup table and presents it on an
/// output target, on a render thread of its own.
///
/// All methods are called from the owning thread. Lifecycle methods block
/// until the render thread has acted; filter and capture requests return
/// immediately and take effect on the next frame.
pub struct FilterPipeline<P: GraphicsPlatform> {
    config: PipelineConfig,
    // Declared before `renderer`: the thread must stop before the last
    // strong reference to the renderer goes away.
    thread: RenderThread<P>,
    renderer: Arc<CompositorRenderer>,
    intensity: SharedIntensity,
    capture: CaptureRequest,
}

impl<P: GraphicsPlatform> FilterPipeline<P> {
    pub fn new(
        platform: P,
        target: P::Target,
        config: PipelineConfig,
        collaborators: Collaborators,
    ) -> Result<Self, PipelineError> {
        Self::with_scheduler(platform, target, config, collaborators, Scheduler::new())
    }

    /// Like [`FilterPipeline::new`], synchronizing on an existing scheduler.
    pub fn with_scheduler(
        platform: P,
        target: P::Target,
        config: PipelineConfig,
        collaborators: Collaborators,
        scheduler: Scheduler,
    ) -> Result<Self, PipelineError> {
        if config.width == 0 || config.height == 0 {
            log::warn!(
                "pipeline size {}x{} is empty; nothing will be drawn",
                config.width,
                config.height
            );
        }
        target.set_fixed_size(config.width, config.height);

        let intensity = SharedIntensity::new(config.initial_intensity);
        let capture = CaptureRequest::default();
        let compositor = FrameCompositor::new(
            CompositorConfig {
                width: config.width,
                height: config.height,
                source_kind: config.source_kind,
                clear_color: config.clear_color,
            },
            CompositorParts {
                source: collaborators.source,
                loader: collaborators.loader,
                sink: collaborators.sink,
                intensity: intensity.clone(),
                capture: capture.clone(),
            },
        );
        let renderer = Arc::new(CompositorRenderer {
            compositor: Mutex::new(compositor),
        });
        let dyn_renderer: Arc<dyn Renderer> = renderer.clone();

        let thread = RenderThread::spawn(
            platform,
            config.config_spec(),
            target,
            (config.width, config.height),
            Arc::downgrade(&dyn_renderer),
            scheduler,
        )?;
        log::info!(
            "pipeline started: {}x{} {:?}",
            config.width,
            config.height,
            config.source_kind
        );

        Ok(Self {
            config,
            thread,
            renderer,
            intensity,
            capture,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A new output target replaces the previous one, which must have been
    /// reported destroyed. The first frame on it is requested right away.
    pub fn on_output_target_created(&self, target: P::Target) {
        target.set_fixed_size(self.config.width, self.config.height);
        self.thread.surface_created(target);
        self.thread.request_render();
    }

    pub fn on_output_target_destroyed(&self) {
        self.thread.surface_destroyed();
    }

    pub fn on_pause(&self) {
        self.thread.on_pause();
    }

    pub fn on_resume(&self) {
        self.thread.on_resume();
    }

    /// Drops the GPU context until the next frame is needed.
    pub fn release_context(&self) {
        self.thread.release_context();
    }

    /// Switches the lookup table on the render thread. `None` disables
    /// filtering and zeroes the intensity; otherwise `intensity`, when given,
    /// replaces the current one.
    pub fn set_filter(&self, source: Option<LutSource>, intensity: Option<f32>) {
        let renderer = Arc::downgrade(&self.renderer);
        self.thread.queue_event(move |gpu| {
            if let Some(renderer) = renderer.upgrade() {
                renderer.compositor.lock().set_filter(gpu, source, intensity);
            }
        });
    }

    /// Adjusts the blend strength of the current table and redraws.
    pub fn set_filter_intensity(&self, intensity: f32) {
        self.intensity.set(intensity);
        self.thread.request_render();
    }

    pub fn filter_intensity(&self) -> f32 {
        self.intensity.get()
    }

    /// Captures the next frame into the capture sink.
    pub fn request_capture(&self) {
        self.capture.request();
        self.thread.request_render();
    }

    pub fn captures_completed(&self) -> u64 {
        self.capture.completed()
    }

    pub fn request_render(&self) {
        self.thread.request_render();
    }

    /// Draws one frame and blocks until it is presented; see
    /// [`RenderThread::request_render_and_wait`].
    pub fn request_render_and_wait(&self) -> bool {
        self.thread.request_render_and_wait()
    }

    /// Runs `event` on the render thread, with the context current, before
    /// the next frame.
    pub fn queue_event(&self, event: impl FnOnce(&mut dyn GpuApi) + Send + 'static) {
        self.thread.queue_event(event);
    }

    pub fn state(&self) -> RenderState {
        self.thread.state()
    }

    pub fn stats(&self) -> RenderStats {
        self.thread.stats()
    }

    /// Stops the render thread, releasing every GPU object and the context.
    /// Reports the fatal error that stopped the thread early, if any.
    pub fn release(mut self) -> Result<(), PipelineError> {
        self.thread.request_exit_and_wait()?;
        log::info!("pipeline released");
        match self.thread.take_failure() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
