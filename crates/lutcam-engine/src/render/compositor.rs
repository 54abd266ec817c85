use std::sync::Arc;

use crate::gpu::{GpuApi, GpuError, ResourceBin, Scoped, TextureDesc, TextureId};
use crate::source::TextureSource;
use crate::thread::RenderRequester;

use super::{
    CameraPass, CaptureRequest, CaptureSink, ColorPass, FilterState, LutLoader, LutSource, Mat4,
    SharedIntensity, SnapshotCapturer,
};

/// Where the frames fed to the compositor come from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum SourceKind {
    #[default]
    CameraBack,
    CameraFront,
    /// A still image; needs a quarter turn to come out upright.
    Image,
}

impl SourceKind {
    pub fn is_live(self) -> bool {
        !matches!(self, SourceKind::Image)
    }

    /// Transform of the color pass for this kind of source.
    pub fn color_matrix(self) -> Mat4 {
        match self {
            SourceKind::CameraBack | SourceKind::CameraFront => {
                Mat4::IDENTITY.flipped(false, true)
            }
            SourceKind::Image => Mat4::IDENTITY.rotated(90.0, 0.0, 0.0, 1.0),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CompositorConfig {
    pub width: u32,
    pub height: u32,
    pub source_kind: SourceKind,
    pub clear_color: [f32; 4],
}

/// Collaborators the compositor calls into; all live longer than any context.
#[derive(Clone)]
pub struct CompositorParts {
    pub source: Arc<dyn TextureSource>,
    pub loader: Arc<dyn LutLoader>,
    pub sink: Arc<dyn CaptureSink>,
    pub intensity: SharedIntensity,
    pub capture: CaptureRequest,
}

/// Objects tied to one graphics context.
#[derive(Debug)]
struct ContextObjects {
    capturer: SnapshotCapturer,
    color: ColorPass,
    camera: CameraPass,
    input: Scoped<TextureId>,
}

/// Two-pass frame compositor.
///
/// Each frame the external stream texture is copied into an offscreen
/// target (camera pass), which is then graded through the current lookup
/// table onto the bound surface (color pass). A pending capture request
/// additionally renders the color pass into a capture target and reads it
/// back, without changing what reaches the surface.
pub struct FrameCompositor {
    config: CompositorConfig,
    parts: CompositorParts,
    bin: ResourceBin,
    filter: FilterState,
    matrix: Mat4,
    objects: Option<ContextObjects>,
}

impl FrameCompositor {
    pub fn new(config: CompositorConfig, parts: CompositorParts) -> Self {
        Self {
            matrix: config.source_kind.color_matrix(),
            filter: FilterState::new(parts.intensity.clone()),
            bin: ResourceBin::new(),
            config,
            parts,
            objects: None,
        }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn has_context(&self) -> bool {
        self.objects.is_some()
    }

    /// Builds every context object. Handles from an earlier context are
    /// forgotten, not deleted: that context is already gone.
    pub fn on_context_created(
        &mut self,
        gpu: &mut dyn GpuApi,
        requester: &RenderRequester,
    ) -> Result<(), GpuError> {
        self.bin.invalidate();
        self.objects = None;
        self.filter.forget_textures();

        let CompositorConfig { width, height, .. } = self.config;
        let input = self
            .bin
            .adopt(gpu.create_texture(&TextureDesc::external(width, height))?);
        let camera = CameraPass::new(gpu, &self.bin, input.get(), width, height)?;
        let color = ColorPass::new(gpu, &self.bin, camera.output())?;
        let capturer =
            SnapshotCapturer::new(gpu, &self.bin, width, height, self.parts.sink.clone())?;

        self.parts
            .source
            .attach(input.get(), width, height, requester.clone());
        self.objects = Some(ContextObjects {
            capturer,
            color,
            camera,
            input,
        });

        self.filter
            .reload(gpu, &self.bin, self.parts.loader.as_ref());
        log::debug!("compositor ready at {width}x{height}");
        Ok(())
    }

    pub fn on_context_released(&mut self) {
        self.parts.source.detach();
        self.bin.invalidate();
        self.objects = None;
        self.filter.forget_textures();
    }

    pub fn set_filter(
        &mut self,
        gpu: &mut dyn GpuApi,
        source: Option<LutSource>,
        intensity: Option<f32>,
    ) {
        self.filter.apply(
            gpu,
            &self.bin,
            self.parts.loader.as_ref(),
            source,
            intensity,
        );
    }

    pub fn draw_frame(&mut self, gpu: &mut dyn GpuApi) -> Result<(), GpuError> {
        let Some(objects) = &self.objects else {
            log::warn!("draw requested before the compositor has a context");
            return Ok(());
        };
        self.bin.collect(gpu);

        let CompositorConfig {
            width,
            height,
            clear_color,
            ..
        } = self.config;

        self.parts.source.import_latest(gpu, objects.input.get())?;
        gpu.viewport(0, 0, width, height);
        objects.camera.draw(gpu, clear_color)?;

        if self.parts.capture.take() {
            if let Err(e) = objects.capturer.capture(
                gpu,
                &objects.color,
                &self.matrix,
                &self.filter,
                clear_color,
                &self.parts.capture,
            ) {
                log::warn!("frame capture failed: {e}");
            }
        }

        gpu.bind_framebuffer(None)?;
        objects
            .color
            .draw(gpu, &self.matrix, &self.filter, clear_color)
    }
}
