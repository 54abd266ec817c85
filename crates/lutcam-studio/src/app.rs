use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use lutcam_engine::backend::native::{WgpuInit, WgpuPlatform};
use lutcam_engine::render::SourceKind;
use lutcam_engine::source::CpuFrameSource;
use lutcam_engine::{Collaborators, FilterPipeline, PipelineConfig};

use crate::capture::CaptureWriter;
use crate::feed::{self, FeedMode, SyntheticFeed};
use crate::luts::FilterBank;

const INTENSITY_STEP: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct StudioSettings {
    pub width: u32,
    pub height: u32,
    pub source_kind: SourceKind,
    pub still: Option<PathBuf>,
    pub lut_files: Vec<PathBuf>,
    pub capture_dir: PathBuf,
    pub intensity: f32,
}

/// Window host for one pipeline.
///
/// Suspend and resume of the event loop map to pausing the pipeline and
/// dropping or re-attaching its output target.
pub struct Studio {
    settings: StudioSettings,
    bank: FilterBank,
    current: Option<usize>,
    intensity: f32,
    source: Arc<CpuFrameSource>,

    window: Option<Arc<Window>>,
    pipeline: Option<FilterPipeline<WgpuPlatform>>,
    feed: Option<SyntheticFeed>,
    writer: Option<CaptureWriter>,

    paused: bool,
    suspended: bool,
    error: Option<anyhow::Error>,
}

impl Studio {
    pub fn new(settings: StudioSettings) -> Result<Self> {
        let writer = CaptureWriter::start(settings.capture_dir.clone())?;
        Ok(Self {
            bank: FilterBank::new(&settings.lut_files),
            current: None,
            intensity: settings.intensity.clamp(0.0, 1.0),
            source: Arc::new(CpuFrameSource::new()),
            window: None,
            pipeline: None,
            feed: None,
            writer: Some(writer),
            paused: false,
            suspended: false,
            error: None,
            settings,
        })
    }

    /// Releases everything and reports the first fatal error, if any.
    pub fn finish(mut self) -> Result<()> {
        self.shutdown();
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let StudioSettings { width, height, .. } = self.settings;
        let attrs = Window::default_attributes()
            .with_title("lutcam studio")
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(false);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let writer = self
            .writer
            .as_ref()
            .context("capture writer already stopped")?;
        let collaborators = Collaborators {
            source: self.source.clone(),
            loader: self.bank.loader.clone(),
            sink: writer.sink(),
        };
        let config = PipelineConfig::default()
            .with_size(width, height)
            .with_source_kind(self.settings.source_kind)
            .with_intensity(self.intensity);
        let pipeline = FilterPipeline::new(
            WgpuPlatform::new(WgpuInit::default()),
            window.clone(),
            config,
            collaborators,
        )?;

        let mode = match (self.settings.source_kind, &self.settings.still) {
            (SourceKind::Image, Some(path)) => {
                FeedMode::Still(feed::load_still(path, width, height)?)
            }
            // test card
            (SourceKind::Image, None) => FeedMode::Still(feed::bars_frame(width, height, 0.0)?),
            _ => FeedMode::Live,
        };
        self.feed = Some(SyntheticFeed::start(
            self.source.clone(),
            width,
            height,
            mode,
        )?);

        log::info!(
            "keys: L next filter, 0 filter off, Up/Down intensity, C capture, P pause, Esc quit"
        );
        self.window = Some(window);
        self.pipeline = Some(pipeline);
        self.update_title();
        Ok(())
    }

    fn shutdown(&mut self) {
        self.feed.take();
        if let Some(pipeline) = self.pipeline.take() {
            let stats = pipeline.stats();
            log::info!(
                "{} frames presented, {} captures, {:.1} fps at exit",
                stats.frames_presented,
                pipeline.captures_completed(),
                stats.frames_per_second
            );
            if let Err(e) = pipeline.release() {
                log::error!("pipeline stopped with an error: {e}");
                self.error.get_or_insert(e.into());
            }
        }
        if let Some(writer) = self.writer.take() {
            writer.finish();
        }
        self.window.take();
    }

    fn update_title(&self) {
        let Some(window) = &self.window else {
            return;
        };
        let filter = match self.current {
            Some(i) => self.bank.names[i].as_str(),
            None => "off",
        };
        let paused = if self.paused { " (paused)" } else { "" };
        window.set_title(&format!(
            "lutcam studio: {filter} {:.0}%{paused}",
            self.intensity * 100.0
        ));
    }

    fn on_key(&mut self, event_loop: &ActiveEventLoop, code: KeyCode) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        match code {
            KeyCode::KeyL => {
                self.current = self.bank.next(self.current);
                if let Some(i) = self.current {
                    log::info!("filter: {}", self.bank.names[i]);
                    pipeline.set_filter(Some(self.bank.sources[i].clone()), Some(self.intensity));
                }
            }
            KeyCode::Digit0 => {
                self.current = None;
                pipeline.set_filter(None, None);
            }
            KeyCode::ArrowUp | KeyCode::ArrowDown => {
                let step = if code == KeyCode::ArrowUp {
                    INTENSITY_STEP
                } else {
                    -INTENSITY_STEP
                };
                self.intensity = (self.intensity + step).clamp(0.0, 1.0);
                if self.current.is_some() {
                    pipeline.set_filter_intensity(self.intensity);
                }
            }
            KeyCode::KeyC => pipeline.request_capture(),
            KeyCode::KeyP => {
                self.paused = !self.paused;
                if self.paused {
                    pipeline.on_pause();
                } else {
                    pipeline.on_resume();
                }
            }
            KeyCode::Escape => {
                self.shutdown();
                event_loop.exit();
                return;
            }
            _ => return,
        }
        self.update_title();
    }
}

impl ApplicationHandler for Studio {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        if let Some(pipeline) = &self.pipeline {
            if self.suspended {
                self.suspended = false;
                if let Some(window) = &self.window {
                    pipeline.on_output_target_created(window.clone());
                }
                if !self.paused {
                    pipeline.on_resume();
                }
            }
            return;
        }

        if let Err(e) = self.start(event_loop) {
            log::error!("failed to start: {e:#}");
            self.error = Some(e);
            self.shutdown();
            event_loop.exit();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.on_pause();
            pipeline.on_output_target_destroyed();
            self.suspended = true;
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed && !event.repeat =>
            {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.on_key(event_loop, code);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(pipeline) = &self.pipeline {
                    pipeline.request_render();
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
