//! Graphics platform on wgpu, presenting to native winit windows.
//!
//! The display is a wgpu instance plus the chosen adapter, a context is a
//! logical device, and a surface is a configured window swapchain. Each
//! candidate surface format the adapter can render to is offered as one
//! framebuffer config.

mod gl;
mod target;

use std::sync::Arc;

use winit::window::Window;

use crate::device::{
    ConfigAttribs, GraphicsPlatform, OutputTarget, Renderable, SessionError, SurfaceError,
    SwapFailure, SwapStatus,
};

pub use gl::{DeviceShared, SurfaceSlot, WgpuGl};

/// Initialization parameters of the wgpu platform.
#[derive(Debug, Clone)]
pub struct WgpuInit {
    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    pub present_mode: wgpu::PresentMode,

    /// Used when the surface supports it; otherwise the first supported mode.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    pub power_preference: wgpu::PowerPreference,

    pub required_features: wgpu::Features,

    pub required_limits: wgpu::Limits,

    /// Hint only; support depends on the backend.
    pub desired_maximum_frame_latency: u32,
}

impl Default for WgpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: false,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
        }
    }
}

/// Surface formats offered as configs, in preference order.
const CANDIDATE_FORMATS: [wgpu::TextureFormat; 4] = [
    wgpu::TextureFormat::Rgba8Unorm,
    wgpu::TextureFormat::Bgra8Unorm,
    wgpu::TextureFormat::Rgba8UnormSrgb,
    wgpu::TextureFormat::Bgra8UnormSrgb,
];

pub struct WgpuDisplay {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WgpuConfig {
    format: wgpu::TextureFormat,
}

pub struct WgpuContext {
    shared: Arc<DeviceShared>,
}

pub struct WgpuSurface {
    slot: Arc<SurfaceSlot>,
    target: Arc<Window>,
    config: wgpu::SurfaceConfiguration,
    /// Device the swapchain is configured for; set by `make_current`.
    device: Option<Arc<DeviceShared>>,
}

impl WgpuSurface {
    fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

#[derive(Default)]
pub struct WgpuPlatform {
    init: WgpuInit,
}

impl WgpuPlatform {
    pub fn new(init: WgpuInit) -> Self {
        Self { init }
    }
}

impl GraphicsPlatform for WgpuPlatform {
    type Display = WgpuDisplay;
    type Config = WgpuConfig;
    type Context = WgpuContext;
    type Surface = WgpuSurface;
    type Gl = WgpuGl;
    type Target = Arc<Window>;

    fn get_display(&mut self) -> Result<WgpuDisplay, SessionError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: self.init.power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| SessionError::NoDisplay(e.to_string()))?;
        Ok(WgpuDisplay { instance, adapter })
    }

    /// wgpu has no display version; reports the adapter's backend as 1.0.
    fn initialize(&mut self, display: &WgpuDisplay) -> Result<(u32, u32), SessionError> {
        let info = display.adapter.get_info();
        log::info!(
            "adapter: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );
        Ok((1, 0))
    }

    fn configs(
        &mut self,
        display: &WgpuDisplay,
    ) -> Result<Vec<(WgpuConfig, ConfigAttribs)>, SessionError> {
        let es = Renderable::GLES2 | Renderable::GLES3;
        let mut formats = CANDIDATE_FORMATS.to_vec();
        if self.init.prefer_srgb {
            formats.sort_by_key(|f| !f.is_srgb());
        }
        Ok(formats
            .into_iter()
            .filter(|&format| {
                display
                    .adapter
                    .get_texture_format_features(format)
                    .allowed_usages
                    .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
            })
            .map(|format| (WgpuConfig { format }, ConfigAttribs::rgba8(24, 8, es)))
            .collect())
    }

    fn create_context(
        &mut self,
        display: &WgpuDisplay,
        _config: &WgpuConfig,
        client_version: u32,
    ) -> Result<WgpuContext, SessionError> {
        let (device, queue) =
            pollster::block_on(display.adapter.request_device(&wgpu::DeviceDescriptor {
                label: Some("lutcam device"),
                required_features: self.init.required_features,
                required_limits: self.init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            }))
            .map_err(|e| SessionError::CreateContext(e.to_string()))?;
        log::debug!("wgpu device created for client version {client_version}");
        Ok(WgpuContext {
            shared: Arc::new(DeviceShared::new(device, queue)),
        })
    }

    fn create_surface(
        &mut self,
        display: &WgpuDisplay,
        config: &WgpuConfig,
        target: &Arc<Window>,
    ) -> Result<WgpuSurface, SurfaceError> {
        let surface = display
            .instance
            .create_surface(target.clone())
            .map_err(|e| SurfaceError::Create(e.to_string()))?;
        let caps = surface.get_capabilities(&display.adapter);
        let format = choose_surface_format(&caps, config.format)
            .ok_or(SurfaceError::BadNativeWindow)?;
        let (width, height) = target.size();

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: self.init.present_mode,
            alpha_mode: choose_alpha_mode(&caps, self.init.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: self.init.desired_maximum_frame_latency,
        };

        Ok(WgpuSurface {
            slot: Arc::new(SurfaceSlot {
                surface,
                format,
                frame: parking_lot::Mutex::new(None),
                error: parking_lot::Mutex::new(None),
            }),
            target: target.clone(),
            config,
            device: None,
        })
    }

    /// Configures the swapchain for the context's device. Unbinding is a
    /// no-op; wgpu has no current-context notion.
    fn make_current(
        &mut self,
        _display: &WgpuDisplay,
        current: Option<(&mut WgpuSurface, &WgpuContext)>,
    ) -> Result<(), SurfaceError> {
        let Some((surface, context)) = current else {
            return Ok(());
        };
        let (width, height) = surface.target.size();
        if width == 0 || height == 0 {
            return Err(SurfaceError::MakeCurrent("window has zero size".into()));
        }
        surface.config.width = width;
        surface.config.height = height;
        surface
            .slot
            .surface
            .configure(&context.shared.device, &surface.config);
        surface.device = Some(context.shared.clone());
        Ok(())
    }

    fn create_gl(&mut self, context: &WgpuContext, surface: &WgpuSurface) -> WgpuGl {
        WgpuGl::new(context.shared.clone(), surface.slot.clone(), surface.size())
    }

    fn swap_buffers(&mut self, _display: &WgpuDisplay, surface: &mut WgpuSurface) -> SwapStatus {
        let Some(device) = surface.device.clone() else {
            return SwapStatus::BadSurface(SwapFailure::NotCurrent);
        };
        if device.is_lost() {
            return SwapStatus::ContextLost;
        }
        if let Some(err) = surface.slot.error.lock().take() {
            return map_surface_error(surface, &device, err);
        }

        let frame = surface.slot.frame.lock().take();
        let frame = match frame {
            Some(frame) => frame,
            // Nothing was drawn this interval; present whatever the
            // swapchain holds.
            None => match surface.slot.surface.get_current_texture() {
                Ok(frame) => frame,
                Err(err) => return map_surface_error(surface, &device, err),
            },
        };
        frame.present();
        SwapStatus::Success
    }

    fn destroy_surface(&mut self, _display: &WgpuDisplay, surface: WgpuSurface) {
        // An acquired frame must not outlive its swapchain.
        surface.slot.frame.lock().take();
        drop(surface);
    }

    fn destroy_context(
        &mut self,
        _display: &WgpuDisplay,
        context: WgpuContext,
    ) -> Result<(), SessionError> {
        context.shared.device.destroy();
        Ok(())
    }

    fn terminate(&mut self, display: WgpuDisplay) {
        drop(display);
    }
}

/// `requested` when the surface supports it, else an RGBA8-compatible
/// format from the capabilities, else the first one.
pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    requested: wgpu::TextureFormat,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }
    if caps.formats.contains(&requested) {
        return Some(requested);
    }
    CANDIDATE_FORMATS
        .into_iter()
        .find(|f| caps.formats.contains(f))
        .or_else(|| caps.formats.first().copied())
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Lost and outdated swapchains are reconfigured in place and the frame is
/// skipped, as is a timeout. Running out of memory is treated as a lost
/// context so everything gets recreated.
fn map_surface_error(
    surface: &WgpuSurface,
    device: &DeviceShared,
    err: wgpu::SurfaceError,
) -> SwapStatus {
    log::debug!("surface error: {err}");
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
            let (width, height) = surface.size();
            if width == 0 || height == 0 {
                return SwapStatus::BadSurface(SwapFailure::Outdated);
            }
            surface.slot.surface.configure(&device.device, &surface.config);
            SwapStatus::Success
        }
        wgpu::SurfaceError::Timeout => SwapStatus::Success,
        wgpu::SurfaceError::OutOfMemory => SwapStatus::ContextLost,
        wgpu::SurfaceError::Other => SwapStatus::BadSurface(SwapFailure::Other),
    }
}
