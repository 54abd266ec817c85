//! [`GpuApi`] on a wgpu device.
//!
//! Every draw or clear records one render pass and submits it right away, so
//! queue writes made for a draw are always visible to it. Offscreen targets
//! are rendered with y negated in the vertex stage; their memory layout then
//! matches GL's bottom-up rows and [`GpuApi::read_pixels`] needs no flip.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;

use crate::gpu::{
    FilterMode, FramebufferId, GpuApi, GpuError, ProgramId, ProgramKind, QuadDraw, TextureDesc,
    TextureId, TextureKind, validate_bindings,
};
use crate::render::QUAD_INDICES;

/// Format of every texture the compositor creates.
pub(crate) const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

// ── gpu data ──────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(crate) struct QuadUniform {
    pub matrix: [[f32; 4]; 4],
    pub filter_enabled: f32,
    pub intensity: f32,
    pub flip_y: f32,
    pub _pad: f32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(crate) struct QuadVertex {
    pub pos: [f32; 3],
    pub uv: [f32; 2],
}

impl QuadVertex {
    const ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x3, // position
        1 => Float32x2  // tex coord
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// Row pitch of a buffer copy of `width` RGBA8 texels.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * 4).div_ceil(align) * align
}

// ── per-context state ─────────────────────────────────────────────────────

struct GpuTexture {
    desc: TextureDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

#[derive(Default)]
struct Objects {
    next_id: u32,
    textures: HashMap<u32, GpuTexture>,
    framebuffers: HashMap<u32, TextureId>,
    programs: HashMap<u32, ProgramKind>,
    pipelines: HashMap<(ProgramKind, wgpu::TextureFormat), wgpu::RenderPipeline>,
}

impl Objects {
    fn alloc(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn texture(&self, id: TextureId) -> Result<&GpuTexture, GpuError> {
        self.textures.get(&id.0).ok_or(GpuError::UnknownTexture(id.0))
    }
}

/// Device, queue and object namespace of one context. Shared by every
/// [`WgpuGl`] created for it, so objects outlive surface recreation.
pub struct DeviceShared {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) lost: Arc<AtomicBool>,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    shader: wgpu::ShaderModule,
    uniforms: wgpu::Buffer,
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    fallback: GpuTexture,
    objects: Mutex<Objects>,
}

impl DeviceShared {
    pub(crate) fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        use wgpu::util::DeviceExt;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            log::error!("wgpu device lost ({reason:?}): {message}");
            flag.store(true, Ordering::SeqCst);
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lutcam composite shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/composite.wgsl").into()),
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lutcam quad bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<QuadUniform>() as u64,
                        ),
                    },
                    count: None,
                },
                texture_entry(1),
                sampler_entry(2),
                texture_entry(3),
                sampler_entry(4),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lutcam quad pipeline layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lutcam quad ubo"),
            size: std::mem::size_of::<QuadUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let vertices = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lutcam quad vbo"),
            size: (4 * std::mem::size_of::<QuadVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lutcam quad ibo"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        // Bound to unit 1 when a draw leaves it empty.
        let fallback = make_texture(&device, &TextureDesc::lookup(1, 1));

        Self {
            device,
            queue,
            lost,
            layout,
            pipeline_layout,
            shader,
            uniforms,
            vertices,
            indices,
            fallback,
            objects: Mutex::new(Objects::default()),
        }
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn pipeline(
        &self,
        objects: &mut Objects,
        kind: ProgramKind,
        format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        if let Some(pipeline) = objects.pipelines.get(&(kind, format)) {
            return pipeline.clone();
        }
        let entry = match kind {
            ProgramKind::ExternalCopy => "fs_external",
            ProgramKind::ColorLut => "fs_color_lut",
        };
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("lutcam quad pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[QuadVertex::layout()],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some(entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });
        log::debug!("built {kind:?} pipeline for {format:?}");
        objects.pipelines.insert((kind, format), pipeline.clone());
        pipeline
    }
}

fn make_texture(device: &wgpu::Device, desc: &TextureDesc) -> GpuTexture {
    let usage = match desc.kind {
        TextureKind::External => {
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
        }
        TextureKind::Color2d => {
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST
        }
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("lutcam texture"),
        size: wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("lutcam sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter_mode(desc.mag_filter),
        min_filter: filter_mode(desc.min_filter),
        ..Default::default()
    });
    GpuTexture {
        desc: *desc,
        texture,
        view,
        sampler,
    }
}

fn unit_texture<'a>(
    objects: &'a Objects,
    fallback: &'a GpuTexture,
    texture: Option<TextureId>,
) -> Result<&'a GpuTexture, GpuError> {
    match texture {
        Some(id) => objects.texture(id),
        None => Ok(fallback),
    }
}

fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

// ── window surface ────────────────────────────────────────────────────────

/// Window surface plus the frame acquired for the current swap interval.
pub struct SurfaceSlot {
    pub(crate) surface: wgpu::Surface<'static>,
    pub(crate) format: wgpu::TextureFormat,
    pub(crate) frame: Mutex<Option<wgpu::SurfaceTexture>>,
    /// Last acquisition failure, reported by the next swap.
    pub(crate) error: Mutex<Option<wgpu::SurfaceError>>,
}

// ── gl ────────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone)]
struct Viewport {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

/// GL entry points for one context and one window surface.
pub struct WgpuGl {
    shared: Arc<DeviceShared>,
    surface: Arc<SurfaceSlot>,
    surface_size: (u32, u32),
    bound: Option<FramebufferId>,
    viewport: Option<Viewport>,
}

/// Where a pass renders.
struct PassTarget {
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    size: (u32, u32),
    attachment: Option<TextureId>,
    offscreen: bool,
}

impl WgpuGl {
    pub(crate) fn new(
        shared: Arc<DeviceShared>,
        surface: Arc<SurfaceSlot>,
        surface_size: (u32, u32),
    ) -> Self {
        Self {
            shared,
            surface,
            surface_size,
            bound: None,
            viewport: None,
        }
    }

    fn pass_target(&self, objects: &Objects) -> Result<PassTarget, GpuError> {
        match self.bound {
            Some(fb) => {
                let color = *objects
                    .framebuffers
                    .get(&fb.0)
                    .ok_or(GpuError::UnknownFramebuffer(fb.0))?;
                let texture = objects.texture(color)?;
                Ok(PassTarget {
                    view: texture.view.clone(),
                    format: TEXTURE_FORMAT,
                    size: (texture.desc.width, texture.desc.height),
                    attachment: Some(color),
                    offscreen: true,
                })
            }
            None => {
                let mut frame = self.surface.frame.lock();
                if frame.is_none() {
                    match self.surface.surface.get_current_texture() {
                        Ok(texture) => *frame = Some(texture),
                        Err(e) => {
                            let message = e.to_string();
                            *self.surface.error.lock() = Some(e);
                            return Err(GpuError::SurfaceUnavailable(message));
                        }
                    }
                }
                let Some(texture) = frame.as_ref() else {
                    return Err(GpuError::SurfaceUnavailable("no frame".into()));
                };
                Ok(PassTarget {
                    view: texture
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default()),
                    format: self.surface.format,
                    size: self.surface_size,
                    attachment: None,
                    offscreen: false,
                })
            }
        }
    }

    /// Records one render pass into the bound target and submits it.
    fn submit_pass(
        &self,
        target: &PassTarget,
        load: wgpu::LoadOp<wgpu::Color>,
        record: impl FnOnce(&mut wgpu::RenderPass<'_>),
    ) {
        let mut encoder = self
            .shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lutcam pass encoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lutcam quad pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            record(&mut rpass);
        }
        self.shared.queue.submit(std::iter::once(encoder.finish()));
    }

    /// The GL viewport in wgpu's top-left framebuffer coordinates, clamped
    /// to the target.
    fn pass_viewport(&self, target: &PassTarget) -> Option<(f32, f32, f32, f32)> {
        let (tw, th) = target.size;
        let vp = self.viewport.unwrap_or(Viewport {
            x: 0,
            y: 0,
            width: tw,
            height: th,
        });
        let x0 = vp.x.clamp(0, tw as i32);
        let x1 = (vp.x + vp.width as i32).clamp(0, tw as i32);
        // Offscreen rows are already GL-ordered.
        let (y0, y1) = if target.offscreen {
            (vp.y, vp.y + vp.height as i32)
        } else {
            let top = th as i32 - (vp.y + vp.height as i32);
            (top, top + vp.height as i32)
        };
        let y0 = y0.clamp(0, th as i32);
        let y1 = y1.clamp(0, th as i32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as f32, y0 as f32, (x1 - x0) as f32, (y1 - y0) as f32))
    }
}

impl GpuApi for WgpuGl {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GpuError::ZeroSize);
        }
        let texture = make_texture(&self.shared.device, desc);
        let mut objects = self.shared.objects.lock();
        let id = objects.alloc();
        objects.textures.insert(id, texture);
        Ok(TextureId(id))
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<(), GpuError> {
        if rgba.len() != width as usize * height as usize * 4 {
            return Err(GpuError::SizeMismatch {
                width,
                height,
                got: rgba.len(),
            });
        }
        let mut objects = self.shared.objects.lock();
        let current = objects.texture(texture)?;
        if (current.desc.width, current.desc.height) != (width, height) {
            let desc = TextureDesc {
                width,
                height,
                ..current.desc
            };
            let replacement = make_texture(&self.shared.device, &desc);
            objects.textures.insert(texture.0, replacement);
        }
        let target = objects.texture(texture)?;
        self.shared.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        let mut objects = self.shared.objects.lock();
        if let Some(t) = objects.textures.remove(&texture.0) {
            t.texture.destroy();
        }
        objects.framebuffers.retain(|_, color| *color != texture);
    }

    fn create_framebuffer(&mut self, color: TextureId) -> Result<FramebufferId, GpuError> {
        let mut objects = self.shared.objects.lock();
        if objects.texture(color)?.desc.kind != TextureKind::Color2d {
            return Err(GpuError::UnknownTexture(color.0));
        }
        let id = objects.alloc();
        objects.framebuffers.insert(id, color);
        Ok(FramebufferId(id))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.shared.objects.lock().framebuffers.remove(&framebuffer.0);
        if self.bound == Some(framebuffer) {
            self.bound = None;
        }
    }

    fn create_program(&mut self, kind: ProgramKind) -> Result<ProgramId, GpuError> {
        let mut objects = self.shared.objects.lock();
        let id = objects.alloc();
        objects.programs.insert(id, kind);
        Ok(ProgramId(id))
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.shared.objects.lock().programs.remove(&program.0);
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<(), GpuError> {
        if let Some(fb) = framebuffer {
            if !self.shared.objects.lock().framebuffers.contains_key(&fb.0) {
                return Err(GpuError::UnknownFramebuffer(fb.0));
            }
        }
        self.bound = framebuffer;
        Ok(())
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Some(Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn clear(&mut self, color: [f32; 4]) -> Result<(), GpuError> {
        let target = {
            let objects = self.shared.objects.lock();
            self.pass_target(&objects)?
        };
        let [r, g, b, a] = color.map(f64::from);
        self.submit_pass(&target, wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }), |_| {});
        Ok(())
    }

    fn draw_quad(&mut self, draw: &QuadDraw<'_>) -> Result<(), GpuError> {
        let shared = self.shared.clone();
        let mut objects = shared.objects.lock();

        let kind = *objects
            .programs
            .get(&draw.program.0)
            .ok_or(GpuError::UnknownProgram(draw.program.0))?;
        let mut bindings = [None, None];
        for (slot, texture) in bindings.iter_mut().zip(draw.textures) {
            if let Some(id) = texture {
                *slot = Some((id, objects.texture(id)?.desc.kind));
            }
        }
        let target = self.pass_target(&objects)?;
        validate_bindings(kind, &bindings, target.attachment)?;

        let Some((vx, vy, vw, vh)) = self.pass_viewport(&target) else {
            return Ok(());
        };

        let pipeline = shared.pipeline(&mut objects, kind, target.format);
        let src = unit_texture(&objects, &shared.fallback, draw.textures[0])?;
        let lut = unit_texture(&objects, &shared.fallback, draw.textures[1])?;

        let bind_group = shared.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lutcam quad bind group"),
            layout: &shared.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: shared.uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&src.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&src.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&lut.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&lut.sampler),
                },
            ],
        });

        let uniform = QuadUniform {
            matrix: draw.matrix.to_cols_array_2d(),
            filter_enabled: if draw.uniforms.filter_enabled { 1.0 } else { 0.0 },
            intensity: draw.uniforms.intensity,
            flip_y: if target.offscreen { -1.0 } else { 1.0 },
            _pad: 0.0,
        };
        let vertices: [QuadVertex; 4] = std::array::from_fn(|i| QuadVertex {
            pos: draw.positions[i],
            uv: draw.tex_coords[i],
        });
        shared
            .queue
            .write_buffer(&shared.uniforms, 0, bytemuck::bytes_of(&uniform));
        shared
            .queue
            .write_buffer(&shared.vertices, 0, bytemuck::cast_slice(&vertices));
        drop(objects);

        self.submit_pass(&target, wgpu::LoadOp::Load, |rpass| {
            rpass.set_pipeline(&pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.set_viewport(vx, vy, vw, vh, 0.0, 1.0);
            rpass.set_vertex_buffer(0, shared.vertices.slice(..));
            rpass.set_index_buffer(shared.indices.slice(..), wgpu::IndexFormat::Uint16);
            rpass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
        });
        Ok(())
    }

    fn read_pixels(&mut self, width: u32, height: u32) -> Result<Vec<u8>, GpuError> {
        let Some(fb) = self.bound else {
            return Err(GpuError::Readback(
                "window surfaces cannot be read back".into(),
            ));
        };
        let objects = self.shared.objects.lock();
        let color = *objects
            .framebuffers
            .get(&fb.0)
            .ok_or(GpuError::UnknownFramebuffer(fb.0))?;
        let texture = objects.texture(color)?;
        if width > texture.desc.width || height > texture.desc.height {
            return Err(GpuError::Readback(format!(
                "{width}x{height} exceeds the {}x{} target",
                texture.desc.width, texture.desc.height
            )));
        }
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let pitch = padded_bytes_per_row(width);
        let device = &self.shared.device;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lutcam readback"),
            size: u64::from(pitch) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lutcam readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(pitch),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        drop(objects);
        self.shared.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| GpuError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| GpuError::Readback(e.to_string()))?
            .map_err(|e| GpuError::Readback(e.to_string()))?;

        let row = width as usize * 4;
        let mut out = Vec::with_capacity(row * height as usize);
        {
            let mapped = slice.get_mapped_range();
            for chunk in mapped.chunks(pitch as usize).take(height as usize) {
                out.extend_from_slice(&chunk[..row]);
            }
        }
        buffer.unmap();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_matches_shader_layout() {
        assert_eq!(std::mem::size_of::<QuadUniform>(), 80);
        assert_eq!(std::mem::size_of::<QuadVertex>(), 20);
    }

    #[test]
    fn readback_rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(512), 2048);
    }
}
