//! CPU implementation of the GL-call interface.
//!
//! Follows GL conventions throughout: framebuffer row 0 is the bottom row,
//! NDC (-1, -1) lands on the bottom-left pixel and texture coordinate t = 0
//! addresses the first uploaded row. Textures are sampled nearest with
//! clamp-to-edge, which keeps results exact enough to assert on.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::render::lut;

use super::{
    FramebufferId, GpuApi, GpuError, ProgramId, ProgramKind, QuadDraw, QuadUniforms, TextureDesc,
    TextureId, TextureKind, validate_bindings,
};

/// RGBA8 image stored bottom row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel at column `x` of row `y`, counted from the bottom.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    fn put(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = self.offset(x, y);
        self.pixels[i..i + 4].copy_from_slice(&rgba);
    }

    fn sample_nearest(&self, s: f32, t: f32) -> [f32; 4] {
        let texel = |coord: f32, extent: u32| -> u32 {
            let i = (coord * extent as f32).floor();
            (i.max(0.0) as u32).min(extent.saturating_sub(1))
        };
        let [r, g, b, a] = self.pixel(texel(s, self.width), texel(t, self.height));
        [
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        ]
    }
}

struct SoftTexture {
    kind: TextureKind,
    image: PixelBuffer,
}

/// Object namespace of one software context.
#[derive(Default)]
pub struct SoftwareDevice {
    next_id: u32,
    textures: HashMap<u32, SoftTexture>,
    /// framebuffer -> color attachment
    framebuffers: HashMap<u32, TextureId>,
    programs: HashMap<u32, ProgramKind>,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_objects(&self) -> usize {
        self.live_textures() + self.live_framebuffers() + self.live_programs()
    }

    pub fn texture_pixels(&self, texture: TextureId) -> Option<PixelBuffer> {
        self.textures.get(&texture.0).map(|t| t.image.clone())
    }

    fn alloc(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn texture_kind(&self, id: TextureId) -> Result<TextureKind, GpuError> {
        self.textures
            .get(&id.0)
            .map(|t| t.kind)
            .ok_or(GpuError::UnknownTexture(id.0))
    }
}

pub type SharedDevice = Arc<Mutex<SoftwareDevice>>;
pub type SharedPixels = Arc<Mutex<PixelBuffer>>;

#[derive(Debug, Copy, Clone)]
struct Viewport {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

/// Software GL bound to one context and one window surface.
pub struct SoftwareGpu {
    device: SharedDevice,
    surface: SharedPixels,
    bound: Option<FramebufferId>,
    viewport: Viewport,
}

impl SoftwareGpu {
    pub fn new(device: SharedDevice, surface: SharedPixels) -> Self {
        let (width, height) = {
            let px = surface.lock();
            (px.width(), px.height())
        };
        Self {
            device,
            surface,
            bound: None,
            viewport: Viewport {
                x: 0,
                y: 0,
                width,
                height,
            },
        }
    }

    /// A context with its own device and a `width x height` surface.
    pub fn standalone(width: u32, height: u32) -> Self {
        Self::new(
            Arc::new(Mutex::new(SoftwareDevice::new())),
            Arc::new(Mutex::new(PixelBuffer::new(width, height))),
        )
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    pub fn surface(&self) -> &SharedPixels {
        &self.surface
    }

    fn attachment(&self, device: &SoftwareDevice) -> Result<Option<TextureId>, GpuError> {
        match self.bound {
            None => Ok(None),
            Some(fb) => device
                .framebuffers
                .get(&fb.0)
                .copied()
                .map(Some)
                .ok_or(GpuError::UnknownFramebuffer(fb.0)),
        }
    }

    /// Runs `f` against the bound render target with the device available for
    /// sampling. The attachment is detached from the texture table meanwhile,
    /// which is sound because draws never sample their own attachment.
    fn with_target<R>(
        &mut self,
        f: impl FnOnce(&mut PixelBuffer, &SoftwareDevice) -> R,
    ) -> Result<R, GpuError> {
        match self.bound {
            None => {
                let mut surface = self.surface.lock();
                let device = self.device.lock();
                Ok(f(&mut surface, &device))
            }
            Some(_) => {
                let mut device = self.device.lock();
                let Some(attachment) = self.attachment(&device)? else {
                    return Err(GpuError::UnknownFramebuffer(0));
                };
                let mut texture = device
                    .textures
                    .remove(&attachment.0)
                    .ok_or(GpuError::UnknownTexture(attachment.0))?;
                let out = f(&mut texture.image, &device);
                device.textures.insert(attachment.0, texture);
                Ok(out)
            }
        }
    }
}

impl GpuApi for SoftwareGpu {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GpuError::ZeroSize);
        }
        let mut device = self.device.lock();
        let id = device.alloc();
        device.textures.insert(
            id,
            SoftTexture {
                kind: desc.kind,
                image: PixelBuffer::new(desc.width, desc.height),
            },
        );
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
        let mut device = self.device.lock();
        let tex = device
            .textures
            .get_mut(&texture.0)
            .ok_or(GpuError::UnknownTexture(texture.0))?;
        tex.image = PixelBuffer {
            width,
            height,
            pixels: rgba.to_vec(),
        };
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        let mut device = self.device.lock();
        device.textures.remove(&texture.0);
        device.framebuffers.retain(|_, color| *color != texture);
    }

    fn create_framebuffer(&mut self, color: TextureId) -> Result<FramebufferId, GpuError> {
        let mut device = self.device.lock();
        device.texture_kind(color)?;
        let id = device.alloc();
        device.framebuffers.insert(id, color);
        Ok(FramebufferId(id))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.device.lock().framebuffers.remove(&framebuffer.0);
        if self.bound == Some(framebuffer) {
            self.bound = None;
        }
    }

    fn create_program(&mut self, kind: ProgramKind) -> Result<ProgramId, GpuError> {
        let mut device = self.device.lock();
        let id = device.alloc();
        device.programs.insert(id, kind);
        Ok(ProgramId(id))
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.device.lock().programs.remove(&program.0);
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<(), GpuError> {
        if let Some(fb) = framebuffer {
            if !self.device.lock().framebuffers.contains_key(&fb.0) {
                return Err(GpuError::UnknownFramebuffer(fb.0));
            }
        }
        self.bound = framebuffer;
        Ok(())
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Viewport {
            x,
            y,
            width,
            height,
        };
    }

    fn clear(&mut self, color: [f32; 4]) -> Result<(), GpuError> {
        let rgba = color.map(to_unorm8);
        self.with_target(|target, _| target.fill(rgba))
    }

    fn draw_quad(&mut self, draw: &QuadDraw<'_>) -> Result<(), GpuError> {
        let kind = {
            let device = self.device.lock();
            let kind = *device
                .programs
                .get(&draw.program.0)
                .ok_or(GpuError::UnknownProgram(draw.program.0))?;
            let mut bindings = [None, None];
            for (slot, texture) in bindings.iter_mut().zip(draw.textures) {
                if let Some(id) = texture {
                    *slot = Some((id, device.texture_kind(id)?));
                }
            }
            validate_bindings(kind, &bindings, self.attachment(&device)?)?;
            kind
        };

        let ndc = draw.positions.map(|p| {
            let c = draw.matrix.transform_point(p);
            let w = if c[3] == 0.0 { 1.0 } else { c[3] };
            [c[0] / w, c[1] / w]
        });
        let tex_coords = *draw.tex_coords;
        let units = draw.textures;
        let uniforms = draw.uniforms;
        let viewport = self.viewport;

        self.with_target(|target, device| {
            let sources = units.map(|unit| {
                unit.and_then(|id| device.textures.get(&id.0))
                    .map(|t| &t.image)
            });
            rasterize_fan(target, viewport, &ndc, &tex_coords, |st| {
                shade(kind, uniforms, &sources, st)
            });
        })
    }

    fn read_pixels(&mut self, width: u32, height: u32) -> Result<Vec<u8>, GpuError> {
        self.with_target(|target, _| {
            if width > target.width() || height > target.height() {
                return Err(GpuError::Readback(format!(
                    "{width}x{height} exceeds the {}x{} target",
                    target.width(),
                    target.height()
                )));
            }
            let mut out = Vec::with_capacity(width as usize * height as usize * 4);
            for y in 0..height {
                let start = target.offset(0, y);
                out.extend_from_slice(&target.pixels[start..start + width as usize * 4]);
            }
            Ok(out)
        })?
    }
}

fn to_unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn shade(
    kind: ProgramKind,
    uniforms: QuadUniforms,
    sources: &[Option<&PixelBuffer>; 2],
    st: [f32; 2],
) -> [u8; 4] {
    let Some(input) = sources[0] else {
        return [0, 0, 0, 0];
    };
    let color = input.sample_nearest(st[0], st[1]);
    let out = match (kind, uniforms.filter_enabled, sources[1]) {
        (ProgramKind::ColorLut, true, Some(table)) => {
            let graded = lut::grade(color, |s, t| table.sample_nearest(s, t));
            lut::blend(color, graded, uniforms.intensity)
        }
        _ => color,
    };
    out.map(to_unorm8)
}

const FAN_TRIANGLES: [[usize; 3]; 2] = [[0, 1, 2], [0, 2, 3]];

fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

/// Fills the quad given as a triangle fan, sampling at pixel centers.
fn rasterize_fan(
    target: &mut PixelBuffer,
    viewport: Viewport,
    ndc: &[[f32; 2]; 4],
    tex_coords: &[[f32; 2]; 4],
    mut shade: impl FnMut([f32; 2]) -> [u8; 4],
) {
    const EPS: f32 = 1e-5;

    let window = ndc.map(|[x, y]| {
        [
            viewport.x as f32 + (x + 1.0) * 0.5 * viewport.width as f32,
            viewport.y as f32 + (y + 1.0) * 0.5 * viewport.height as f32,
        ]
    });

    let clip_x0 = viewport.x.max(0) as f32;
    let clip_y0 = viewport.y.max(0) as f32;
    let clip_x1 = ((viewport.x + viewport.width as i32).max(0) as u32).min(target.width()) as f32;
    let clip_y1 =
        ((viewport.y + viewport.height as i32).max(0) as u32).min(target.height()) as f32;

    for [i0, i1, i2] in FAN_TRIANGLES {
        let (v0, v1, v2) = (window[i0], window[i1], window[i2]);
        let area = edge(v0, v1, v2);
        if area.abs() < EPS {
            continue;
        }

        let min_x = v0[0].min(v1[0]).min(v2[0]).floor().max(clip_x0) as u32;
        let max_x = v0[0].max(v1[0]).max(v2[0]).ceil().min(clip_x1) as u32;
        let min_y = v0[1].min(v1[1]).min(v2[1]).floor().max(clip_y0) as u32;
        let max_y = v0[1].max(v1[1]).max(v2[1]).ceil().min(clip_y1) as u32;

        for y in min_y..max_y {
            for x in min_x..max_x {
                let p = [x as f32 + 0.5, y as f32 + 0.5];
                let w0 = edge(v1, v2, p) / area;
                let w1 = edge(v2, v0, p) / area;
                let w2 = edge(v0, v1, p) / area;
                if w0 < -EPS || w1 < -EPS || w2 < -EPS {
                    continue;
                }
                let (t0, t1, t2) = (tex_coords[i0], tex_coords[i1], tex_coords[i2]);
                let st = [
                    w0 * t0[0] + w1 * t1[0] + w2 * t2[0],
                    w0 * t0[1] + w1 * t1[1] + w2 * t2[1],
                ];
                target.put(x, y, shade(st));
            }
        }
    }
}
