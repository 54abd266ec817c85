use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context as _;
use image::RgbaImage;

use crate::gpu::{GpuApi, ResourceBin, Scoped, TextureDesc, TextureId};

/// Intensity used when a pipeline is created without an explicit one.
pub const DEFAULT_INTENSITY: f32 = 0.9;

/// Filter strength shared between the owner thread and the render thread.
///
/// Writes are plain stores: the render thread picks up whatever value is
/// current when it draws, and the writer requests a render afterwards.
#[derive(Debug, Clone)]
pub struct SharedIntensity(Arc<AtomicU32>);

impl SharedIntensity {
    pub fn new(value: f32) -> Self {
        Self(Arc::new(AtomicU32::new(value.clamp(0.0, 1.0).to_bits())))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Stores `value` clamped to `0.0..=1.0`.
    pub fn set(&self, value: f32) {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for SharedIntensity {
    fn default() -> Self {
        Self::new(DEFAULT_INTENSITY)
    }
}

/// Which application directory a relative LUT path is resolved against.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FilterDir {
    /// Persistent, shipped or downloaded filters.
    Support,
    /// Purgeable filters, e.g. previews fetched on demand.
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LutSource {
    /// Image file. Absolute paths are used as-is.
    File { path: PathBuf, dir: FilterDir },
    /// Table registered with the loader under a name.
    Bundled(String),
}

impl LutSource {
    pub fn file(path: impl Into<PathBuf>, dir: FilterDir) -> Self {
        LutSource::File {
            path: path.into(),
            dir,
        }
    }

    pub fn bundled(name: impl Into<String>) -> Self {
        LutSource::Bundled(name.into())
    }
}

/// Turns a [`LutSource`] into a texture of the current context.
///
/// `None` means the source could not be decoded; the filter then stays
/// disabled instead of failing the frame.
pub trait LutLoader: Send + Sync {
    fn load(&self, source: &LutSource, gpu: &mut dyn GpuApi) -> Option<TextureId>;
}

#[derive(Debug, Clone)]
pub struct LutRoots {
    pub support_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl LutRoots {
    pub fn new(support_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            support_dir: support_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn resolve(&self, path: &Path, dir: FilterDir) -> PathBuf {
        match dir {
            FilterDir::Support => self.support_dir.join(path),
            FilterDir::Cache => self.cache_dir.join(path),
        }
    }
}

impl Default for LutRoots {
    fn default() -> Self {
        Self::new(".", std::env::temp_dir())
    }
}

/// Loads lookup images from disk (PNG/JPEG) or from an in-memory registry.
#[derive(Debug, Default)]
pub struct ImageLutLoader {
    roots: LutRoots,
    bundled: HashMap<String, RgbaImage>,
}

impl ImageLutLoader {
    pub fn new(roots: LutRoots) -> Self {
        Self {
            roots,
            bundled: HashMap::new(),
        }
    }

    pub fn with_bundled(mut self, name: impl Into<String>, table: RgbaImage) -> Self {
        self.bundled.insert(name.into(), table);
        self
    }

    pub fn bundled_names(&self) -> impl Iterator<Item = &str> {
        self.bundled.keys().map(String::as_str)
    }

    fn decode(&self, source: &LutSource) -> anyhow::Result<RgbaImage> {
        match source {
            LutSource::File { path, dir } => {
                let path = self.roots.resolve(path, *dir);
                let img = image::open(&path)
                    .with_context(|| format!("failed to decode LUT image {}", path.display()))?;
                Ok(img.to_rgba8())
            }
            LutSource::Bundled(name) => self
                .bundled
                .get(name)
                .cloned()
                .with_context(|| format!("no bundled LUT named `{name}`")),
        }
    }
}

impl LutLoader for ImageLutLoader {
    fn load(&self, source: &LutSource, gpu: &mut dyn GpuApi) -> Option<TextureId> {
        let table = match self.decode(source) {
            Ok(table) => table,
            Err(e) => {
                log::error!("LUT unavailable, filter disabled: {e:#}");
                return None;
            }
        };
        let (width, height) = table.dimensions();
        if (width, height) != (super::LUT_SIZE, super::LUT_SIZE) {
            log::warn!("LUT is {width}x{height}, expected a {0}x{0} table", super::LUT_SIZE);
        }

        let texture = match gpu.create_texture(&TextureDesc::lookup(width, height)) {
            Ok(texture) => texture,
            Err(e) => {
                log::error!("cannot allocate LUT texture: {e}");
                return None;
            }
        };
        if let Err(e) = gpu.upload_texture(texture, width, height, table.as_raw()) {
            log::error!("cannot upload LUT texture: {e}");
            gpu.delete_texture(texture);
            return None;
        }
        Some(texture)
    }
}

/// The color filter as seen by the draw: an optional lookup texture plus an
/// intensity. Filtering is enabled exactly when a lookup texture is present.
#[derive(Debug)]
pub struct FilterState {
    lut: Option<Scoped<TextureId>>,
    source: Option<LutSource>,
    intensity: SharedIntensity,
}

impl FilterState {
    pub fn new(intensity: SharedIntensity) -> Self {
        Self {
            lut: None,
            source: None,
            intensity,
        }
    }

    pub fn enabled(&self) -> bool {
        self.lut.is_some()
    }

    pub fn lut_texture(&self) -> Option<TextureId> {
        self.lut.as_ref().map(Scoped::get)
    }

    pub fn intensity(&self) -> f32 {
        self.intensity.get()
    }

    pub fn source(&self) -> Option<&LutSource> {
        self.source.as_ref()
    }

    /// Replaces the lookup table. The previous texture is queued for
    /// deletion. `None` disables filtering and zeroes the intensity;
    /// otherwise `intensity`, when given, becomes the new strength.
    pub fn apply(
        &mut self,
        gpu: &mut dyn GpuApi,
        bin: &ResourceBin,
        loader: &dyn LutLoader,
        source: Option<LutSource>,
        intensity: Option<f32>,
    ) {
        self.lut = None;
        match source {
            None => {
                self.source = None;
                self.intensity.set(0.0);
            }
            Some(source) => {
                if let Some(value) = intensity {
                    self.intensity.set(value);
                }
                self.lut = loader.load(&source, gpu).map(|id| bin.adopt(id));
                self.source = self.lut.as_ref().map(|_| source);
            }
        }
        log::debug!(
            "filter {} (intensity {:.2})",
            if self.enabled() { "enabled" } else { "disabled" },
            self.intensity()
        );
    }

    /// Reloads the remembered table into a fresh context.
    pub fn reload(&mut self, gpu: &mut dyn GpuApi, bin: &ResourceBin, loader: &dyn LutLoader) {
        self.lut = None;
        if let Some(source) = &self.source {
            self.lut = loader.load(source, gpu).map(|id| bin.adopt(id));
            if self.lut.is_none() {
                self.source = None;
            }
        }
    }

    /// Drops texture handles whose context is gone; the source is kept for
    /// [`FilterState::reload`].
    pub fn forget_textures(&mut self) {
        self.lut = None;
    }
}
