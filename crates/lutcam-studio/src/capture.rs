//! Writes captured frames to PNG files off the render thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use image::RgbaImage;

use lutcam_engine::render::{CaptureSink, CapturedImage};

pub struct CaptureWriter {
    tx: Option<Sender<CapturedImage>>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureWriter {
    pub fn start(dir: PathBuf) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<CapturedImage>();
        let handle = thread::Builder::new()
            .name("lutcam-capture".into())
            .spawn(move || {
                let stamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                for (index, image) in rx.into_iter().enumerate() {
                    let path = dir.join(format!("lutcam-{stamp}-{index:03}.png"));
                    match write_png(&path, &image) {
                        Ok(()) => log::info!("capture saved to {}", path.display()),
                        Err(e) => log::error!("{e:#}"),
                    }
                }
            })
            .context("failed to spawn capture writer")?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Sink handed to the pipeline; frames are queued to the writer thread.
    pub fn sink(&self) -> Arc<dyn CaptureSink> {
        let tx = self.tx.clone();
        Arc::new(move |image: CapturedImage| {
            if let Some(tx) = &tx {
                if tx.send(image).is_err() {
                    log::warn!("capture dropped, writer has stopped");
                }
            }
        })
    }

    /// Waits for queued captures to be written. Sinks handed out earlier must
    /// be dropped first, or this blocks.
    pub fn finish(mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("capture writer panicked");
            }
        }
    }
}

pub fn to_rgba_image(image: &CapturedImage) -> Option<RgbaImage> {
    if image.pixels.len() != image.width as usize * image.height as usize * 4 {
        return None;
    }
    RgbaImage::from_raw(image.width, image.height, image.to_top_down())
}

fn write_png(path: &Path, image: &CapturedImage) -> Result<()> {
    let img = to_rgba_image(image).with_context(|| {
        format!(
            "capture of {}x{} has {} bytes",
            image.width,
            image.height,
            image.pixels.len()
        )
    })?;
    img.save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_rows_are_flipped_for_encoding() {
        let image = CapturedImage {
            width: 1,
            height: 2,
            pixels: vec![1, 1, 1, 255, 2, 2, 2, 255],
        };
        let img = to_rgba_image(&image).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [2, 2, 2, 255]);
        assert_eq!(img.get_pixel(0, 1).0, [1, 1, 1, 255]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let image = CapturedImage {
            width: 2,
            height: 2,
            pixels: vec![0; 4],
        };
        assert!(to_rgba_image(&image).is_none());
    }
}
