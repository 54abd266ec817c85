//! Stand-in camera: a thread that pushes generated frames into the pipeline.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::imageops::FilterType;

use lutcam_engine::source::{CpuFrameSource, Frame, FrameSizeError};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Moving color bars with a sweeping bright column, so grading changes are
/// easy to see across the whole tonal range.
pub fn bars_frame(width: u32, height: u32, t: f32) -> Result<Frame, FrameSizeError> {
    let sweep = ((t * 0.25).fract() * width as f32) as u32;
    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        let v = 1.0 - y as f32 / height.max(1) as f32;
        for x in 0..width {
            let u = x as f32 / width.max(1) as f32;
            let hue = (u + t * 0.05).fract();
            let [r, g, b] = hue_to_rgb(hue).map(|c| c * (0.15 + 0.85 * v));
            let px = if x.abs_diff(sweep) < 3 {
                [255, 255, 255, 255]
            } else {
                [to_u8(r), to_u8(g), to_u8(b), 255]
            };
            rgba.extend_from_slice(&px);
        }
    }
    Frame::new(width, height, rgba)
}

fn hue_to_rgb(h: f32) -> [f32; 3] {
    let h6 = h * 6.0;
    let f = |offset: f32| (((h6 + offset) % 6.0 - 3.0).abs() - 1.0).clamp(0.0, 1.0);
    [f(0.0), f(4.0), f(2.0)]
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Decodes `path` and scales it to exactly `width`x`height`.
pub fn load_still(path: &Path, width: u32, height: u32) -> Result<Frame> {
    let img = image::open(path)
        .with_context(|| format!("failed to decode still image {}", path.display()))?
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgba8();
    Ok(Frame::new(width, height, img.into_raw())?)
}

pub enum FeedMode {
    Live,
    Still(Frame),
}

/// Owns the producer thread; stops and joins it on drop.
pub struct SyntheticFeed {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SyntheticFeed {
    pub fn start(
        source: Arc<CpuFrameSource>,
        width: u32,
        height: u32,
        mode: FeedMode,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name("lutcam-feed".into())
            .spawn(move || run(source, width, height, mode, flag))
            .context("failed to spawn feed thread")?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

fn run(
    source: Arc<CpuFrameSource>,
    width: u32,
    height: u32,
    mode: FeedMode,
    stop: Arc<AtomicBool>,
) {
    let started = Instant::now();
    let still = match mode {
        FeedMode::Still(frame) => Some(frame),
        FeedMode::Live => None,
    };
    log::debug!("feed running at {width}x{height}");

    while !stop.load(Ordering::Relaxed) {
        let frame = match &still {
            // re-sent so a recreated context gets it too
            Some(frame) => frame.clone(),
            None => match bars_frame(width, height, started.elapsed().as_secs_f32()) {
                Ok(frame) => frame,
                Err(e) => {
                    log::error!("feed stopped: {e}");
                    return;
                }
            },
        };
        source.push_frame(frame);
        thread::sleep(FRAME_INTERVAL);
    }
    log::debug!(
        "feed stopped: {} imported, {} dropped",
        source.frames_imported(),
        source.frames_dropped()
    );
}

impl Drop for SyntheticFeed {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("feed thread panicked");
            }
        }
    }
}
