mod app;
mod capture;
mod feed;
mod luts;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use winit::event_loop::EventLoop;

use lutcam_engine::logging::{LoggingConfig, init_logging};
use lutcam_engine::render::SourceKind;

use app::{Studio, StudioSettings};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum Source {
    Back,
    Front,
    Image,
}

impl From<Source> for SourceKind {
    fn from(source: Source) -> Self {
        match source {
            Source::Back => SourceKind::CameraBack,
            Source::Front => SourceKind::CameraFront,
            Source::Image => SourceKind::Image,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "lutcam-studio",
    version,
    about = "Preview a synthetic camera feed through color lookup tables"
)]
struct Args {
    /// Render width in pixels
    #[arg(long, default_value_t = 960)]
    width: u32,
    /// Render height in pixels
    #[arg(long, default_value_t = 540)]
    height: u32,
    /// Extra 512x512 LUT images to cycle through, after the bundled ones
    #[arg(long = "lut", value_name = "FILE")]
    luts: Vec<PathBuf>,
    /// Directory captured PNGs are written to
    #[arg(long, value_name = "DIR", default_value = ".")]
    capture_dir: PathBuf,
    /// What the feed pretends to be
    #[arg(long, value_enum, default_value_t = Source::Back)]
    source: Source,
    /// Still image shown with `--source image` (a test card when omitted)
    #[arg(long, value_name = "FILE")]
    image: Option<PathBuf>,
    /// Initial filter strength, 0 to 1
    #[arg(long, default_value_t = lutcam_engine::render::DEFAULT_INTENSITY)]
    intensity: f32,
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    init_logging(LoggingConfig::default().with_default_level(level));

    if args.width == 0 || args.height == 0 {
        bail!("render size must be non-zero, got {}x{}", args.width, args.height);
    }
    if args.image.is_some() && args.source != Source::Image {
        log::warn!("--image is only used with --source image");
    }
    std::fs::create_dir_all(&args.capture_dir).with_context(|| {
        format!(
            "failed to create capture directory {}",
            args.capture_dir.display()
        )
    })?;

    let settings = StudioSettings {
        width: args.width,
        height: args.height,
        source_kind: args.source.into(),
        still: args.image,
        lut_files: args.luts,
        capture_dir: args.capture_dir,
        intensity: args.intensity,
    };

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut studio = Studio::new(settings)?;
    event_loop
        .run_app(&mut studio)
        .context("winit event loop terminated with error")?;

    studio.finish()
}
