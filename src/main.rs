use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use skeleton_tracking::{
    config::Options,
    display::DebugWindow,
    engine::CaffePoseEngine,
    pipeline::SkeletonTracker,
    source::{self, CaptureSource},
};

#[derive(Debug, Parser)]
#[clap(about)]
struct Args {
    /// JSON file with pose options. Replaces the option flags when given
    #[clap(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Show the input frames and the rendered skeletons in debug windows
    #[clap(short, long)]
    debug: bool,

    #[clap(flatten)]
    options: Options,

    /// Camera device index, video file or stream URL to subscribe to
    #[clap(default_value = "0")]
    source: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let options = match &args.config {
        Some(path) => Options::from_json_file(path)?,
        None => args.options.clone(),
    };
    let config = options.resolve().context("Invalid pose configuration")?;
    config.init_logger();

    info!(
        "Tracking {} skeletons: output {}, net input {}, {} scale(s)",
        config.pose_model, config.output_size, config.net_input_size, config.num_scales
    );

    let window = if args.debug {
        Some(DebugWindow::open(config.output_size.size()).context("Failed to open debug window")?)
    } else {
        None
    };

    let engine = CaffePoseEngine::new(&config);
    let mut tracker =
        SkeletonTracker::new(engine, window).context("Failed to initialize pose engine")?;

    let mut camera = CaptureSource::open(&args.source)?;

    source::spin(&mut camera, &mut tracker, |_, _| Ok(()))
}
