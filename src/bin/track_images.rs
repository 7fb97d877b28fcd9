use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use opencv::{core::Vector, imgcodecs};
use skeleton_tracking::{
    config::Options,
    engine::CaffePoseEngine,
    pipeline::SkeletonTracker,
    source::{self, ImageFileSource},
};

#[derive(Debug, Parser)]
#[clap(about)]
struct Args {
    /// JSON file with pose options. Replaces the option flags when given
    #[clap(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Directory the rendered images are written to
    #[clap(short, long, parse(from_os_str))]
    out_dir: PathBuf,

    #[clap(flatten)]
    options: Options,

    /// Images to estimate poses on
    #[clap(parse(from_os_str), required = true)]
    image_paths: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let options = match &args.config {
        Some(path) => Options::from_json_file(path)?,
        None => args.options.clone(),
    };
    let config = options.resolve().context("Invalid pose configuration")?;
    config.init_logger();

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating output directory {:?}", args.out_dir))?;

    let mut tracker = SkeletonTracker::new(CaffePoseEngine::new(&config), None)
        .context("Failed to initialize pose engine")?;

    let mut images = ImageFileSource::new(args.image_paths);
    let out_dir = args.out_dir;

    source::spin(&mut images, &mut tracker, |msg, rendered| {
        let out_path = out_dir.join(&msg.header.frame_id);

        imgcodecs::imwrite(&out_path.to_string_lossy(), &rendered, &Vector::new())
            .context("writing rendered image to disk")?;

        info!("Wrote {}", out_path.display());

        Ok(())
    })
}
