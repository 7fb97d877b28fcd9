use std::{collections::VecDeque, path::PathBuf, time::SystemTime};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use opencv::{
    core::Mat,
    imgcodecs::{self, IMREAD_COLOR},
    prelude::*,
    videoio::{self, VideoCapture},
};

use crate::{
    engine::PoseEngine,
    message::{Encoding, Header, ImageMessage},
    pipeline::SkeletonTracker,
};

/// Something that publishes image messages one at a time.
pub trait FrameSource {
    fn next_message(&mut self) -> Result<Option<ImageMessage>>;
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}

/// Frames from a camera device, video file or stream URL.
pub struct CaptureSource {
    capture: VideoCapture,
    frame_id: String,
    seq: u32,
}

impl CaptureSource {
    /// Opens `source` as a device index when it parses as one, and as a file or URL otherwise.
    pub fn open(source: &str) -> Result<Self> {
        let capture = match source.parse::<i32>() {
            Ok(index) => VideoCapture::new(index, videoio::CAP_ANY),
            Err(_) => VideoCapture::from_file(source, videoio::CAP_ANY),
        }
        .with_context(|| format!("Failed to open capture source {source}"))?;

        if !capture.is_opened()? {
            bail!("Capture source {source} could not be opened");
        }

        info!("Subscribed to capture source {}", source);

        Ok(CaptureSource {
            capture,
            frame_id: source.to_string(),
            seq: 0,
        })
    }
}

impl FrameSource for CaptureSource {
    fn next_message(&mut self) -> Result<Option<ImageMessage>> {
        let mut frame = Mat::default();

        if !self.capture.read(&mut frame)? || frame.empty() {
            debug!("Capture source {} exhausted", self.frame_id);
            return Ok(None);
        }

        let header = Header {
            seq: self.seq,
            stamp: now_secs(),
            frame_id: self.frame_id.clone(),
        };
        self.seq += 1;

        let msg = ImageMessage::from_mat(header, &frame, Encoding::Bgr8)
            .context("Failed to read frame from camera")?;

        Ok(Some(msg))
    }
}

/// Replays still images from disk, one message per file. Files that cannot be read are logged
/// and skipped.
pub struct ImageFileSource {
    paths: VecDeque<PathBuf>,
    seq: u32,
}

impl ImageFileSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        ImageFileSource {
            paths: paths.into(),
            seq: 0,
        }
    }
}

impl FrameSource for ImageFileSource {
    fn next_message(&mut self) -> Result<Option<ImageMessage>> {
        let (path, image) = loop {
            let path = match self.paths.pop_front() {
                Some(path) => path,
                None => return Ok(None),
            };

            let image = imgcodecs::imread(&path.to_string_lossy(), IMREAD_COLOR)
                .context("reading image from disk")?;

            if image.empty() {
                warn!("Skipping unreadable image {}", path.display());
                continue;
            }

            break (path, image);
        };

        let header = Header {
            seq: self.seq,
            stamp: now_secs(),
            frame_id: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        self.seq += 1;

        Ok(Some(ImageMessage::from_mat(header, &image, Encoding::Bgr8)?))
    }
}

/// Feeds every message from `source` through `tracker`, one at a time, handing each rendered
/// frame to `on_output`. Returns once the source is exhausted.
pub fn spin<Source, Engine, F>(
    source: &mut Source,
    tracker: &mut SkeletonTracker<Engine>,
    mut on_output: F,
) -> Result<()>
where
    Source: FrameSource,
    Engine: PoseEngine,
    F: FnMut(&ImageMessage, Mat) -> Result<()>,
{
    while let Some(msg) = source.next_message()? {
        if let Some(output) = tracker.image_callback(&msg) {
            on_output(&msg, output)?;
        }
    }

    info!(
        "Source exhausted: {} frames rendered, {} dropped",
        tracker.frames_rendered(),
        tracker.frames_dropped()
    );

    Ok(())
}
