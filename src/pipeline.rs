use log::{error, trace, warn};
use opencv::{core::Mat, prelude::*};
use thiserror::Error;

use crate::{
    display::DebugWindow,
    engine::{EngineError, PoseEngine},
    message::{DecodeError, ImageMessage, TARGET_ENCODING},
};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("pose engine failed")]
    Engine(#[from] EngineError),
}

/// Runs every incoming frame through the pose engine and optionally shows the result.
///
/// Fields drop in declaration order, so the engine is released before the window it was created
/// after.
pub struct SkeletonTracker<Engine: PoseEngine> {
    engine: Engine,
    window: Option<DebugWindow>,
    frames_rendered: u64,
    frames_dropped: u64,
}

impl<Engine: PoseEngine> SkeletonTracker<Engine> {
    /// Takes ownership of an already opened debug window, if any, and initializes the engine on
    /// the calling thread.
    pub fn new(mut engine: Engine, window: Option<DebugWindow>) -> Result<Self, EngineError> {
        engine.initialize_on_thread()?;

        Ok(SkeletonTracker {
            engine,
            window,
            frames_rendered: 0,
            frames_dropped: 0,
        })
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Handles one image message. Failures are logged and the frame is dropped.
    pub fn image_callback(&mut self, msg: &ImageMessage) -> Option<Mat> {
        let frame = match msg.to_bgra8() {
            Ok(frame) => frame,
            Err(err) => {
                error!(
                    "Could not convert from '{}' to '{}': {}",
                    err.encoding(),
                    TARGET_ENCODING,
                    err
                );
                self.frames_dropped += 1;
                return None;
            }
        };

        let output = match self.process_frame(&frame) {
            Ok(output) => output,
            Err(err) => {
                error!("Dropping frame {}: {:#}", msg.header.seq, anyhow::Error::new(err));
                self.frames_dropped += 1;
                return None;
            }
        };

        if let Some(window) = &self.window {
            if let Err(err) = window.show(&frame, &output) {
                warn!("Failed to display frame {}: {}", msg.header.seq, err);
            }
        }

        self.frames_rendered += 1;

        Some(output)
    }

    /// Estimates and renders the pose for one decoded `bgra8` frame.
    pub fn process_frame(&mut self, frame: &Mat) -> Result<Mat, FrameError> {
        let frame_size = frame.size().map_err(EngineError::from)?;

        let net_input = self.engine.format_input(frame)?;
        let (scale_input_to_output, mut output) = self.engine.format_output(frame)?;

        self.engine.forward_pass(&net_input, frame_size)?;
        let keypoints = self.engine.pose_keypoints()?;
        trace!("Detected {} people", keypoints.number_people());

        self.engine
            .render_pose(&mut output, &keypoints, scale_input_to_output)?;

        Ok(self.engine.to_image(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Mutex, Once};

    use log::{LevelFilter, Log, Metadata, Record};
    use opencv::core::{Scalar, CV_8UC4};

    use crate::{
        engine::mock::RecordingEngine,
        message::{Encoding, Header},
    };

    const FRAME_STEPS: &[&str] = &[
        "format_input",
        "format_output",
        "forward_pass",
        "pose_keypoints",
        "render_pose",
        "to_image",
    ];

    fn bgr_message(seq: u32) -> ImageMessage {
        let mat = Mat::new_rows_cols_with_default(4, 6, opencv::core::CV_8UC3, Scalar::all(50.))
            .unwrap();
        let header = Header {
            seq,
            ..Header::default()
        };
        ImageMessage::from_mat(header, &mat, Encoding::Bgr8).unwrap()
    }

    /// Keeps every formatted log line so tests can check what was reported.
    struct CapturingLogger {
        lines: Mutex<Vec<String>>,
    }

    impl Log for CapturingLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            let line = format!("[{}] {}", record.level(), record.args());
            self.lines.lock().unwrap_or_else(|e| e.into_inner()).push(line);
        }

        fn flush(&self) {}
    }

    static LOGGER: CapturingLogger = CapturingLogger {
        lines: Mutex::new(Vec::new()),
    };

    fn captured_logs() -> &'static CapturingLogger {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            log::set_logger(&LOGGER).unwrap();
            log::set_max_level(LevelFilter::Trace);
        });
        &LOGGER
    }

    fn tracker(engine: RecordingEngine) -> SkeletonTracker<RecordingEngine> {
        SkeletonTracker::new(engine, None).unwrap()
    }

    #[test]
    fn test_steps_run_once_in_order() {
        let engine = RecordingEngine::new();
        let calls = engine.calls.clone();
        let mut tracker = tracker(engine);

        let frame = Mat::new_rows_cols_with_default(4, 6, CV_8UC4, Scalar::all(0.)).unwrap();
        tracker.process_frame(&frame).unwrap();

        let mut expected = vec!["initialize_on_thread"];
        expected.extend_from_slice(FRAME_STEPS);
        assert_eq!(*calls.borrow(), expected);
    }

    #[test]
    fn test_callback_produces_one_image_per_frame() {
        let engine = RecordingEngine::new();
        let calls = engine.calls.clone();
        let mut tracker = tracker(engine);

        assert!(tracker.image_callback(&bgr_message(0)).is_some());
        assert!(tracker.image_callback(&bgr_message(1)).is_some());

        assert_eq!(calls.borrow().len(), 1 + 2 * FRAME_STEPS.len());
        assert_eq!(tracker.frames_rendered(), 2);
        assert_eq!(tracker.frames_dropped(), 0);
    }

    #[test]
    fn test_undecodable_frame_is_dropped() {
        let logs = captured_logs();
        let engine = RecordingEngine::new();
        let calls = engine.calls.clone();
        let mut tracker = tracker(engine);

        let mut msg = bgr_message(0);
        msg.encoding = "yuv422".to_string();

        assert!(tracker.image_callback(&msg).is_none());
        assert_eq!(*calls.borrow(), vec!["initialize_on_thread"]);
        assert_eq!(tracker.frames_dropped(), 1);
        assert!(logs
            .lines
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.starts_with("[ERROR] Could not convert from 'yuv422' to 'bgra8'")));

        // The next good frame still goes through.
        assert!(tracker.image_callback(&bgr_message(1)).is_some());
        assert_eq!(tracker.frames_rendered(), 1);
    }

    #[test]
    fn test_engine_failure_is_distinguished_from_decode_failure() {
        let engine = RecordingEngine {
            fail_at: Some("forward_pass"),
            ..RecordingEngine::new()
        };
        let calls = engine.calls.clone();
        let mut tracker = tracker(engine);

        let frame = Mat::new_rows_cols_with_default(4, 6, CV_8UC4, Scalar::all(0.)).unwrap();
        let err = tracker.process_frame(&frame).unwrap_err();

        assert!(matches!(err, FrameError::Engine(EngineError::NotInitialized)));
        assert_eq!(calls.borrow().last(), Some(&"forward_pass"));

        assert!(tracker.image_callback(&bgr_message(0)).is_none());
        assert_eq!(tracker.frames_dropped(), 1);
    }

    #[test]
    fn test_initialization_failure_is_fatal() {
        let engine = RecordingEngine {
            fail_at: Some("initialize_on_thread"),
            ..RecordingEngine::new()
        };

        assert!(SkeletonTracker::new(engine, None).is_err());
    }
}
