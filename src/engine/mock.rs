use std::{cell::RefCell, rc::Rc};

use opencv::{
    core::{Mat, Size},
    prelude::*,
};

use super::{EngineError, Keypoint, KeypointSet, PoseEngine};

/// Records every engine call in order and can be told to fail at one of them.
#[derive(Default)]
pub(crate) struct RecordingEngine {
    pub calls: Rc<RefCell<Vec<&'static str>>>,
    pub fail_at: Option<&'static str>,
    pub scale: f64,
}

impl RecordingEngine {
    pub fn new() -> Self {
        RecordingEngine {
            scale: 1.5,
            ..RecordingEngine::default()
        }
    }

    fn record(&self, call: &'static str) -> Result<(), EngineError> {
        self.calls.borrow_mut().push(call);

        if self.fail_at == Some(call) {
            return Err(EngineError::NotInitialized);
        }

        Ok(())
    }
}

impl PoseEngine for RecordingEngine {
    type NetInput = Size;
    type OutputBuffer = Vec<f64>;

    fn initialize_on_thread(&mut self) -> Result<(), EngineError> {
        self.record("initialize_on_thread")
    }

    fn format_input(&mut self, frame: &Mat) -> Result<Size, EngineError> {
        self.record("format_input")?;
        Ok(frame.size()?)
    }

    fn format_output(&mut self, _frame: &Mat) -> Result<(f64, Vec<f64>), EngineError> {
        self.record("format_output")?;
        Ok((self.scale, Vec::new()))
    }

    fn forward_pass(&mut self, input: &Size, frame_size: Size) -> Result<(), EngineError> {
        self.record("forward_pass")?;
        assert_eq!(*input, frame_size);
        Ok(())
    }

    fn pose_keypoints(&self) -> Result<KeypointSet, EngineError> {
        self.record("pose_keypoints")?;
        Ok(KeypointSet::new(vec![vec![Keypoint::default(); 18]]))
    }

    fn render_pose(
        &mut self,
        output: &mut Vec<f64>,
        keypoints: &KeypointSet,
        scale_input_to_output: f64,
    ) -> Result<(), EngineError> {
        self.record("render_pose")?;
        assert_eq!(keypoints.number_people(), 1);
        output.push(scale_input_to_output);
        Ok(())
    }

    fn to_image(&self, output: &Vec<f64>) -> Result<Mat, EngineError> {
        self.record("to_image")?;
        assert_eq!(output.as_slice(), &[self.scale]);
        Ok(Mat::default())
    }
}
