//! The pose estimation engine seam and its OpenCV dnn implementation.

use std::path::PathBuf;

use opencv::core::{Mat, Size};
use thiserror::Error;

pub mod caffe;
mod format;
mod heatmap;
#[cfg(test)]
pub(crate) mod mock;
mod render;
mod skeleton;

pub use caffe::CaffePoseEngine;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
    #[error("network output does not fit the expected layout")]
    Shape(#[from] ndarray::ShapeError),
    #[error("unexpected network output dimensions {0:?}")]
    OutputShape(Vec<usize>),
    #[error("pose model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("pose engine used before initialize_on_thread")]
    NotInitialized,
}

/// One detected body part, in input frame pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// Keypoints for every person found in one frame. Each person has one entry per body part of the
/// model; parts that were not detected have a score of zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeypointSet {
    people: Vec<Vec<Keypoint>>,
}

impl KeypointSet {
    pub fn new(people: Vec<Vec<Keypoint>>) -> Self {
        KeypointSet { people }
    }

    pub fn number_people(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn people(&self) -> impl Iterator<Item = &[Keypoint]> {
        self.people.iter().map(Vec::as_slice)
    }
}

/// A human pose estimator driven one frame at a time.
///
/// A frame passes through the methods in declaration order: both formatting steps, the forward
/// pass, keypoint extraction, rendering onto the output buffer, and conversion back to an image.
pub trait PoseEngine {
    /// Network input tensors for one frame.
    type NetInput;
    /// Render target, at output resolution.
    type OutputBuffer;

    /// Loads the network onto its compute device. Must run on the thread that will process frames,
    /// before the first frame.
    fn initialize_on_thread(&mut self) -> Result<(), EngineError>;

    fn format_input(&mut self, frame: &Mat) -> Result<Self::NetInput, EngineError>;

    /// Returns the output buffer and the factor mapping input frame coordinates into it.
    fn format_output(&mut self, frame: &Mat) -> Result<(f64, Self::OutputBuffer), EngineError>;

    fn forward_pass(&mut self, input: &Self::NetInput, frame_size: Size)
        -> Result<(), EngineError>;

    /// Keypoints found by the last forward pass.
    fn pose_keypoints(&self) -> Result<KeypointSet, EngineError>;

    fn render_pose(
        &mut self,
        output: &mut Self::OutputBuffer,
        keypoints: &KeypointSet,
        scale_input_to_output: f64,
    ) -> Result<(), EngineError>;

    fn to_image(&self, output: &Self::OutputBuffer) -> Result<Mat, EngineError>;
}
