use log::{debug, info, warn};
use opencv::{
    core::{self, Mat, Size, CV_8U, CV_32F},
    dnn::{self, Net},
    prelude::*,
};

use super::{
    format::{self, resize_fixed_aspect},
    heatmap::Heatmaps,
    render, EngineError, Keypoint, KeypointSet, PoseEngine,
};
use crate::config::{Config, PoseModel};

/// Heatmap responses below this do not count as a detected part.
const PART_THRESHOLD: f32 = 0.1;

/// Input tensors for every averaged scale of one frame.
pub struct NetInputArray {
    /// Each blob paired with its resize factor relative to the first blob.
    blobs: Vec<(f32, Mat)>,
    /// Size of the first blob, after flooring to the network stride.
    net_size: Size,
    scale_frame_to_net: f64,
}

pub struct OutputArray {
    mat: Mat,
}

struct ForwardResult {
    heatmaps: Heatmaps,
    /// Input frame pixels per heatmap cell.
    frame_per_cell: (f32, f32),
}

/// Input frame pixels covered by one cell of the heatmaps computed from `input`.
fn frame_per_cell(input: &NetInputArray, heatmaps: &Heatmaps) -> (f32, f32) {
    let per_cell = |net_side: i32, cells: usize| {
        (net_side as f64 / cells as f64 / input.scale_frame_to_net) as f32
    };

    (
        per_cell(input.net_size.width, heatmaps.cols()),
        per_cell(input.net_size.height, heatmaps.rows()),
    )
}

/// Pose estimation on the Caffe body pose networks, run through OpenCV's dnn module.
pub struct CaffePoseEngine {
    config: Config,
    net: Option<Net>,
    last_forward: Option<ForwardResult>,
}

impl CaffePoseEngine {
    pub fn new(config: &Config) -> Self {
        CaffePoseEngine {
            config: config.clone(),
            net: None,
            last_forward: None,
        }
    }

    pub fn pose_model(&self) -> PoseModel {
        self.config.pose_model
    }

    fn select_device(&self, net: &mut Net) -> Result<(), EngineError> {
        let gpu = self.config.num_gpu_start;
        let devices = core::get_cuda_enabled_device_count()?;

        if gpu < devices {
            core::set_device(gpu)?;
            net.set_preferable_backend(dnn::DNN_BACKEND_CUDA)?;
            net.set_preferable_target(dnn::DNN_TARGET_CUDA)?;
            info!("Running pose network on CUDA device {}", gpu);
        } else {
            warn!(
                "CUDA device {} unavailable ({} found), running pose network on CPU",
                gpu, devices
            );
            net.set_preferable_backend(dnn::DNN_BACKEND_OPENCV)?;
            net.set_preferable_target(dnn::DNN_TARGET_CPU)?;
        }

        Ok(())
    }
}

impl PoseEngine for CaffePoseEngine {
    type NetInput = NetInputArray;
    type OutputBuffer = OutputArray;

    fn initialize_on_thread(&mut self) -> Result<(), EngineError> {
        let (prototxt, weights) = self
            .config
            .pose_model
            .model_files(&self.config.model_folder);

        for path in &[&prototxt, &weights] {
            if !path.is_file() {
                return Err(EngineError::ModelNotFound(path.to_path_buf()));
            }
        }

        info!(
            "Loading {} pose model from {}",
            self.config.pose_model,
            prototxt.display()
        );

        let mut net =
            dnn::read_net_from_caffe(&prototxt.to_string_lossy(), &weights.to_string_lossy())?;
        self.select_device(&mut net)?;

        self.net = Some(net);

        Ok(())
    }

    fn format_input(&mut self, frame: &Mat) -> Result<NetInputArray, EngineError> {
        let bgr = format::bgra_to_bgr(frame)?;
        let base_size = self.config.net_input_size.size();

        let mut blobs = Vec::new();
        let mut net_size = base_size;
        let mut scale_frame_to_net = 1.;

        for scale in format::scale_factors(self.config.num_scales, self.config.scale_gap) {
            let scaled_size = format::scaled_net_size(base_size, scale);
            let (frame_to_net, padded) = resize_fixed_aspect(&bgr, scaled_size)?;

            if blobs.is_empty() {
                net_size = scaled_size;
                scale_frame_to_net = frame_to_net;
            }

            let relative = (frame_to_net / scale_frame_to_net) as f32;
            blobs.push((relative, format::to_net_blob(&padded)?));
        }

        Ok(NetInputArray {
            blobs,
            net_size,
            scale_frame_to_net,
        })
    }

    fn format_output(&mut self, frame: &Mat) -> Result<(f64, OutputArray), EngineError> {
        let bgr = format::bgra_to_bgr(frame)?;
        let (scale_input_to_output, padded) =
            resize_fixed_aspect(&bgr, self.config.output_size.size())?;

        let mut mat = Mat::default();
        padded.convert_to(&mut mat, CV_32F, 1., 0.)?;

        Ok((scale_input_to_output, OutputArray { mat }))
    }

    fn forward_pass(
        &mut self,
        input: &NetInputArray,
        frame_size: Size,
    ) -> Result<(), EngineError> {
        let net = self.net.as_mut().ok_or(EngineError::NotInitialized)?;
        let channels = self.config.pose_model.heatmap_channels();

        let mut stacks = Vec::with_capacity(input.blobs.len());
        for (scale, blob) in &input.blobs {
            net.set_input(blob, "", 1., core::Scalar::default())?;
            let output = net.forward_single("")?;
            stacks.push((*scale, Heatmaps::from_blob(&output, channels)?));
        }

        self.last_forward = Heatmaps::average(&stacks).map(|heatmaps| ForwardResult {
            frame_per_cell: frame_per_cell(input, &heatmaps),
            heatmaps,
        });

        debug!(
            "Forward pass over {} scale(s) for {}x{} frame",
            input.blobs.len(),
            frame_size.width,
            frame_size.height
        );

        Ok(())
    }

    fn pose_keypoints(&self) -> Result<KeypointSet, EngineError> {
        let forward = match &self.last_forward {
            Some(forward) => forward,
            None => return Ok(KeypointSet::default()),
        };

        let parts = self.config.pose_model.num_body_parts();
        let peaks = forward.heatmaps.peaks(parts, PART_THRESHOLD);

        if peaks.iter().all(Option::is_none) {
            return Ok(KeypointSet::default());
        }

        let (cell_x, cell_y) = forward.frame_per_cell;
        let person = peaks
            .into_iter()
            .map(|peak| match peak {
                Some(peak) => Keypoint {
                    x: peak.col as f32 * cell_x,
                    y: peak.row as f32 * cell_y,
                    score: peak.score,
                },
                None => Keypoint::default(),
            })
            .collect();

        Ok(KeypointSet::new(vec![person]))
    }

    fn render_pose(
        &mut self,
        output: &mut OutputArray,
        keypoints: &KeypointSet,
        scale_input_to_output: f64,
    ) -> Result<(), EngineError> {
        render::render_keypoints(
            &mut output.mat,
            self.config.pose_model,
            keypoints,
            scale_input_to_output,
            self.config.alpha_pose,
        )?;

        Ok(())
    }

    fn to_image(&self, output: &OutputArray) -> Result<Mat, EngineError> {
        let mut image = Mat::default();
        output.mat.convert_to(&mut image, CV_8U, 1., 0.)?;

        Ok(image)
    }
}
