use std::{
    env,
    fmt,
    fs::File,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use opencv::core::Size;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_LOGGING_LEVEL: i32 = 3;
const DEFAULT_MODEL_POSE: &str = "COCO";
const DEFAULT_MODEL_FOLDER: &str = "~/catkin_ws/src/deep_skeleton_tracking/models/";
const DEFAULT_NET_RESOLUTION: &str = "656x368";
const DEFAULT_RESOLUTION: &str = "1280x720";
const DEFAULT_NUM_GPU_START: i32 = 0;
const DEFAULT_SCALE_GAP: f64 = 0.3;
const DEFAULT_NUM_SCALES: i32 = 1;
const DEFAULT_ALPHA_POSE: f64 = 0.6;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("wrong logging_level value ({0}), expected a value in [0, 255]")]
    LoggingLevel(i32),
    #[error("resolution format ({0}) invalid, should be e.g., 960x540")]
    Resolution(String),
    #[error("net resolution format ({0}) invalid, should be e.g., 656x368 (multiples of 16)")]
    NetResolution(String),
    #[error("string ({0}) does not correspond to any model (COCO, MPI, MPI_4_layers)")]
    PoseModel(String),
    #[error("alpha value for blending ({0}) must be in the range [0,1]")]
    AlphaPose(f64),
    #[error("number of scales ({0}) must be at least 1")]
    NumScales(i32),
    #[error("incompatible flag configuration: scale_gap ({scale_gap}) must be greater than 0 or num_scales = 1 (got {num_scales})")]
    ScaleGap { scale_gap: f64, num_scales: i32 },
    #[error("GPU start index ({0}) must not be negative")]
    GpuStart(i32),
}

/// A `WIDTHxHEIGHT` pixel size with both sides strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: i32,
    pub height: i32,
}

impl Resolution {
    pub fn new(width: i32, height: i32) -> Self {
        Resolution { width, height }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Resolution(s.to_string());

        let (width, height) = s.trim().split_once('x').ok_or_else(invalid)?;
        let width: i32 = width.parse().map_err(|_| invalid())?;
        let height: i32 = height.parse().map_err(|_| invalid())?;

        if width <= 0 || height <= 0 {
            return Err(invalid());
        }

        Ok(Resolution { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoseModel {
    Coco18,
    Mpi15,
    /// MPI, 15 body parts, faster 4-stage network.
    Mpi15Four,
}

impl PoseModel {
    pub fn name(&self) -> &'static str {
        match self {
            PoseModel::Coco18 => "COCO",
            PoseModel::Mpi15 => "MPI",
            PoseModel::Mpi15Four => "MPI_4_layers",
        }
    }
}

impl FromStr for PoseModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COCO" => Ok(PoseModel::Coco18),
            "MPI" => Ok(PoseModel::Mpi15),
            "MPI_4_layers" => Ok(PoseModel::Mpi15Four),
            _ => Err(ConfigError::PoseModel(s.to_string())),
        }
    }
}

impl fmt::Display for PoseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw startup options, as given on the command line or in a JSON file.
#[derive(Debug, Clone, PartialEq, Parser, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// The logging level. Integer in the range [0, 255]. 0 will output every message, while 255
    /// will not output any
    #[clap(long, default_value_t = DEFAULT_LOGGING_LEVEL, allow_hyphen_values = true)]
    pub logging_level: i32,

    /// Model to be used (e.g. COCO, MPI, MPI_4_layers)
    #[clap(long, default_value = DEFAULT_MODEL_POSE)]
    pub model_pose: String,

    /// Folder where the pose models (COCO and MPI) are located
    #[clap(long, default_value = DEFAULT_MODEL_FOLDER)]
    pub model_folder: String,

    /// Network input resolution. Multiples of 16
    #[clap(long, default_value = DEFAULT_NET_RESOLUTION)]
    pub net_resolution: String,

    /// The image resolution (display)
    #[clap(long, default_value = DEFAULT_RESOLUTION)]
    pub resolution: String,

    /// GPU device start number
    #[clap(long, default_value_t = DEFAULT_NUM_GPU_START, allow_hyphen_values = true)]
    pub num_gpu_start: i32,

    /// Scale gap between scales. No effect unless num_scales > 1. Initial scale is always 1
    #[clap(long, default_value_t = DEFAULT_SCALE_GAP, allow_hyphen_values = true)]
    pub scale_gap: f64,

    /// Number of scales to average
    #[clap(long, default_value_t = DEFAULT_NUM_SCALES, allow_hyphen_values = true)]
    pub num_scales: i32,

    /// Blending factor (range 0-1) for the body part rendering. 1 will show it completely, 0 will
    /// hide it
    #[clap(long, default_value_t = DEFAULT_ALPHA_POSE, allow_hyphen_values = true)]
    pub alpha_pose: f64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            logging_level: DEFAULT_LOGGING_LEVEL,
            model_pose: DEFAULT_MODEL_POSE.to_string(),
            model_folder: DEFAULT_MODEL_FOLDER.to_string(),
            net_resolution: DEFAULT_NET_RESOLUTION.to_string(),
            resolution: DEFAULT_RESOLUTION.to_string(),
            num_gpu_start: DEFAULT_NUM_GPU_START,
            scale_gap: DEFAULT_SCALE_GAP,
            num_scales: DEFAULT_NUM_SCALES,
            alpha_pose: DEFAULT_ALPHA_POSE,
        }
    }
}

impl Options {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open options file {}", path.display()))?;

        serde_json::from_reader(file)
            .with_context(|| format!("Failed to parse options file {}", path.display()))
    }

    pub fn resolve(&self) -> Result<Config, ConfigError> {
        if !(0..=255).contains(&self.logging_level) {
            return Err(ConfigError::LoggingLevel(self.logging_level));
        }

        let output_size: Resolution = self.resolution.parse()?;
        let net_input_size: Resolution = self
            .net_resolution
            .parse()
            .map_err(|_| ConfigError::NetResolution(self.net_resolution.clone()))?;
        let net_output_size = net_input_size;

        let pose_model: PoseModel = self.model_pose.parse()?;

        // Written so that NaN is rejected as well.
        if !(self.alpha_pose >= 0. && self.alpha_pose <= 1.) {
            return Err(ConfigError::AlphaPose(self.alpha_pose));
        }

        if self.num_scales < 1 {
            return Err(ConfigError::NumScales(self.num_scales));
        }

        if self.num_scales > 1 && !(self.scale_gap > 0.) {
            return Err(ConfigError::ScaleGap {
                scale_gap: self.scale_gap,
                num_scales: self.num_scales,
            });
        }

        if self.num_gpu_start < 0 {
            return Err(ConfigError::GpuStart(self.num_gpu_start));
        }

        Ok(Config {
            log_level: log_level_filter(self.logging_level),
            output_size,
            net_input_size,
            net_output_size,
            pose_model,
            model_folder: expand_home(&self.model_folder),
            num_gpu_start: self.num_gpu_start,
            num_scales: self.num_scales as u32,
            scale_gap: self.scale_gap as f32,
            alpha_pose: self.alpha_pose as f32,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: LevelFilter,
    pub output_size: Resolution,
    pub net_input_size: Resolution,
    pub net_output_size: Resolution,
    pub pose_model: PoseModel,
    pub model_folder: PathBuf,
    pub num_gpu_start: i32,
    pub num_scales: u32,
    pub scale_gap: f32,
    pub alpha_pose: f32,
}

impl Config {
    /// Installs the process logger, using `log_level` unless `RUST_LOG` is set.
    pub fn init_logger(&self) {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(self.log_level.to_string()),
        )
        .init();
    }
}

/// Maps a 0-255 priority threshold onto a level filter. Lower thresholds let more through.
pub fn log_level_filter(logging_level: i32) -> LevelFilter {
    match logging_level {
        i32::MIN..=0 => LevelFilter::Trace,
        1 => LevelFilter::Debug,
        2 => LevelFilter::Info,
        3 => LevelFilter::Warn,
        4 => LevelFilter::Error,
        _ => LevelFilter::Off,
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
