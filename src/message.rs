use std::{fmt, str::FromStr};

use opencv::{
    core::{Mat, Scalar, CV_8UC1, CV_8UC3, CV_8UC4},
    imgproc,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The pixel layout every frame is decoded into before it reaches the engine.
pub const TARGET_ENCODING: Encoding = Encoding::Bgra8;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported image encoding '{encoding}'")]
    UnsupportedEncoding { encoding: String },
    #[error("'{encoding}' image has invalid geometry {width}x{height} with row step {step}")]
    Geometry {
        encoding: String,
        width: u32,
        height: u32,
        step: u32,
    },
    #[error("'{encoding}' image carries {actual} bytes, expected at least {expected}")]
    Truncated {
        encoding: String,
        expected: usize,
        actual: usize,
    },
    #[error("OpenCV failed while converting '{encoding}' image")]
    Conversion {
        encoding: String,
        #[source]
        source: opencv::Error,
    },
}

impl DecodeError {
    pub fn encoding(&self) -> &str {
        match self {
            DecodeError::UnsupportedEncoding { encoding }
            | DecodeError::Geometry { encoding, .. }
            | DecodeError::Truncated { encoding, .. }
            | DecodeError::Conversion { encoding, .. } => encoding,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Bgra8,
    Bgr8,
    Rgba8,
    Rgb8,
    Mono8,
}

impl Encoding {
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Bgra8 => "bgra8",
            Encoding::Bgr8 => "bgr8",
            Encoding::Rgba8 => "rgba8",
            Encoding::Rgb8 => "rgb8",
            Encoding::Mono8 => "mono8",
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            Encoding::Bgra8 | Encoding::Rgba8 => 4,
            Encoding::Bgr8 | Encoding::Rgb8 => 3,
            Encoding::Mono8 => 1,
        }
    }

    fn mat_type(&self) -> i32 {
        match self.channels() {
            4 => CV_8UC4,
            3 => CV_8UC3,
            _ => CV_8UC1,
        }
    }

    fn to_bgra_code(&self) -> Option<i32> {
        match self {
            Encoding::Bgra8 => None,
            Encoding::Bgr8 => Some(imgproc::COLOR_BGR2BGRA),
            Encoding::Rgba8 => Some(imgproc::COLOR_RGBA2BGRA),
            Encoding::Rgb8 => Some(imgproc::COLOR_RGB2BGRA),
            Encoding::Mono8 => Some(imgproc::COLOR_GRAY2BGRA),
        }
    }
}

impl FromStr for Encoding {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bgra8" => Ok(Encoding::Bgra8),
            "bgr8" => Ok(Encoding::Bgr8),
            "rgba8" => Ok(Encoding::Rgba8),
            "rgb8" => Ok(Encoding::Rgb8),
            "mono8" | "8uc1" => Ok(Encoding::Mono8),
            _ => Err(DecodeError::UnsupportedEncoding {
                encoding: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub seq: u32,
    /// Seconds since the Unix epoch.
    pub stamp: f64,
    pub frame_id: String,
}

/// An uncompressed camera frame as published on an image topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMessage {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: bool,
    /// Row length in bytes, including any padding.
    pub step: u32,
    pub data: Vec<u8>,
}

impl ImageMessage {
    pub fn from_mat(header: Header, mat: &Mat, encoding: Encoding) -> opencv::Result<Self> {
        let width = mat.cols() as u32;
        let height = mat.rows() as u32;
        let step = width * encoding.channels() as u32;

        // A fresh clone is always continuous, even when `mat` is a view.
        let data = mat.try_clone()?.data_bytes()?.to_vec();

        Ok(ImageMessage {
            header,
            height,
            width,
            encoding: encoding.name().to_string(),
            is_bigendian: false,
            step,
            data,
        })
    }

    /// Decodes the message into a `bgra8` matrix, stripping row padding.
    pub fn to_bgra8(&self) -> Result<Mat, DecodeError> {
        let encoding: Encoding = self.encoding.parse()?;

        let row_len = self.width as usize * encoding.channels();
        let step = self.step as usize;

        if self.width == 0 || self.height == 0 || step < row_len {
            return Err(DecodeError::Geometry {
                encoding: self.encoding.clone(),
                width: self.width,
                height: self.height,
                step: self.step,
            });
        }

        let expected = step * self.height as usize;
        if self.data.len() < expected {
            return Err(DecodeError::Truncated {
                encoding: self.encoding.clone(),
                expected,
                actual: self.data.len(),
            });
        }

        let conversion_error = |source| DecodeError::Conversion {
            encoding: self.encoding.clone(),
            source,
        };

        let mut packed = Mat::new_rows_cols_with_default(
            self.height as i32,
            self.width as i32,
            encoding.mat_type(),
            Scalar::all(0.),
        )
        .map_err(conversion_error)?;

        {
            let dst = packed.data_bytes_mut().map_err(conversion_error)?;
            for (dst_row, src_row) in dst
                .chunks_exact_mut(row_len)
                .zip(self.data.chunks(step))
            {
                dst_row.copy_from_slice(&src_row[..row_len]);
            }
        }

        match encoding.to_bgra_code() {
            None => Ok(packed),
            Some(code) => {
                let mut bgra = Mat::default();
                imgproc::cvt_color(&packed, &mut bgra, code, 0).map_err(conversion_error)?;
                Ok(bgra)
            }
        }
    }
}
