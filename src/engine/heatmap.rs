use ndarray::{s, Array3, ArrayView4, Axis};
use opencv::{core::Mat, prelude::*};

use super::EngineError;

/// Per-part confidence maps produced by one forward pass, shaped `(part, row, col)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Heatmaps {
    maps: Array3<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Peak {
    pub col: usize,
    pub row: usize,
    pub score: f32,
}

impl Heatmaps {
    #[cfg(test)]
    pub fn new(maps: Array3<f32>) -> Self {
        Heatmaps { maps }
    }

    /// Reads the first `channels` maps out of a `[1, C, H, W]` network output blob.
    pub fn from_blob(blob: &Mat, channels: usize) -> Result<Self, EngineError> {
        let dims = blob.mat_size().iter().map(|&d| d as usize).collect::<Vec<_>>();

        if dims.len() != 4 || dims[1] < channels {
            return Err(EngineError::OutputShape(dims));
        }

        let data = blob.data_typed::<f32>()?;
        let view = ArrayView4::from_shape((dims[0], dims[1], dims[2], dims[3]), data)?;

        Ok(Heatmaps {
            maps: view.slice(s![0, ..channels, .., ..]).to_owned(),
        })
    }

    pub fn rows(&self) -> usize {
        self.maps.len_of(Axis(1))
    }

    pub fn cols(&self) -> usize {
        self.maps.len_of(Axis(2))
    }

    /// Averages heatmaps computed at several input scales onto the grid of the first one.
    ///
    /// Each entry pairs a stack with its scale relative to the first stack, so cell `(r, c)` of
    /// the result samples cell `(r * scale, c * scale)` of that stack.
    pub fn average(stacks: &[(f32, Heatmaps)]) -> Option<Heatmaps> {
        let ((_, base), rest) = stacks.split_first()?;
        let mut sum = base.maps.clone();

        for (scale, stack) in rest {
            let (rows, cols) = (stack.rows(), stack.cols());

            for ((part, row, col), value) in sum.indexed_iter_mut() {
                let src_row = ((row as f32 * scale).round() as usize).min(rows - 1);
                let src_col = ((col as f32 * scale).round() as usize).min(cols - 1);

                *value += stack.maps[[part, src_row, src_col]];
            }
        }

        sum /= stacks.len() as f32;

        Some(Heatmaps { maps: sum })
    }

    /// Maximum of each of the first `parts` maps, or `None` where it is below `threshold`.
    pub fn peaks(&self, parts: usize, threshold: f32) -> Vec<Option<Peak>> {
        self.maps
            .axis_iter(Axis(0))
            .take(parts)
            .map(|map| {
                map.indexed_iter()
                    .fold(None, |best: Option<Peak>, ((row, col), &score)| match best {
                        Some(peak) if peak.score >= score => Some(peak),
                        _ => Some(Peak { col, row, score }),
                    })
                    .filter(|peak| peak.score >= threshold)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_peak(shape: (usize, usize, usize), at: [usize; 3], value: f32) -> Heatmaps {
        let mut maps = Array3::zeros(shape);
        maps[at] = value;
        Heatmaps::new(maps)
    }

    #[test]
    fn test_peaks_respect_threshold() {
        let mut maps = Array3::zeros((3, 4, 5));
        maps[[0, 2, 3]] = 0.9;
        maps[[0, 1, 1]] = 0.5;
        maps[[1, 0, 4]] = 0.05;
        maps[[2, 3, 0]] = 0.7;

        let peaks = Heatmaps::new(maps).peaks(2, 0.1);

        assert_eq!(peaks.len(), 2);
        assert_eq!(
            peaks[0],
            Some(Peak {
                col: 3,
                row: 2,
                score: 0.9
            })
        );
        assert_eq!(peaks[1], None);
    }

    #[test]
    fn test_average_of_single_stack_is_identity() {
        let stack = single_peak((2, 3, 3), [1, 1, 2], 0.8);
        let averaged = Heatmaps::average(&[(1., stack.clone())]).unwrap();

        assert_eq!(averaged, stack);
        assert!(Heatmaps::average(&[]).is_none());
    }

    #[test]
    fn test_average_resamples_smaller_scales() {
        let base = single_peak((1, 4, 4), [0, 2, 2], 1.0);
        let half = single_peak((1, 2, 2), [0, 1, 1], 0.5);

        let averaged = Heatmaps::average(&[(1., base), (0.5, half)]).unwrap();

        assert_eq!((averaged.rows(), averaged.cols()), (4, 4));
        assert!((averaged.maps[[0, 2, 2]] - 0.75).abs() < 1e-6);
        assert!((averaged.maps[[0, 3, 3]] - 0.25).abs() < 1e-6);
        assert_eq!(averaged.maps[[0, 0, 0]], 0.);
    }
}
