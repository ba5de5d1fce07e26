//! Trial tensors to continuous runs.
//!
//! Both datasets store pre-cut trials as a 4-D array. The functions here bring
//! that array to (channel, time, class, block) order, convert it to volts,
//! append a stimulus channel marking each trial's onset with its class, and
//! cut one run per block with the block's trials concatenated in class order.

use ndarray::{concatenate, Array2, Array4, ArrayD, Axis, Ix4};

use crate::error::{DatasetError, Result};

/// Sample of the stimulus marker inside each trial (0.5 s at 250 Hz)
pub const STIM_OFFSET: usize = 125;

/// Scale from the stored microvolts to volts
pub const MICROVOLTS: f64 = 1e-6;

/// On-disk axis order of a trial tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrder {
    /// Wang2016 `data`: electrode, time, target, block
    ChannelTimeClassBlock,
    /// BETA `data.EEG`: channel, time, block, condition
    ChannelTimeBlockClass,
}

impl AxisOrder {
    fn permutation(self) -> [usize; 4] {
        match self {
            AxisOrder::ChannelTimeClassBlock => [0, 1, 2, 3],
            AxisOrder::ChannelTimeBlockClass => [0, 1, 3, 2],
        }
    }

    pub fn class_axis(self) -> usize {
        match self {
            AxisOrder::ChannelTimeClassBlock => 2,
            AxisOrder::ChannelTimeBlockClass => 3,
        }
    }

    pub fn block_axis(self) -> usize {
        match self {
            AxisOrder::ChannelTimeClassBlock => 3,
            AxisOrder::ChannelTimeBlockClass => 2,
        }
    }
}

/// Reorders a 4-D tensor to (channel, time, class, block)
pub fn canonicalize(data: ArrayD<f64>, order: AxisOrder) -> Result<Array4<f64>> {
    let data = data.into_dimensionality::<Ix4>()?;
    Ok(data.permuted_axes(order.permutation()))
}

/// A (1, time, class, block) array, zero except `[0, STIM_OFFSET, c, b] = c + 1`
pub fn stim_channel(n_times: usize, n_classes: usize, n_blocks: usize) -> Result<Array4<f64>> {
    if n_times <= STIM_OFFSET {
        return Err(DatasetError::ShapeMismatch {
            field: "time axis".to_string(),
            expected: format!("more than {} samples", STIM_OFFSET),
            found: vec![n_times],
        });
    }

    let mut stim = Array4::zeros((1, n_times, n_classes, n_blocks));
    for class in 0..n_classes {
        for block in 0..n_blocks {
            stim[[0, STIM_OFFSET, class, block]] = (class + 1) as f64;
        }
    }
    Ok(stim)
}

/// Appends the stimulus channel after the last data channel
pub fn append_stim(epochs: &Array4<f64>) -> Result<Array4<f64>> {
    let (_, n_times, n_classes, n_blocks) = epochs.dim();
    let stim = stim_channel(n_times, n_classes, n_blocks)?;
    Ok(concatenate(Axis(0), &[epochs.view(), stim.view()])?)
}

/// One (channel, class × time) array per block
pub fn split_runs(epochs: &Array4<f64>) -> Result<Vec<Array2<f64>>> {
    let (n_channels, n_times, n_classes, n_blocks) = epochs.dim();

    (0..n_blocks)
        .map(|block| {
            // (channel, time, class) -> (channel, class, time)，按行优先展开
            let view = epochs.index_axis(Axis(3), block).permuted_axes([0, 2, 1]);
            let values: Vec<f64> = view.iter().copied().collect();
            Ok(Array2::from_shape_vec((n_channels, n_classes * n_times), values)?)
        })
        .collect()
}

/// Scales canonical microvolt trials to volts, appends the stimulus channel
/// and splits the result into per-block runs.
pub fn epochs_to_runs(epochs: Array4<f64>) -> Result<Vec<Array2<f64>>> {
    let mut epochs = epochs;
    epochs.mapv_inplace(|v| v * MICROVOLTS);
    let with_stim = append_stim(&epochs)?;
    split_runs(&with_stim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_canonicalize_beta_order() {
        // (channel, time, block, class)
        let data = ArrayD::from_shape_fn(IxDyn(&[2, 3, 4, 5]), |d| {
            (d[0] * 1000 + d[1] * 100 + d[2] * 10 + d[3]) as f64
        });
        let canonical = canonicalize(data, AxisOrder::ChannelTimeBlockClass).unwrap();
        assert_eq!(canonical.dim(), (2, 3, 5, 4));
        assert_eq!(canonical[[1, 2, 4, 3]], 1234.0);
    }

    #[test]
    fn test_canonicalize_rejects_wrong_rank() {
        let data = ArrayD::zeros(IxDyn(&[2, 3, 4]));
        assert!(canonicalize(data, AxisOrder::ChannelTimeClassBlock).is_err());
    }

    #[test]
    fn test_stim_channel_markers() {
        let stim = stim_channel(200, 40, 6).unwrap();
        assert_eq!(stim.dim(), (1, 200, 40, 6));
        for class in 0..40 {
            for block in 0..6 {
                assert_eq!(stim[[0, STIM_OFFSET, class, block]], (class + 1) as f64);
            }
        }
        let nonzero = stim.iter().filter(|&&v| v != 0.0).count();
        assert_eq!(nonzero, 40 * 6);
    }

    #[test]
    fn test_stim_channel_needs_onset_sample() {
        assert!(stim_channel(STIM_OFFSET, 40, 6).is_err());
        assert!(stim_channel(STIM_OFFSET + 1, 40, 6).is_ok());
    }

    #[test]
    fn test_split_runs_concatenates_classes() {
        let epochs = Array4::from_shape_fn((2, 3, 4, 2), |(c, t, k, b)| {
            (c * 1000 + t * 100 + k * 10 + b) as f64
        });
        let runs = split_runs(&epochs).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].dim(), (2, 12));
        // 第二个 run，通道 1，类别 2，时间点 1
        assert_eq!(runs[1][[1, 2 * 3 + 1]], 1121.0);
        assert_eq!(runs[0][[0, 0]], 0.0);
    }

    #[test]
    fn test_epochs_to_runs_scales_once() {
        let epochs = Array4::from_elem((2, 130, 3, 2), 5.0);
        let runs = epochs_to_runs(epochs).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].dim(), (3, 3 * 130));

        assert!(runs[0].row(0).iter().all(|&v| (v - 5e-6).abs() < 1e-18));
        let stim = runs[1].row(2);
        for class in 0..3 {
            assert_eq!(stim[class * 130 + STIM_OFFSET], (class + 1) as f64);
        }
        assert_eq!(stim.iter().filter(|&&v| v != 0.0).count(), 3);
    }
}
