use std::fmt;

use log::debug;
use ndarray::{Array2, ArrayView1, Axis};

use crate::error::{DatasetError, Result};
use crate::montage::Montage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Eeg,
    Misc,
    Stim,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelType::Eeg => "eeg",
            ChannelType::Misc => "misc",
            ChannelType::Stim => "stim",
        };
        f.write_str(name)
    }
}

/// Channel metadata of a recording
#[derive(Debug, Clone, PartialEq)]
pub struct Info {
    pub ch_names: Vec<String>,
    pub ch_types: Vec<ChannelType>,
    pub sfreq: f64,
}

impl Info {
    pub fn new(ch_names: Vec<String>, ch_types: Vec<ChannelType>, sfreq: f64) -> Result<Self> {
        if ch_names.len() != ch_types.len() {
            return Err(DatasetError::InvalidFormat(format!(
                "{} channel names but {} channel types",
                ch_names.len(),
                ch_types.len()
            )));
        }
        if sfreq <= 0.0 {
            return Err(DatasetError::InvalidFormat(format!(
                "Sampling rate must be positive, got {}",
                sfreq
            )));
        }
        Ok(Info {
            ch_names,
            ch_types,
            sfreq,
        })
    }

    pub fn n_channels(&self) -> usize {
        self.ch_names.len()
    }

    /// Indices of channels of the given type
    pub fn picks(&self, ch_type: ChannelType) -> Vec<usize> {
        self.ch_types
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == ch_type)
            .map(|(i, _)| i)
            .collect()
    }
}

/// A stimulus event read back from a stim channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StimEvent {
    pub sample: usize,
    pub code: i64,
}

/// A continuous recording: channel × time data in volts plus metadata.
///
/// # Examples
///
/// ```rust
/// use ndarray::Array2;
/// use tsinghua_ssvep::{ChannelType, Info, Raw};
///
/// let info = Info::new(
///     vec!["OZ".to_string(), "STI 014".to_string()],
///     vec![ChannelType::Eeg, ChannelType::Stim],
///     250.0,
/// )?;
/// let mut data = Array2::zeros((2, 500));
/// data[[1, 125]] = 3.0;
///
/// let raw = Raw::new(data, info)?;
/// assert_eq!(raw.duration(), 2.0);
/// assert_eq!(raw.events()[0].code, 3);
/// # Ok::<(), tsinghua_ssvep::DatasetError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Raw {
    data: Array2<f64>,
    info: Info,
    montage: Option<String>,
    positions: Vec<Option<[f64; 3]>>,
}

impl Raw {
    pub fn new(data: Array2<f64>, info: Info) -> Result<Self> {
        if data.nrows() != info.n_channels() {
            return Err(DatasetError::ChannelCountMismatch {
                names: info.n_channels(),
                channels: data.nrows(),
            });
        }
        let positions = vec![None; info.n_channels()];
        Ok(Raw {
            data,
            info,
            montage: None,
            positions,
        })
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_data(self) -> Array2<f64> {
        self.data
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn ch_names(&self) -> &[String] {
        &self.info.ch_names
    }

    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.n_times() as f64 / self.info.sfreq
    }

    /// Row of the named channel
    pub fn channel(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let index = self.info.ch_names.iter().position(|n| n.eq_ignore_ascii_case(name))?;
        Some(self.data.index_axis(Axis(0), index))
    }

    /// Assigns positions from `montage`. Channels the montage does not know
    /// keep no position.
    pub fn set_montage(&mut self, montage: &Montage) {
        self.positions = self
            .info
            .ch_names
            .iter()
            .map(|name| montage.position(name))
            .collect();

        let missing: Vec<&str> = self
            .info
            .ch_names
            .iter()
            .zip(self.positions.iter())
            .filter(|(_, p)| p.is_none())
            .map(|(n, _)| n.as_str())
            .collect();
        if !missing.is_empty() {
            debug!("No position in {} for {:?}", montage.name(), missing);
        }
        self.montage = Some(montage.name().to_string());
    }

    /// Name of the montage last applied
    pub fn montage(&self) -> Option<&str> {
        self.montage.as_deref()
    }

    pub fn position(&self, index: usize) -> Option<[f64; 3]> {
        self.positions.get(index).copied().flatten()
    }

    /// Onsets of the first stim channel: samples where the value changes to
    /// a non-zero code.
    pub fn events(&self) -> Vec<StimEvent> {
        let stim = match self.info.picks(ChannelType::Stim).first() {
            Some(&index) => self.data.index_axis(Axis(0), index),
            None => return Vec::new(),
        };

        let mut events = Vec::new();
        let mut previous = 0.0;
        for (sample, &value) in stim.iter().enumerate() {
            if value != 0.0 && value != previous {
                events.push(StimEvent {
                    sample,
                    code: value.round() as i64,
                });
            }
            previous = value;
        }
        events
    }
}
