use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use log::info;

use crate::error::{DatasetError, Result};
use crate::raw::Raw;

/// Runs of one session keyed `run_0`, `run_1`, ...
pub type Session = BTreeMap<String, Raw>;

/// Sessions of one subject keyed `session_0`, ...
pub type SubjectData = BTreeMap<String, Session>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paradigm {
    Ssvep,
}

impl fmt::Display for Paradigm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Paradigm::Ssvep => f.write_str("ssvep"),
        }
    }
}

/// An event class: its numeric code and the trial window in seconds
/// relative to stimulus onset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub code: i64,
    pub window: (f64, f64),
}

/// Static description of a dataset
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    pub code: String,
    pub subjects: Vec<u32>,
    pub events: BTreeMap<String, Event>,
    pub channels: Vec<String>,
    pub srate: f64,
    pub paradigm: Paradigm,
}

impl DatasetInfo {
    pub fn has_subject(&self, subject: u32) -> bool {
        self.subjects.contains(&subject)
    }

    /// Event labels ordered by code
    pub fn event_labels(&self) -> Vec<&str> {
        let mut labels: Vec<(&str, i64)> =
            self.events.iter().map(|(label, event)| (label.as_str(), event.code)).collect();
        labels.sort_by_key(|&(_, code)| code);
        labels.into_iter().map(|(label, _)| label).collect()
    }
}

/// Capabilities shared by the dataset descriptors.
///
/// Implementors supply path resolution, subject loading and the stimulus
/// tables; subject validation and multi-subject loading are provided.
pub trait Dataset {
    fn info(&self) -> &DatasetInfo;

    /// Local files of `subject` as sessions × runs, fetched and extracted on
    /// demand
    fn data_path(&self, subject: u32) -> Result<Vec<Vec<PathBuf>>>;

    /// Labeled recordings of `subject`
    fn subject_data(&self, subject: u32) -> Result<SubjectData>;

    /// Stimulus frequency of each class in Hz
    fn freqs(&self) -> &[f64];

    /// Initial stimulus phase of each class in units of π
    fn phases(&self) -> &[f64];

    fn validate_subject(&self, subject: u32) -> Result<()> {
        if self.info().has_subject(subject) {
            Ok(())
        } else {
            Err(DatasetError::InvalidSubject {
                dataset: self.info().code.clone(),
                subject,
            })
        }
    }

    /// Loads `subjects` one after another. Every id is checked before the
    /// first load starts.
    fn get_data(&self, subjects: &[u32]) -> Result<BTreeMap<u32, SubjectData>> {
        for &subject in subjects {
            self.validate_subject(subject)?;
        }

        let mut data = BTreeMap::new();
        for &subject in subjects {
            info!("Loading {} subject {}", self.info().code, subject);
            data.insert(subject, self.subject_data(subject)?);
        }
        Ok(data)
    }
}
