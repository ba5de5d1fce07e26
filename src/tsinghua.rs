//! The Tsinghua SSVEP benchmark datasets.
//!
//! `Wang2016` is the 40-target benchmark: 35 subjects, 6 blocks of 40 trials
//! of 6 s each (0.5 s cue, 5 s flicker, 0.5 s rest) at 250 Hz, with targets
//! coded by joint frequency and phase modulation from 8 to 15.8 Hz.
//!
//! `Beta` is the large-scale BETA database: 70 subjects, 4 blocks of 40
//! trials of 2 s (S1-S15) or 3 s (S16-S70) flicker plus 1 s of pre and post
//! stimulus data, same 40 targets on a QWERTY layout.
//!
//! Both store 64-channel trials in microvolts with the stimulus onset 0.5 s
//! into each trial.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::archive::extract_if_missing;
use crate::config::FetchOptions;
use crate::dataset::{Dataset, DatasetInfo, Event, Paradigm, Session, SubjectData};
use crate::download::{self, url_to_local_path};
use crate::epochs::{canonicalize, epochs_to_runs, AxisOrder, STIM_OFFSET};
use crate::error::{DatasetError, Result};
use crate::montage::Montage;
use crate::raw::{ChannelType, Info, Raw};
use crate::reader::loadmat;
use crate::types::{MatValue, NumericArray};

pub const WANG2016_URL: &str = "http://bci.med.tsinghua.edu.cn/upload/yijun/";
pub const BETA_URL: &str = "http://bci.med.tsinghua.edu.cn/upload/liubingchuan/";

/// Cache folder sign: files land under `MNE-tsinghua-data`
pub const TSINGHUA_SIGN: &str = "tsinghua";

pub const SESSION_NAME: &str = "session_0";
pub const STIM_CHANNEL: &str = "STI 014";
pub const SRATE: f64 = 250.0;
pub const N_CLASSES: usize = 40;
pub const N_EEG_CHANNELS: usize = 64;

/// Scalp electrodes of the 64-channel cap, without the mastoid and
/// cerebellar sites
pub const SCALP_CHANNELS: [&str; 60] = [
    "FP1", "FPZ", "FP2", "AF3", "AF4", "F7", "F5", "F3", "F1", "FZ", "F2", "F4", "F6", "F8",
    "FT7", "FC5", "FC3", "FC1", "FCZ", "FC2", "FC4", "FC6", "FT8", "T7", "C5", "C3", "C1", "CZ",
    "C2", "C4", "C6", "T8", "TP7", "CP5", "CP3", "CP1", "CPZ", "CP2", "CP4", "CP6", "TP8", "P7",
    "P5", "P3", "P1", "PZ", "P2", "P4", "P6", "P8", "PO7", "PO5", "PO3", "POZ", "PO4", "PO6",
    "PO8", "O1", "OZ", "O2",
];

/// Channel names and types in on-disk order, followed by the stim channel.
///
/// M1, M2 and CB1 sit between the scalp sites; CB2 is the last recorded
/// channel. The two cerebellar sites are typed `misc`.
pub fn channel_layout() -> (Vec<String>, Vec<ChannelType>) {
    let mut names: Vec<String> = SCALP_CHANNELS.iter().map(|c| c.to_string()).collect();
    names.insert(32, "M1".to_string());
    names.insert(42, "M2".to_string());
    names.insert(59, "CB1".to_string());
    names.push("CB2".to_string());
    names.push(STIM_CHANNEL.to_string());

    let mut types = vec![ChannelType::Eeg; names.len()];
    types[59] = ChannelType::Misc;
    types[63] = ChannelType::Misc;
    if let Some(last) = types.last_mut() {
        *last = ChannelType::Stim;
    }
    (names, types)
}

fn dataset_info(code: &str, n_subjects: u32, window: (f64, f64)) -> DatasetInfo {
    let events = (1..=N_CLASSES as i64)
        .map(|code| (code.to_string(), Event { code, window }))
        .collect();
    DatasetInfo {
        code: code.to_string(),
        subjects: (1..=n_subjects).collect(),
        events,
        channels: SCALP_CHANNELS.iter().map(|c| c.to_string()).collect(),
        srate: SRATE,
        paradigm: Paradigm::Ssvep,
    }
}

fn normalize_base_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// Checks that a trial tensor has 64 channels, 40 classes, at least one
/// block and room for the stimulus marker.
fn check_trials(field: &str, array: &NumericArray, order: AxisOrder) -> Result<()> {
    if array.is_complex() {
        return Err(DatasetError::InvalidFormat(format!(
            "'{}' is complex, expected real samples",
            field
        )));
    }

    let dims = array.dims();
    let valid = dims.len() == 4
        && dims[0] == N_EEG_CHANNELS
        && dims[1] > STIM_OFFSET
        && dims[order.class_axis()] == N_CLASSES
        && dims[order.block_axis()] > 0;
    if !valid {
        let expected = match order {
            AxisOrder::ChannelTimeClassBlock => "64 × time × 40 × blocks",
            AxisOrder::ChannelTimeBlockClass => "64 × time × blocks × 40",
        };
        return Err(DatasetError::ShapeMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            found: dims.to_vec(),
        });
    }
    Ok(())
}

fn expect_numeric(field: &str, value: MatValue) -> Result<NumericArray> {
    let kind = value.kind();
    value.into_numeric().ok_or_else(|| {
        DatasetError::InvalidFormat(format!("'{}' is a {} array, expected numeric", field, kind))
    })
}

/// Turns a checked trial tensor into `session_0` with one run per block
fn build_subject_data(array: NumericArray, order: AxisOrder) -> Result<SubjectData> {
    let epochs = canonicalize(array.real, order)?;
    let runs = epochs_to_runs(epochs)?;

    let (names, types) = channel_layout();
    let info = Info::new(names, types, SRATE)?;
    let montage = Montage::standard_1010();

    let mut session = Session::new();
    for (block, data) in runs.into_iter().enumerate() {
        let mut raw = Raw::new(data, info.clone())?;
        raw.set_montage(&montage);
        session.insert(format!("run_{}", block), raw);
    }
    debug!("Built {} runs", session.len());

    let mut subject_data = SubjectData::new();
    subject_data.insert(SESSION_NAME.to_string(), session);
    Ok(subject_data)
}

/// Resolves `target`, fetching and extracting `url` when it is not on disk
fn fetch_extracted(url: &str, target_name: &str, options: &FetchOptions) -> Result<PathBuf> {
    let root = options.cache_root()?;
    let archive = url_to_local_path(url, &root, TSINGHUA_SIGN)?;
    let dir = archive
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| DatasetError::InvalidFormat(format!("URL {} has no file name", url)))?;
    let target = dir.join(target_name);

    if target.exists() && !options.force_update {
        debug!("Using extracted {}", target.display());
        return Ok(target);
    }

    let archive = download::data_path(url, TSINGHUA_SIGN, options)?;
    if options.force_update && target.exists() {
        std::fs::remove_file(&target)?;
    }
    extract_if_missing(&archive, &target, &dir)?;
    Ok(target)
}

fn first_file(paths: Vec<Vec<PathBuf>>) -> Result<PathBuf> {
    paths
        .into_iter()
        .flatten()
        .next()
        .ok_or_else(|| DatasetError::FileNotFound("no file resolved".to_string()))
}

/// The Tsinghua 40-target SSVEP benchmark (Wang et al., 2016).
///
/// Each subject file `S{id}.mat` holds `data` with axes (electrode 64,
/// time 1500, target 40, block 6).
///
/// # Examples
///
/// ```rust
/// use tsinghua_ssvep::{Dataset, FetchOptions, Wang2016};
/// # let dir = tempfile::tempdir().unwrap();
/// # tsinghua_ssvep::doctest_utils::seed_wang2016(dir.path(), 1, 130)?;
///
/// let dataset = Wang2016::new().with_options(FetchOptions::new().with_path(dir.path()));
/// let subject = dataset.subject_data(1)?;
///
/// let runs = &subject["session_0"];
/// assert_eq!(runs.len(), 6);
/// assert_eq!(runs["run_0"].data().nrows(), 65);
/// assert_eq!(dataset.freqs()[1], 9.0);
/// # Ok::<(), tsinghua_ssvep::DatasetError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Wang2016 {
    info: DatasetInfo,
    base_url: String,
    options: FetchOptions,
    freqs: Vec<f64>,
    phases: Vec<f64>,
}

impl Wang2016 {
    pub fn new() -> Self {
        let freqs = (0..N_CLASSES)
            .map(|k| 8.0 + (k % 8) as f64 + 0.2 * (k / 8) as f64)
            .collect();
        let phases = (0..N_CLASSES)
            .map(|k| (0.5 * (5 * (k % 8) + k / 8) as f64) % 2.0)
            .collect();
        Wang2016 {
            info: dataset_info("wang2016", 35, (0.0, 5.0)),
            base_url: WANG2016_URL.to_string(),
            options: FetchOptions::default(),
            freqs,
            phases,
        }
    }

    /// Downloads from a mirror instead of the lab server
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = normalize_base_url(url);
        self
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// URL of the 7z archive of `subject`
    pub fn subject_url(&self, subject: u32) -> String {
        format!("{}S{}.mat.7z", self.base_url, subject)
    }
}

impl Default for Wang2016 {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataset for Wang2016 {
    fn info(&self) -> &DatasetInfo {
        &self.info
    }

    fn data_path(&self, subject: u32) -> Result<Vec<Vec<PathBuf>>> {
        self.validate_subject(subject)?;
        let url = self.subject_url(subject);
        let path = fetch_extracted(&url, &format!("S{}.mat", subject), &self.options)?;
        Ok(vec![vec![path]])
    }

    fn subject_data(&self, subject: u32) -> Result<SubjectData> {
        let path = first_file(self.data_path(subject)?)?;
        info!("Reading {}", path.display());

        let value = loadmat(&path)?
            .into_variable("data")
            .ok_or_else(|| DatasetError::MissingField("data".to_string()))?;
        let array = expect_numeric("data", value)?;
        check_trials("data", &array, AxisOrder::ChannelTimeClassBlock)?;

        build_subject_data(array, AxisOrder::ChannelTimeClassBlock)
    }

    fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    fn phases(&self) -> &[f64] {
        &self.phases
    }
}

/// The BETA large-scale SSVEP database (Liu et al., 2020).
///
/// Subjects are published ten to a zip archive. Each `S{id}.mat` holds a
/// struct `data` whose field `EEG` has axes (channel 64, time 750 or 1000,
/// block 4, condition 40).
///
/// ```rust
/// use tsinghua_ssvep::{Beta, Dataset};
///
/// let beta = Beta::new();
/// assert_eq!(beta.decade_archive(5), "S1-S10.mat.zip");
/// assert_eq!(beta.decade_archive(65), "S61-S70.mat.zip");
/// assert!(beta.data_path(71).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Beta {
    info: DatasetInfo,
    base_url: String,
    options: FetchOptions,
    freqs: Vec<f64>,
    phases: Vec<f64>,
}

impl Beta {
    pub fn new() -> Self {
        let freqs = (0..N_CLASSES)
            .map(|k| 8.0 + 0.2 * ((k + 3) % N_CLASSES) as f64)
            .collect();
        let phases = (0..N_CLASSES).map(|k| (0.5 * k as f64) % 2.0).collect();
        Beta {
            info: dataset_info("beta", 70, (0.0, 2.0)),
            base_url: BETA_URL.to_string(),
            options: FetchOptions::default(),
            freqs,
            phases,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = normalize_base_url(url);
        self
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Name of the archive holding `subject`: `S1-S10.mat.zip`,
    /// `S11-S20.mat.zip`, ...
    pub fn decade_archive(&self, subject: u32) -> String {
        let first = subject.saturating_sub(1) / 10 * 10 + 1;
        format!("S{}-S{}.mat.zip", first, first + 9)
    }

    pub fn subject_url(&self, subject: u32) -> String {
        format!("{}{}", self.base_url, self.decade_archive(subject))
    }
}

impl Default for Beta {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataset for Beta {
    fn info(&self) -> &DatasetInfo {
        &self.info
    }

    fn data_path(&self, subject: u32) -> Result<Vec<Vec<PathBuf>>> {
        self.validate_subject(subject)?;
        let url = self.subject_url(subject);
        let path = fetch_extracted(&url, &format!("S{}.mat", subject), &self.options)?;
        Ok(vec![vec![path]])
    }

    fn subject_data(&self, subject: u32) -> Result<SubjectData> {
        let path = first_file(self.data_path(subject)?)?;
        info!("Reading {}", path.display());

        let value = loadmat(&path)?
            .into_variable("data")
            .ok_or_else(|| DatasetError::MissingField("data".to_string()))?;
        let kind = value.kind();
        let data = value.into_struct().ok_or_else(|| {
            DatasetError::InvalidFormat(format!("'data' is a {} array, expected struct", kind))
        })?;
        let eeg = data
            .into_field("EEG")
            .ok_or_else(|| DatasetError::MissingField("data.EEG".to_string()))?;
        let array = expect_numeric("data.EEG", eeg)?;
        check_trials("data.EEG", &array, AxisOrder::ChannelTimeBlockClass)?;

        build_subject_data(array, AxisOrder::ChannelTimeBlockClass)
    }

    fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    fn phases(&self) -> &[f64] {
        &self.phases
    }
}
