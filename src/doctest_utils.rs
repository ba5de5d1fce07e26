// Internal utilities for documentation tests
// Builds small synthetic MAT files and dataset caches so doctests run offline

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};

use crate::download::url_to_local_path;
use crate::tsinghua::{BETA_URL, N_CLASSES, N_EEG_CHANNELS, TSINGHUA_SIGN, WANG2016_URL};
use crate::types::{MatValue, StructArray};
use crate::{MatWriter, Result};

/// Sample value stored at (channel, time, class, block), in microvolts
pub fn synthetic_sample(channel: usize, time: usize, class: usize, block: usize) -> f64 {
    (channel * 100 + class) as f64 + block as f64 * 0.5 + time as f64 * 0.001
}

/// Creates a MAT file with a numeric matrix and a char array
pub fn create_simple_mat_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let mut writer = MatWriter::create(&path)?;

    // 10 Hz sine at 250 Hz, one second
    let samples = ArrayD::from_shape_fn(IxDyn(&[1, 250]), |d| {
        let t = d[1] as f64 / 250.0;
        (2.0 * std::f64::consts::PI * 10.0 * t).sin()
    });
    writer.write_array("signal", &samples)?;
    writer.write_variable(
        "label",
        &MatValue::Char {
            dims: vec![1, 2],
            text: "Oz".to_string(),
        },
    )?;
    writer.finalize()?;
    Ok(())
}

fn trials(dims: [usize; 4], class_axis: usize, block_axis: usize) -> ArrayD<f64> {
    ArrayD::from_shape_fn(IxDyn(&dims), |d| {
        synthetic_sample(d[0], d[1], d[class_axis], d[block_axis])
    })
}

fn seed_dir(url: &str, root: &Path) -> Result<PathBuf> {
    let archive = url_to_local_path(url, root, TSINGHUA_SIGN)?;
    let dir = archive.parent().map(Path::to_path_buf).unwrap_or_default();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Writes an extracted Wang2016 `S{subject}.mat` with 6 blocks of
/// `n_times` samples into the cache under `root`
pub fn seed_wang2016(root: &Path, subject: u32, n_times: usize) -> Result<PathBuf> {
    let url = format!("{}S{}.mat.7z", WANG2016_URL, subject);
    let path = seed_dir(&url, root)?.join(format!("S{}.mat", subject));

    let data = trials([N_EEG_CHANNELS, n_times, N_CLASSES, 6], 2, 3);
    let mut writer = MatWriter::create(&path)?;
    writer.set_compression(true);
    writer.write_array("data", &data)?;
    writer.finalize()?;
    Ok(path)
}

/// Writes a BETA subject file to `path`: struct `data` holding `EEG` with 4
/// blocks of `n_times` samples and a `suppl_info` placeholder
pub fn write_beta_mat(path: &Path, n_times: usize) -> Result<()> {
    let eeg = trials([N_EEG_CHANNELS, n_times, 4, N_CLASSES], 3, 2);
    let suppl = MatValue::Char {
        dims: vec![1, 4],
        text: "none".to_string(),
    };
    let data = StructArray {
        dims: vec![1, 1],
        field_names: vec!["EEG".to_string(), "suppl_info".to_string()],
        elements: vec![vec![MatValue::Numeric(eeg.into()), suppl]],
    };

    let mut writer = MatWriter::create(path)?;
    writer.set_compression(true);
    writer.write_variable("data", &MatValue::Struct(data))?;
    writer.finalize()?;
    Ok(())
}

/// Writes an extracted BETA `S{subject}.mat` into the cache under `root`
pub fn seed_beta(root: &Path, subject: u32, n_times: usize) -> Result<PathBuf> {
    let first = subject.saturating_sub(1) / 10 * 10 + 1;
    let url = format!("{}S{}-S{}.mat.zip", BETA_URL, first, first + 9);
    let path = seed_dir(&url, root)?.join(format!("S{}.mat", subject));
    write_beta_mat(&path, n_times)?;
    Ok(path)
}
