//! # Tsinghua SSVEP datasets for Rust
//!
//! Loaders for the two SSVEP benchmark databases published by the Tsinghua
//! BCI lab, the 40-target **Wang2016** benchmark and the **BETA** database.
//! Subject archives are downloaded into an MNE-style cache, extracted, read
//! with a pure Rust MAT v5 reader and reshaped into continuous runs with a
//! stimulus channel.
//!
//! ## Quick Start
//!
//! ### Loading a subject
//!
//! ```rust
//! use tsinghua_ssvep::{Dataset, FetchOptions, Wang2016, Result};
//!
//! fn main() -> Result<()> {
//!     # let dir = tempfile::tempdir().unwrap();
//!     # tsinghua_ssvep::doctest_utils::seed_wang2016(dir.path(), 3, 130)?;
//!     # let cache = dir.path();
//!     // Files are cached under {cache}/MNE-tsinghua-data/
//!     let dataset = Wang2016::new().with_options(FetchOptions::new().with_path(cache));
//!
//!     let subject = dataset.subject_data(3)?;
//!     for (session, runs) in &subject {
//!         for (name, raw) in runs {
//!             println!("{}/{}: {} channels, {:.1} s", session, name,
//!                 raw.info().n_channels(), raw.duration());
//!         }
//!     }
//!
//!     // One stimulus event per trial, coded by target
//!     let events = subject["session_0"]["run_0"].events();
//!     assert_eq!(events.len(), 40);
//!     assert_eq!(events[0].code, 1);
//!     Ok(())
//! }
//! ```
//!
//! ### Stimulus tables
//!
//! ```rust
//! use tsinghua_ssvep::{Beta, Dataset};
//!
//! let beta = Beta::new();
//! for (label, (freq, phase)) in beta.freqs().iter().zip(beta.phases()).enumerate().take(3) {
//!     println!("target {}: {:.1} Hz, {:.1}π", label + 1, freq, phase);
//! }
//! ```
//!
//! ### Reading MAT files directly
//!
//! ```rust
//! use tsinghua_ssvep::{loadmat, Result};
//!
//! fn main() -> Result<()> {
//!     # let dir = tempfile::tempdir().unwrap();
//!     # let path = dir.path().join("example.mat");
//!     # tsinghua_ssvep::doctest_utils::create_simple_mat_file(&path)?;
//!     let mat = loadmat(&path)?;
//!     for name in mat.names() {
//!         println!("{}: {}", name, mat.get(name).map_or("?", |v| v.kind()));
//!     }
//!
//!     let signal = mat.get("signal").and_then(|v| v.as_numeric()).unwrap();
//!     assert_eq!(signal.dims(), &[1, 250]);
//!     Ok(())
//! }
//! ```
//!
//! ## Cache location
//!
//! The cache root is `FetchOptions::path` when set, then the
//! `MNE_DATASETS_TSINGHUA_PATH` and `MNE_DATA` environment variables, then
//! `~/mne_data`. An existing MNE-Python cache is reused as is.
//!
//! ## Logging
//!
//! The crate logs through the `log` facade; install any logger (for example
//! `env_logger`) to see download and extraction progress.

pub mod archive;
pub mod config;
pub mod dataset;
pub mod download;
pub mod epochs;
pub mod error;
pub mod montage;
pub mod raw;
pub mod reader;
pub mod tsinghua;
pub mod types;
pub mod utils;
pub mod writer;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use config::FetchOptions;
pub use dataset::{Dataset, DatasetInfo, Event, Paradigm, Session, SubjectData};
pub use error::{DatasetError, Result};
pub use montage::Montage;
pub use raw::{ChannelType, Info, Raw, StimEvent};
pub use reader::{loadmat, MatReader};
pub use tsinghua::{Beta, Wang2016};
pub use types::{MatFile, MatValue, NumericArray, StructArray};
pub use writer::MatWriter;

/// Library version
///
/// ```rust
/// let version = tsinghua_ssvep::version();
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_descriptors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Wang2016>();
        assert_send_sync::<Beta>();
    }
}
