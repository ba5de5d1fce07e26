use std::path::{Path, PathBuf};

use crate::error::{DatasetError, Result};

/// Environment variable naming the cache root for the Tsinghua datasets
pub const TSINGHUA_PATH_ENV: &str = "MNE_DATASETS_TSINGHUA_PATH";

/// Environment variable naming the shared MNE data root
pub const MNE_DATA_ENV: &str = "MNE_DATA";

/// Cache folder under the home directory when nothing else is configured
pub const DEFAULT_DATA_DIR: &str = "mne_data";

/// How dataset files are fetched and where they are cached.
///
/// The cache root is taken from `path`, then `MNE_DATASETS_TSINGHUA_PATH`,
/// then `MNE_DATA`, then `~/mne_data`.
///
/// ```rust
/// use tsinghua_ssvep::FetchOptions;
///
/// let options = FetchOptions::new()
///     .with_path("/data/eeg")
///     .with_proxy("http://proxy.local:3128")
///     .force_update(true);
/// assert!(options.force_update);
/// assert_eq!(options.cache_root().unwrap(), std::path::PathBuf::from("/data/eeg"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Cache root; archives land in `{path}/MNE-tsinghua-data/...`
    pub path: Option<PathBuf>,
    /// Download again even when the archive is already cached
    pub force_update: bool,
    /// HTTP(S) proxy URL used for downloads
    pub proxy: Option<String>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_proxy(mut self, proxy: &str) -> Self {
        self.proxy = Some(proxy.to_string());
        self
    }

    pub fn force_update(mut self, force: bool) -> Self {
        self.force_update = force;
        self
    }

    /// Resolves the cache root directory
    pub fn cache_root(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        for var in [TSINGHUA_PATH_ENV, MNE_DATA_ENV] {
            if let Some(value) = std::env::var_os(var).filter(|v| !v.is_empty()) {
                return Ok(PathBuf::from(value));
            }
        }
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_DATA_DIR))
            .ok_or(DatasetError::NoCacheDir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let options = FetchOptions::new().with_path("/tmp/cache");
        assert_eq!(options.cache_root().unwrap(), PathBuf::from("/tmp/cache"));
    }

    #[test]
    fn test_defaults() {
        let options = FetchOptions::default();
        assert!(!options.force_update);
        assert!(options.proxy.is_none());
        assert!(options.path.is_none());
    }
}
