//! Download and cache layer.
//!
//! Remote files are mirrored under `{root}/MNE-{sign}-data/{url path}`, the
//! layout MNE-Python uses, so an existing `~/mne_data` cache is reused.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use reqwest::Url;

use crate::config::FetchOptions;
use crate::error::{DatasetError, Result};

const USER_AGENT: &str = concat!("tsinghua-ssvep/", env!("CARGO_PKG_VERSION"));

/// Maps a URL to its location inside the cache folder of `sign`
pub fn url_to_local_path(url: &str, root: &Path, sign: &str) -> Result<PathBuf> {
    let parsed = Url::parse(url)
        .map_err(|e| DatasetError::InvalidFormat(format!("Invalid URL {}: {}", url, e)))?;

    let mut dest = root.join(format!("MNE-{}-data", sign));
    let segments = parsed
        .path_segments()
        .ok_or_else(|| DatasetError::InvalidFormat(format!("URL {} has no path", url)))?;
    for segment in segments.filter(|s| !s.is_empty()) {
        if segment == ".." {
            return Err(DatasetError::InvalidFormat(format!("URL {} escapes the cache", url)));
        }
        dest.push(segment);
    }
    Ok(dest)
}

/// Returns the cached copy of `url`, downloading it first when missing or
/// when `force_update` is set.
pub fn data_path(url: &str, sign: &str, options: &FetchOptions) -> Result<PathBuf> {
    let root = options.cache_root()?;
    let dest = url_to_local_path(url, &root, sign)?;

    if dest.exists() && !options.force_update {
        debug!("Using cached {}", dest.display());
        return Ok(dest);
    }

    download(url, &dest, options)?;
    Ok(dest)
}

/// Streams `url` into `dest` through a `.part` file renamed on success
pub fn download(url: &str, dest: &Path, options: &FetchOptions) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut builder = reqwest::blocking::Client::builder().user_agent(USER_AGENT);
    if let Some(proxy) = &options.proxy {
        let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|source| DatasetError::Http {
            url: proxy.clone(),
            source,
        })?;
        builder = builder.proxy(proxy);
    }
    let client = builder.build().map_err(|source| DatasetError::Http {
        url: url.to_string(),
        source,
    })?;

    info!("Downloading {} to {}", url, dest.display());
    let mut response = client.get(url).send().map_err(|source| DatasetError::Http {
        url: url.to_string(),
        source,
    })?;
    if !response.status().is_success() {
        return Err(DatasetError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let partial = partial_path(dest);
    let written = {
        let mut file = BufWriter::new(File::create(&partial)?);
        let written = response.copy_to(&mut file).map_err(|source| DatasetError::Http {
            url: url.to_string(),
            source,
        });
        file.flush()?;
        written
    };
    let bytes = match written {
        Ok(bytes) => bytes,
        Err(e) => {
            fs::remove_file(&partial).ok();
            return Err(e);
        }
    };

    fs::rename(&partial, dest)?;
    debug!("Downloaded {} bytes from {}", bytes, url);
    Ok(())
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
