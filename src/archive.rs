use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use log::{debug, info, warn};

use crate::error::{DatasetError, Result};

/// Archive formats the datasets are published in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    SevenZip,
    Zip,
}

impl ArchiveKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "7z" => Some(ArchiveKind::SevenZip),
            "zip" => Some(ArchiveKind::Zip),
            _ => None,
        }
    }
}

/// Extracts every entry of `archive` into `dest_dir`
pub fn extract(archive: &Path, dest_dir: &Path) -> Result<()> {
    let kind = ArchiveKind::from_path(archive).ok_or_else(|| {
        DatasetError::InvalidFormat(format!("Unknown archive type: {}", archive.display()))
    })?;

    info!("Extracting {} into {}", archive.display(), dest_dir.display());
    match kind {
        ArchiveKind::SevenZip => sevenz_rust::decompress_file(archive, dest_dir).map_err(|e| {
            DatasetError::SevenZip {
                path: archive.to_path_buf(),
                message: e.to_string(),
            }
        }),
        ArchiveKind::Zip => extract_zip(archive, dest_dir),
    }
}

/// Unpacks every entry, replacing files left by an earlier extraction
fn extract_zip(archive: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let relative = match entry.enclosed_name() {
            Some(path) => path,
            None => {
                warn!("Skipping unsafe entry {} in {}", entry.name(), archive.display());
                continue;
            }
        };
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        debug!("Extracted {}", out_path.display());
    }
    Ok(())
}

/// Extracts `archive` into `dest_dir` unless `target` already exists.
///
/// Returns `true` when an extraction happened. No lock is taken: concurrent
/// callers sharing a cache directory may both extract.
pub fn extract_if_missing(archive: &Path, target: &Path, dest_dir: &Path) -> Result<bool> {
    if target.exists() {
        debug!("{} already extracted", target.display());
        return Ok(false);
    }
    extract(archive, dest_dir)?;
    if !target.exists() {
        return Err(DatasetError::FileNotFound(format!(
            "{} not found in {}",
            target.display(),
            archive.display()
        )));
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_archive_kind() {
        assert_eq!(ArchiveKind::from_path(Path::new("S1.mat.7z")), Some(ArchiveKind::SevenZip));
        assert_eq!(ArchiveKind::from_path(Path::new("S1-S10.mat.ZIP")), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_path(Path::new("S1.mat")), None);
    }

    #[test]
    fn test_zip_extract_if_missing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("S1-S10.mat.zip");
        {
            let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("S1.mat", options).unwrap();
            writer.write_all(b"first").unwrap();
            writer.start_file("S2.mat", options).unwrap();
            writer.write_all(b"second").unwrap();
            writer.finish().unwrap();
        }

        let target = dir.path().join("S2.mat");
        assert!(extract_if_missing(&archive, &target, dir.path()).unwrap());
        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        assert!(dir.path().join("S1.mat").exists());

        // 已解压时不再解压
        assert!(!extract_if_missing(&archive, &target, dir.path()).unwrap());
    }

    #[test]
    fn test_missing_target_after_extract() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("S1-S10.mat.zip");
        {
            let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
            writer.start_file("S1.mat", zip::write::SimpleFileOptions::default()).unwrap();
            writer.write_all(b"only").unwrap();
            writer.finish().unwrap();
        }
        let result = extract_if_missing(&archive, &dir.path().join("S9.mat"), dir.path());
        assert!(matches!(result, Err(DatasetError::FileNotFound(_))));
    }

    #[test]
    fn test_corrupt_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"not a zip").unwrap();
        assert!(matches!(extract(&archive, dir.path()), Err(DatasetError::Zip(_))));
    }
}
