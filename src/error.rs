use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Invalid subject id {subject} for dataset {dataset}")]
    InvalidSubject { dataset: String, subject: u32 },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP request to {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("7z archive {} could not be extracted: {message}", path.display())]
    SevenZip { path: PathBuf, message: String },

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported MAT file: {0}")]
    UnsupportedMatFile(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Field {field} has shape {found:?}, expected {expected}")]
    ShapeMismatch {
        field: String,
        expected: String,
        found: Vec<usize>,
    },

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Channel layout has {names} names but the data has {channels} channels")]
    ChannelCountMismatch { names: usize, channels: usize },

    #[error("Cache directory could not be determined")]
    NoCacheDir,
}

pub type Result<T> = std::result::Result<T, DatasetError>;
