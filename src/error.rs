// file: src/error.rs
// description: Custom error types and result type aliases
// reference: https://docs.rs/thiserror

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Archive not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Archive {archive} is corrupt: {message}")]
    ArchiveCorrupt { archive: String, message: String },

    #[error("Upload of {object} failed: {message}")]
    Upload { object: String, message: String },

    #[error("Ledger write failed for {path}: {message}")]
    LedgerWrite { path: PathBuf, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PipelineError {
    pub fn corrupt(archive: impl Into<String>, message: impl ToString) -> Self {
        Self::ArchiveCorrupt {
            archive: archive.into(),
            message: message.to_string(),
        }
    }

    pub fn upload(object: impl Into<String>, message: impl ToString) -> Self {
        Self::Upload {
            object: object.into(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
