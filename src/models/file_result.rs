// file: src/models/file_result.rs
// description: per-archive processing outcome and the fold that derives it
// reference: internal data structures

use crate::storage::UploadOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    Success,
    PartialSuccess,
    Failure,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Success => "SUCCESS",
            FileStatus::PartialSuccess => "PARTIAL_SUCCESS",
            FileStatus::Failure => "FAILURE",
        }
    }

    /// True when at least one object from the archive reached the store.
    pub fn delivered(&self) -> bool {
        !matches!(self, FileStatus::Failure)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(FileStatus::Success),
            "PARTIAL_SUCCESS" => Ok(FileStatus::PartialSuccess),
            "FAILURE" => Ok(FileStatus::Failure),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Outcome of processing one archive. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FileResult {
    pub source_archive: String,
    pub status: FileStatus,
    pub xml_count: usize,
    pub uploaded_object_names: Vec<String>,
    pub bytes_uploaded: u64,
    pub elapsed: Duration,
    pub error_message: Option<String>,
}

impl FileResult {
    pub fn failure(source_archive: impl Into<String>, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            source_archive: source_archive.into(),
            status: FileStatus::Failure,
            xml_count: 0,
            uploaded_object_names: Vec::new(),
            bytes_uploaded: 0,
            elapsed,
            error_message: Some(message.into()),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Sequential fold over the upload outcomes of a single archive.
#[derive(Debug)]
pub struct UploadTally {
    source_archive: String,
    uploaded: Vec<String>,
    bytes_uploaded: u64,
    failures: Vec<String>,
}

impl UploadTally {
    pub fn new(source_archive: impl Into<String>) -> Self {
        Self {
            source_archive: source_archive.into(),
            uploaded: Vec::new(),
            bytes_uploaded: 0,
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, member_name: &str, outcome: &UploadOutcome) {
        if outcome.success {
            self.uploaded.push(outcome.object_name.clone());
            self.bytes_uploaded += outcome.size_bytes;
        } else {
            let reason = outcome.error_message.as_deref().unwrap_or("unknown error");
            self.failures.push(format!("{}: {}", member_name, reason));
        }
    }

    pub fn attempted(&self) -> usize {
        self.uploaded.len() + self.failures.len()
    }

    pub fn finish(self, elapsed: Duration) -> FileResult {
        let attempted = self.attempted();
        let failed = self.failures.len();

        if self.uploaded.is_empty() {
            let message = if attempted == 0 {
                format!("No payload members found in {}", self.source_archive)
            } else {
                format!(
                    "All {} uploads failed: {}",
                    attempted,
                    self.failures.join("; ")
                )
            };
            return FileResult::failure(self.source_archive, message, elapsed);
        }

        let (status, error_message) = if failed > 0 {
            (
                FileStatus::PartialSuccess,
                Some(format!(
                    "{} of {} uploads failed: {}",
                    failed,
                    attempted,
                    self.failures.join("; ")
                )),
            )
        } else {
            (FileStatus::Success, None)
        };

        FileResult {
            source_archive: self.source_archive,
            status,
            xml_count: self.uploaded.len(),
            uploaded_object_names: self.uploaded,
            bytes_uploaded: self.bytes_uploaded,
            elapsed,
            error_message,
        }
    }
}
