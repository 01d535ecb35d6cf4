// file: src/exporter/json.rs
// description: json export of a run summary and its failed archives

use crate::error::Result;
use crate::models::{BatchSummary, FileResult, FileStatus};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct JsonExporter {
    path: PathBuf,
    pretty: bool,
}

#[derive(Debug, Serialize)]
pub struct ArchiveIssue {
    pub archive: String,
    pub status: FileStatus,
    pub xml_count: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryExport {
    pub exported_at: String,
    pub run_id: String,
    pub summary: BatchSummary,
    /// Archives that did not fully succeed.
    pub issues: Vec<ArchiveIssue>,
}

impl SummaryExport {
    pub fn new(run_id: &str, summary: BatchSummary, results: &[FileResult]) -> Self {
        let issues = results
            .iter()
            .filter(|r| r.status != FileStatus::Success)
            .map(|r| ArchiveIssue {
                archive: r.source_archive.clone(),
                status: r.status,
                xml_count: r.xml_count,
                error_message: r.error_message.clone(),
            })
            .collect();

        Self {
            exported_at: Utc::now().to_rfc3339(),
            run_id: run_id.to_string(),
            summary,
            issues,
        }
    }
}

impl JsonExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pretty: true,
        }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn export(&self, export: &SummaryExport) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let body = if self.pretty {
            serde_json::to_string_pretty(export)?
        } else {
            serde_json::to_string(export)?
        };
        fs::write(&self.path, body)?;

        info!(
            "Summary exported to {} ({} issues)",
            self.path.display(),
            export.issues.len()
        );
        Ok(())
    }
}
