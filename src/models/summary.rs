// file: src/models/summary.rs
// description: aggregate statistics over a sequence of file results
// reference: derived from per-archive results, recomputed on demand

use crate::models::{FileResult, FileStatus};
use serde::Serialize;
use std::time::Duration;

const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Aggregate view of a run. Rates and averages are `None` for an empty input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total_files: usize,
    /// Archives that delivered at least one object (SUCCESS + PARTIAL_SUCCESS).
    pub successful: usize,
    pub partial: usize,
    pub failed: usize,
    pub total_xml_files_uploaded: usize,
    pub total_bytes_uploaded: u64,
    pub total_processing_time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_processing_time_per_file: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_bytes_per_file: Option<f64>,
}

impl BatchSummary {
    pub fn from_results(results: &[FileResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }

        let total_files = results.len();
        let mut summary = Self {
            total_files,
            ..Self::default()
        };

        // Durations sum exactly, so the total does not depend on input order.
        let mut total_elapsed = Duration::ZERO;

        for result in results {
            if result.status.delivered() {
                summary.successful += 1;
            } else {
                summary.failed += 1;
            }
            if result.status == FileStatus::PartialSuccess {
                summary.partial += 1;
            }
            summary.total_xml_files_uploaded += result.xml_count;
            summary.total_bytes_uploaded += result.bytes_uploaded;
            total_elapsed += result.elapsed;
        }

        let files = total_files as f64;
        summary.total_processing_time_seconds = total_elapsed.as_secs_f64();
        summary.average_processing_time_per_file = Some(total_elapsed.as_secs_f64() / files);
        summary.success_rate_percent = Some(summary.successful as f64 / files * 100.0);
        summary.average_bytes_per_file = Some(summary.total_bytes_uploaded as f64 / files);

        summary
    }

    pub fn is_empty(&self) -> bool {
        self.total_files == 0
    }

    pub fn total_megabytes_uploaded(&self) -> f64 {
        self.total_bytes_uploaded as f64 / BYTES_PER_MIB
    }
}
