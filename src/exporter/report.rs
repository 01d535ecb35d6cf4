// file: src/exporter/report.rs
// description: human readable batch report rendered from a summary

use crate::error::Result;
use crate::models::BatchSummary;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const RULE_WIDTH: usize = 50;

/// Plain-text report. "N/A" stands in for rates that are undefined on an
/// empty run.
pub fn render_report(summary: &BatchSummary) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "BATCH PROCESSING REPORT");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Total files processed: {}", summary.total_files);
    let _ = writeln!(out, "Files successful: {}", summary.successful);
    let _ = writeln!(out, "  of which partial: {}", summary.partial);
    let _ = writeln!(out, "Files failed: {}", summary.failed);
    let _ = writeln!(
        out,
        "Total XML files uploaded: {}",
        summary.total_xml_files_uploaded
    );
    let _ = writeln!(
        out,
        "Total data uploaded (MiB): {:.2}",
        summary.total_megabytes_uploaded()
    );
    let _ = writeln!(
        out,
        "Total processing time (s): {:.2}",
        summary.total_processing_time_seconds
    );
    let _ = writeln!(
        out,
        "Average time per file (s): {}",
        fixed(summary.average_processing_time_per_file)
    );
    let _ = writeln!(
        out,
        "Success rate (%): {}",
        fixed(summary.success_rate_percent)
    );
    let _ = write!(out, "{}", rule);

    out
}

fn fixed(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "N/A".to_string())
}

/// Overwrites `path` with the rendered report.
pub fn write_report(summary: &BatchSummary, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_report(summary))?;
    info!("Report written to {}", path.display());
    Ok(path.to_path_buf())
}
