// file: src/exporter/mod.rs
// description: run reports in text and json form

pub mod json;
pub mod report;

pub use json::{ArchiveIssue, JsonExporter, SummaryExport};
pub use report::{render_report, write_report};
