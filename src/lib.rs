// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod exporter;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod utils;

pub use archive::{ArchiveMember, ArchiveMetadata, ArchiveStreamer, InspectionResult};
pub use catalog::{FileCatalog, LedgerRecord, LedgerStats};
pub use config::{
    Config, LoggingConfig, PipelineConfig, ReportConfig, SourceConfig, StorageBackend,
    StorageConfig,
};
pub use error::{PipelineError, Result};
pub use exporter::{JsonExporter, SummaryExport, render_report, write_report};
pub use models::{BatchSummary, FileResult, FileStatus};
pub use pipeline::{BatchOutput, BatchPipeline, ProgressTracker};
pub use storage::{ObjectStore, ObjectStoreClient, UploadOutcome};
pub use utils::{HealthCheck, HealthReport, HealthStatus, OperationTimer, Validator};
