// file: src/pipeline/mod.rs
// description: pipeline module exports and public api
// reference: pipeline orchestration

pub mod batch;
mod progress;

pub use batch::{BatchOutput, BatchPipeline, ProgressCallback, object_name};
pub use progress::{ProgressStats, ProgressTracker};
