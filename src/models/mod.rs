// file: src/models/mod.rs
// description: Data models module exports
// reference: Internal data structures

pub mod file_result;
pub mod summary;

pub use file_result::{FileResult, FileStatus, UploadTally};
pub use summary::BatchSummary;
