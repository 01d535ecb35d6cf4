// file: src/storage/mod.rs
// description: object storage module exports
// reference: Internal module structure

pub mod client;
pub mod local;
pub mod s3;

pub use client::{ObjectStore, ObjectStoreClient, UploadOutcome};
pub use local::LocalStore;
pub use s3::S3Store;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{PipelineError, Result};
use std::sync::Arc;

/// Builds the configured backend and verifies it is reachable.
pub async fn connect(config: &StorageConfig) -> Result<ObjectStoreClient> {
    let store: Arc<dyn ObjectStore> = match config.backend {
        StorageBackend::S3 => Arc::new(S3Store::new(config).await?),
        StorageBackend::Local => {
            let root = config.local_root.clone().ok_or_else(|| {
                PipelineError::Config("storage.local_root is not set".to_string())
            })?;
            Arc::new(LocalStore::new(root))
        }
    };

    ObjectStoreClient::connect(store).await
}
