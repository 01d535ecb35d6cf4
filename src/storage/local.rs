// file: src/storage/local.rs
// description: filesystem-backed object store for offline runs
// reference: object names map to paths below a root directory

use crate::error::{PipelineError, Result};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, object_name: &str) -> Result<PathBuf> {
        let relative = Path::new(object_name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if object_name.is_empty() || escapes {
            return Err(PipelineError::upload(
                object_name,
                "object name must be a relative path without '..'",
            ));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn verify(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            PipelineError::Config(format!(
                "Cannot create local store root {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    async fn put(&self, object_name: &str, content: Vec<u8>) -> Result<()> {
        let path = self.object_path(object_name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!("Writing {} bytes to {}", content.len(), path.display());
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| PipelineError::upload(object_name, e))
    }
}
