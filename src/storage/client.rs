// file: src/storage/client.rs
// description: upload client that turns every store failure into an outcome value
// reference: datadir-lab-bdp storage wrapper, adapted to never raise per object

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Backend capable of writing named objects. Implementations must be safe to
/// share across concurrently running workers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human readable destination, e.g. `s3://bucket`.
    fn describe(&self) -> String;

    /// Checks the destination exists and is reachable.
    async fn verify(&self) -> Result<()>;

    async fn put(&self, object_name: &str, content: Vec<u8>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub object_name: String,
    pub success: bool,
    pub size_bytes: u64,
    pub error_message: Option<String>,
}

impl UploadOutcome {
    pub fn succeeded(object_name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            object_name: object_name.into(),
            success: true,
            size_bytes,
            error_message: None,
        }
    }

    pub fn failed(object_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            success: false,
            size_bytes: 0,
            error_message: Some(message.into()),
        }
    }
}

#[derive(Clone)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreClient {
    /// Wraps `store` after checking connectivity. A store that cannot be
    /// reached is a setup failure and is returned as an error.
    pub async fn connect(store: Arc<dyn ObjectStore>) -> Result<Self> {
        let destination = store.describe();
        store.verify().await.inspect_err(|e| {
            error!("Object store {} is not reachable: {}", destination, e);
        })?;
        info!("Object store client ready: {}", destination);
        Ok(Self { store })
    }

    pub fn destination(&self) -> String {
        self.store.describe()
    }

    pub async fn upload(&self, content: Vec<u8>, object_name: &str) -> UploadOutcome {
        if content.is_empty() {
            return UploadOutcome::failed(object_name, "Empty content, upload skipped");
        }

        let size = content.len() as u64;
        debug!("Uploading {} ({} bytes)", object_name, size);

        match self.store.put(object_name, content).await {
            Ok(()) => {
                debug!("Uploaded {}", object_name);
                UploadOutcome::succeeded(object_name, size)
            }
            Err(e) => {
                error!("Upload of {} failed: {}", object_name, e);
                UploadOutcome::failed(object_name, e.to_string())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::PipelineError;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory store for tests. Records every object written and can be told
    /// to reject or stall on specific object names.
    #[derive(Default)]
    pub struct RecordingStore {
        pub objects: Mutex<Vec<(String, usize)>>,
        pub reject: HashSet<String>,
        pub panic_on: HashSet<String>,
        pub stall_on: HashSet<String>,
        pub unreachable: bool,
    }

    impl RecordingStore {
        pub fn names(&self) -> Vec<String> {
            self.objects
                .lock()
                .unwrap()
                .iter()
                .map(|(name, _)| name.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        fn describe(&self) -> String {
            "memory://test".to_string()
        }

        async fn verify(&self) -> Result<()> {
            if self.unreachable {
                return Err(PipelineError::Config("bucket not found".to_string()));
            }
            Ok(())
        }

        async fn put(&self, object_name: &str, content: Vec<u8>) -> Result<()> {
            if self.panic_on.contains(object_name) {
                panic!("store exploded on {}", object_name);
            }
            if self.stall_on.contains(object_name) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.reject.contains(object_name) {
                return Err(PipelineError::upload(object_name, "rejected by store"));
            }
            self.objects
                .lock()
                .unwrap()
                .push((object_name.to_string(), content.len()));
            Ok(())
        }
    }
}
