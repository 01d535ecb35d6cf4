// file: src/storage/s3.rs
// description: S3-compatible object storage backend
// reference: https://docs.rs/aws-sdk-s3

use crate::config::StorageConfig;
use crate::error::{PipelineError, Result};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
};
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.path_style);

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            builder = builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "zipstream",
            ));
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(
            "S3 client initialized for bucket {} ({})",
            config.bucket, config.region
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }
}

fn content_type_for(object_name: &str) -> &'static str {
    if object_name.to_ascii_lowercase().ends_with(".xml") {
        "application/xml"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn verify(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                PipelineError::Config(format!(
                    "Cannot reach bucket {}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;
        info!("Connectivity to s3://{} verified", self.bucket);
        Ok(())
    }

    #[instrument(skip(self, content), fields(bucket = %self.bucket))]
    async fn put(&self, object_name: &str, content: Vec<u8>) -> Result<()> {
        debug!("PUT s3://{}/{} ({} bytes)", self.bucket, object_name, content.len());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_name)
            .content_type(content_type_for(object_name))
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| PipelineError::upload(object_name, DisplayErrorContext(&e)))?;

        Ok(())
    }
}
