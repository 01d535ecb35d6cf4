// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{PipelineError, Result};
use dotenvy::dotenv;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

static INLINE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Local,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    #[serde(default)]
    pub path_style: bool,
    pub local_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub archive_dir: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,
    pub manifest: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub recursive: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_object_prefix")]
    pub object_prefix: String,
    #[serde(default = "default_payload_extension")]
    pub payload_extension: String,
    pub result_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_path")]
    pub path: PathBuf,
    pub json_path: Option<PathBuf>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_ledger_file() -> String {
    "processing_metadata.csv".to_string()
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    100
}

fn default_max_workers() -> usize {
    4
}

fn default_object_prefix() -> String {
    "xml_archives".to_string()
}

fn default_payload_extension() -> String {
    ".xml".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_report_path() -> PathBuf {
    PathBuf::from("batch_processing_report.txt")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            object_prefix: default_object_prefix(),
            payload_extension: default_payload_extension(),
            result_timeout_secs: None,
        }
    }
}

impl PipelineConfig {
    pub fn result_timeout(&self) -> Option<Duration> {
        self.result_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: default_report_path(),
            json_path: None,
        }
    }
}

impl SourceConfig {
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(&self.ledger_file)
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::load_unchecked(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and expands settings without checking them, for diagnostics
    /// that should report a missing archive directory instead of failing.
    pub fn load_unchecked(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder.add_source(config::File::from(Path::new("config/default.toml")));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ZIPSTREAM")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        config.expand_env();
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::S3,
                bucket: "xml-archives".to_string(),
                region: default_region(),
                endpoint: None,
                access_key: None,
                secret_key: None,
                path_style: false,
                local_root: None,
            },
            source: SourceConfig {
                archive_dir: PathBuf::from("./archives"),
                data_dir: default_data_dir(),
                ledger_file: default_ledger_file(),
                manifest: None,
                recursive: true,
            },
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
            report: ReportConfig::default(),
        }
    }

    /// Expands `${VAR}` / `$VAR` references in string settings. Unknown
    /// variables are left as written.
    pub fn expand_env(&mut self) {
        let storage = &mut self.storage;
        storage.bucket = expand_value(&storage.bucket);
        storage.region = expand_value(&storage.region);
        expand_option(&mut storage.endpoint);
        expand_option(&mut storage.access_key);
        expand_option(&mut storage.secret_key);
        expand_path_option(&mut storage.local_root);

        let source = &mut self.source;
        source.archive_dir = expand_path(&source.archive_dir);
        source.data_dir = expand_path(&source.data_dir);
        source.ledger_file = expand_value(&source.ledger_file);
        expand_path_option(&mut source.manifest);

        self.pipeline.object_prefix = expand_value(&self.pipeline.object_prefix);
        expand_path_option(&mut self.logging.file);
        self.report.path = expand_path(&self.report.path);
        expand_path_option(&mut self.report.json_path);
    }

    pub fn validate(&self) -> Result<()> {
        if !self.source.archive_dir.is_dir() {
            return Err(PipelineError::Config(format!(
                "archive_dir does not exist: {}",
                self.source.archive_dir.display()
            )));
        }

        if self.pipeline.batch_size == 0 {
            return Err(PipelineError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.max_workers == 0 {
            return Err(PipelineError::Config(
                "max_workers must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.payload_extension.is_empty() {
            return Err(PipelineError::Config(
                "payload_extension must not be empty".to_string(),
            ));
        }

        match self.storage.backend {
            StorageBackend::S3 if self.storage.bucket.trim().is_empty() => {
                return Err(PipelineError::Config(
                    "storage.bucket is required for the s3 backend".to_string(),
                ));
            }
            StorageBackend::Local if self.storage.local_root.is_none() => {
                return Err(PipelineError::Config(
                    "storage.local_root is required for the local backend".to_string(),
                ));
            }
            _ => {}
        }

        Ok(())
    }
}

fn expand_value(value: &str) -> String {
    if let Some(name) = value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        return std::env::var(name).unwrap_or_else(|_| value.to_string());
    }

    if let Some(name) = value.strip_prefix('$') {
        return std::env::var(name).unwrap_or_else(|_| value.to_string());
    }

    INLINE_VAR
        .replace_all(value, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn expand_option(value: &mut Option<String>) {
    if let Some(v) = value.as_mut() {
        *v = expand_value(v);
    }
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_value(&path.to_string_lossy()))
}

fn expand_path_option(path: &mut Option<PathBuf>) {
    if let Some(p) = path.as_mut() {
        *p = expand_path(p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_for(dir: &Path) -> Config {
        let mut config = Config::default_config();
        config.source.archive_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_default_config_validates_with_existing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(config_for(temp.path()).validate().is_ok());
    }

    #[test]
    fn test_missing_archive_dir_rejected() {
        let config = config_for(Path::new("/definitely/not/here"));
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let temp = TempDir::new().unwrap();
        let mut config = config_for(temp.path());
        config.pipeline.max_workers = 0;
        assert!(config.validate().is_err());

        config.pipeline.max_workers = 2;
        config.pipeline.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_local_backend_requires_root() {
        let temp = TempDir::new().unwrap();
        let mut config = config_for(temp.path());
        config.storage.backend = StorageBackend::Local;
        assert!(config.validate().is_err());

        config.storage.local_root = Some(temp.path().join("bucket"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_value_forms() {
        // SAFETY: test-local variable names, not read concurrently elsewhere.
        unsafe {
            std::env::set_var("ZS_TEST_BUCKET", "lattes");
        }

        assert_eq!(expand_value("${ZS_TEST_BUCKET}"), "lattes");
        assert_eq!(expand_value("$ZS_TEST_BUCKET"), "lattes");
        assert_eq!(
            expand_value("/mnt/${ZS_TEST_BUCKET}/zips"),
            "/mnt/lattes/zips"
        );
        assert_eq!(
            expand_value("${ZS_TEST_UNSET_VAR}"),
            "${ZS_TEST_UNSET_VAR}"
        );
        assert_eq!(expand_value("plain"), "plain");
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp = TempDir::new().unwrap();
        let archives = temp.path().join("archives");
        std::fs::create_dir(&archives).unwrap();
        let path = temp.path().join("settings.toml");
        std::fs::write(
            &path,
            format!(
                r#"
[storage]
bucket = "test-bucket"

[source]
archive_dir = "{}"

[pipeline]
max_workers = 2
result_timeout_secs = 30
"#,
                archives.display()
            ),
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.storage.bucket, "test-bucket");
        assert_eq!(config.pipeline.max_workers, 2);
        assert_eq!(config.pipeline.batch_size, 100);
        assert_eq!(config.pipeline.payload_extension, ".xml");
        assert_eq!(
            config.pipeline.result_timeout(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            config.source.ledger_path(),
            PathBuf::from("./data/processing_metadata.csv")
        );
    }
}
