// file: src/utils/telemetry.rs
// description: health checks and operation timing for batch runs
// reference: Production observability best practices

use crate::catalog::FileCatalog;
use crate::config::StorageConfig;
use crate::storage;
use crate::utils::Validator;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    fn icon(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "✓",
            HealthStatus::Degraded => "⚠",
            HealthStatus::Unhealthy => "✗",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub component: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub response_time_ms: u64,
}

impl HealthCheck {
    pub fn healthy(component: &str, response_time: Duration) -> Self {
        Self {
            component: component.to_string(),
            status: HealthStatus::Healthy,
            message: None,
            response_time_ms: response_time.as_millis() as u64,
        }
    }

    pub fn degraded(component: &str, message: String, response_time: Duration) -> Self {
        Self {
            component: component.to_string(),
            status: HealthStatus::Degraded,
            message: Some(message),
            response_time_ms: response_time.as_millis() as u64,
        }
    }

    pub fn unhealthy(component: &str, message: String, response_time: Duration) -> Self {
        Self {
            component: component.to_string(),
            status: HealthStatus::Unhealthy,
            message: Some(message),
            response_time_ms: response_time.as_millis() as u64,
        }
    }
}

/// Source directory must exist; one without archives only degrades the run.
/// Archives are found with the same walk a run uses.
pub fn probe_archive_dir(path: &Path, recursive: bool) -> HealthCheck {
    let start = Instant::now();
    if let Err(e) = Validator::validate_directory(path) {
        return HealthCheck::unhealthy("archive_dir", e.to_string(), start.elapsed());
    }

    let catalog = FileCatalog::new(path, path.join(".ledger")).with_recursive(recursive);
    match catalog.list_archives() {
        Ok(archives) if !archives.is_empty() => {
            let mut check = HealthCheck::healthy("archive_dir", start.elapsed());
            check.message = Some(format!("{} archives", archives.len()));
            check
        }
        Ok(_) => HealthCheck::degraded(
            "archive_dir",
            format!("no .zip files under {}", path.display()),
            start.elapsed(),
        ),
        Err(e) => HealthCheck::unhealthy("archive_dir", e.to_string(), start.elapsed()),
    }
}

pub async fn probe_object_store(config: &StorageConfig) -> HealthCheck {
    let start = Instant::now();
    match storage::connect(config).await {
        Ok(client) => {
            let mut check = HealthCheck::healthy("object_store", start.elapsed());
            check.message = Some(client.destination());
            check
        }
        Err(e) => HealthCheck::unhealthy("object_store", e.to_string(), start.elapsed()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_status: HealthStatus,
    pub checks: Vec<HealthCheck>,
    pub timestamp: u64,
    pub version: String,
}

impl HealthReport {
    pub fn new(checks: Vec<HealthCheck>, version: String) -> Self {
        let overall_status = if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if checks.iter().any(|c| c.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs();

        Self {
            overall_status,
            checks,
            timestamp,
            version,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.overall_status != HealthStatus::Unhealthy
    }

    pub fn format(&self) -> String {
        let mut output = format!(
            "{} System Health: {:?}\n\
             Version: {}\n\
             Timestamp: {}\n\n",
            self.overall_status.icon(),
            self.overall_status,
            self.version,
            chrono::DateTime::from_timestamp(self.timestamp as i64, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );

        for check in &self.checks {
            output.push_str(&format!(
                "{} {} ({:?}) - {}ms",
                check.status.icon(),
                check.component,
                check.status,
                check.response_time_ms
            ));

            if let Some(ref msg) = check.message {
                output.push_str(&format!("\n  {}", msg));
            }

            output.push('\n');
        }

        output
    }
}

/// Wall-clock timer that logs on start and finish.
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        info!("Starting operation: {}", operation);
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish_with_count(self, count: usize) -> Duration {
        let elapsed = self.elapsed();
        info!(
            "Completed operation: {} - {} archives in {:.2}s ({:.2} archives/sec)",
            self.operation,
            count,
            elapsed.as_secs_f64(),
            if elapsed.as_secs_f64() > 0.0 {
                count as f64 / elapsed.as_secs_f64()
            } else {
                0.0
            }
        );
        elapsed
    }

    pub fn warn_if_slow(&self, threshold: Duration, message: &str) {
        let elapsed = self.elapsed();
        if elapsed > threshold {
            warn!(
                "Slow operation [{}]: {} took {:.2}s (threshold: {:.2}s)",
                self.operation,
                message,
                elapsed.as_secs_f64(),
                threshold.as_secs_f64()
            );
        }
    }
}
