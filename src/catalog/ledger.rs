// file: src/catalog/ledger.rs
// description: candidate discovery and the append-only csv processing ledger
// reference: https://docs.rs/csv, https://docs.rs/walkdir

use crate::error::{PipelineError, Result};
use crate::models::{FileResult, FileStatus};
use crate::utils::Validator;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Used when no manifest is available, so a development run still has work.
pub const DEVELOPMENT_SAMPLE: [&str; 5] = [
    "2289791037340878.zip",
    "7736757198910884.zip",
    "4750415979101539.zip",
    "7953183731885121.zip",
    "8154062550507046.zip",
];

/// One ledger row per processed archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub run_id: String,
    pub archive: String,
    pub status: FileStatus,
    pub xml_count: usize,
    pub uploaded_objects_count: usize,
    pub uploaded_objects: String,
    pub bytes_uploaded: u64,
    pub elapsed_seconds: f64,
    pub error_message: Option<String>,
    #[serde(default)]
    pub timestamp: String,
}

impl LedgerRecord {
    pub fn from_result(result: &FileResult, run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            archive: result.source_archive.clone(),
            status: result.status,
            xml_count: result.xml_count,
            uploaded_objects_count: result.uploaded_object_names.len(),
            uploaded_objects: result.uploaded_object_names.join(","),
            bytes_uploaded: result.bytes_uploaded,
            elapsed_seconds: result.elapsed_seconds(),
            error_message: result.error_message.clone(),
            timestamp: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStats {
    pub total: usize,
    pub successful: usize,
    pub partial: usize,
    pub failed: usize,
    pub total_xml: usize,
    pub last_processed: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileCatalog {
    archive_dir: PathBuf,
    ledger_path: PathBuf,
    recursive: bool,
}

impl FileCatalog {
    pub fn new(archive_dir: impl Into<PathBuf>, ledger_path: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            ledger_path: ledger_path.into(),
            recursive: true,
        }
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    /// Every zip archive below the archive directory, as paths relative to
    /// it, sorted.
    pub fn list_archives(&self) -> Result<Vec<String>> {
        info!("Listing archives in {}", self.archive_dir.display());
        Validator::validate_directory(&self.archive_dir)?;

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut archives: Vec<String> = WalkDir::new(&self.archive_dir)
            .follow_links(false)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry
                    .path()
                    .strip_prefix(&self.archive_dir)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                Validator::is_zip_filename(&relative).then_some(relative)
            })
            .collect();

        archives.sort();
        info!("Found {} zip archives", archives.len());
        Ok(archives)
    }

    /// Archive names from a manifest CSV with an `archive` column. When the
    /// manifest also carries `status` and `sampled` columns only processed,
    /// sampled rows are returned. Falls back to [`DEVELOPMENT_SAMPLE`].
    pub fn load_candidates(&self, manifest: Option<&Path>) -> Vec<String> {
        if let Some(path) = manifest
            && path.exists()
        {
            match read_manifest(path) {
                Ok(Some(candidates)) => {
                    info!("Loaded {} candidates from {}", candidates.len(), path.display());
                    return candidates;
                }
                Ok(None) => warn!("Column 'archive' not found in {}", path.display()),
                Err(e) => error!("Failed to read manifest {}: {}", path.display(), e),
            }
        }

        warn!(
            "Using development sample ({} archives)",
            DEVELOPMENT_SAMPLE.len()
        );
        DEVELOPMENT_SAMPLE.iter().map(|s| s.to_string()).collect()
    }

    /// Appends `records` to the ledger, stamping each with the current time.
    /// Existing rows are kept.
    pub fn persist(&self, records: Vec<LedgerRecord>) -> Result<()> {
        if records.is_empty() {
            debug!("No ledger records to persist");
            return Ok(());
        }

        let count = records.len();
        self.append(records).map_err(|e| {
            error!("Failed to write ledger {}: {}", self.ledger_path.display(), e);
            PipelineError::LedgerWrite {
                path: self.ledger_path.clone(),
                message: e.to_string(),
            }
        })?;

        info!("Appended {} rows to {}", count, self.ledger_path.display());
        Ok(())
    }

    fn append(&self, records: Vec<LedgerRecord>) -> Result<()> {
        if let Some(parent) = self.ledger_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let has_rows = fs::metadata(&self.ledger_path)
            .map(|m| m.len() > 0)
            .unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.ledger_path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(!has_rows)
            .from_writer(file);

        let timestamp = Utc::now().to_rfc3339();
        for mut record in records {
            record.timestamp = timestamp.clone();
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// All ledger rows; empty when no ledger exists yet. Unparseable rows are
    /// skipped.
    pub fn load_history(&self) -> Result<Vec<LedgerRecord>> {
        if !self.ledger_path.exists() {
            warn!("No processing history at {}", self.ledger_path.display());
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.ledger_path)?;
        let mut records = Vec::new();
        for (line, row) in reader.deserialize::<LedgerRecord>().enumerate() {
            match row {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping ledger row {}: {}", line + 2, e),
            }
        }

        info!("Loaded {} ledger rows", records.len());
        Ok(records)
    }

    pub fn processing_stats(&self) -> Result<LedgerStats> {
        let history = self.load_history()?;
        let mut stats = LedgerStats {
            total: history.len(),
            ..LedgerStats::default()
        };

        for record in &history {
            match record.status {
                FileStatus::Success => stats.successful += 1,
                FileStatus::PartialSuccess => stats.partial += 1,
                FileStatus::Failure => stats.failed += 1,
            }
            stats.total_xml += record.xml_count;
        }

        stats.last_processed = history
            .iter()
            .map(|r| r.timestamp.as_str())
            .filter(|t| !t.is_empty())
            .max()
            .map(str::to_string);

        Ok(stats)
    }

    /// Moves the ledger aside as `<stem>_backup_<timestamp>.csv`, either next
    /// to it or inside `backup_dir`. Returns `None` when there is no ledger.
    pub fn backup_ledger(&self, backup_dir: Option<&Path>) -> Result<Option<PathBuf>> {
        if !self.ledger_path.exists() {
            warn!("No ledger to back up at {}", self.ledger_path.display());
            return Ok(None);
        }

        let stem = self
            .ledger_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "ledger".to_string());
        let file_name = format!(
            "{}_backup_{}.csv",
            stem,
            Local::now().format("%Y%m%d_%H%M%S")
        );

        let backup_path = match backup_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                dir.join(file_name)
            }
            None => self.ledger_path.with_file_name(file_name),
        };

        if fs::rename(&self.ledger_path, &backup_path).is_err() {
            fs::copy(&self.ledger_path, &backup_path)?;
            fs::remove_file(&self.ledger_path)?;
        }

        info!("Ledger backed up to {}", backup_path.display());
        Ok(Some(backup_path))
    }
}

fn read_manifest(path: &Path) -> Result<Option<Vec<String>>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));

    let Some(archive_idx) = column("archive") else {
        return Ok(None);
    };
    let filter = column("status").zip(column("sampled"));

    let mut candidates = Vec::new();
    for row in reader.records() {
        let row = row?;
        let Some(archive) = row.get(archive_idx).map(str::trim).filter(|a| !a.is_empty()) else {
            continue;
        };

        if let Some((status_idx, sampled_idx)) = filter {
            let processed = row
                .get(status_idx)
                .is_some_and(|s| s.trim().eq_ignore_ascii_case("processed"));
            let sampled = row
                .get(sampled_idx)
                .is_some_and(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"));
            if !(processed && sampled) {
                continue;
            }
        }

        candidates.push(archive.to_string());
    }

    Ok(Some(candidates))
}
