// file: src/pipeline/batch.rs
// description: bounded-concurrency archive processing with per-file and per-batch outcomes
// reference: futures buffer_unordered worker pool over spawned tokio tasks

use crate::archive::{ArchiveMember, ArchiveStreamer};
use crate::catalog::{FileCatalog, LedgerRecord};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::{BatchSummary, FileResult, UploadTally};
use crate::storage::ObjectStoreClient;
use crate::utils::Validator;
use futures::stream::{self, StreamExt};
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// Called with `(completed, total)` after every archive result lands.
pub type ProgressCallback<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// `{prefix}/{archive id without extension}/{member name}`. Sub-directories
/// of the archive id are kept, so `a/X.zip` and `b/X.zip` never share objects.
pub fn object_name(prefix: &str, archive_id: &str, member_name: &str) -> String {
    format!("{}/{}/{}", prefix, archive_key(archive_id), member_name)
}

fn archive_key(archive_id: &str) -> String {
    let normalized = archive_id.replace('\\', "/");
    let path = Path::new(&normalized);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| normalized.clone());

    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => format!("{}/{}", parent.to_string_lossy(), stem),
        None => stem,
    }
}

/// Results of one `process_batch` call. A ledger failure is reported next to
/// the results rather than replacing them.
#[derive(Debug)]
pub struct BatchOutput {
    pub results: Vec<FileResult>,
    pub ledger_error: Option<PipelineError>,
}

/// Everything a single archive needs; cloned into each spawned task.
#[derive(Clone)]
struct ArchiveWorker {
    streamer: Arc<ArchiveStreamer>,
    client: ObjectStoreClient,
}

impl ArchiveWorker {
    async fn process(&self, archive_id: &str, prefix: &str) -> FileResult {
        let start = Instant::now();
        info!("Processing archive {}", archive_id);

        match self.upload_members(archive_id, prefix).await {
            Ok(tally) => {
                let result = tally.finish(start.elapsed());
                info!(
                    "Finished {} - status: {} - xml: {} - bytes: {} - {:.2}s",
                    archive_id,
                    result.status,
                    result.xml_count,
                    result.bytes_uploaded,
                    result.elapsed_seconds()
                );
                if let Some(message) = &result.error_message {
                    warn!("{}: {}", archive_id, message);
                }
                result
            }
            Err(e) => {
                error!("Archive {} failed: {}", archive_id, e);
                FileResult::failure(archive_id, e.to_string(), start.elapsed())
            }
        }
    }

    /// Uploads members strictly one after another; the next member is only
    /// pulled once the previous upload has an outcome.
    async fn upload_members(&self, archive_id: &str, prefix: &str) -> Result<UploadTally> {
        let mut members = self.streamer.stream(archive_id).await?;
        let mut tally = UploadTally::new(archive_id);

        while let Some(ArchiveMember { name, content, .. }) = members.next().await {
            let object = object_name(prefix, archive_id, &name);
            if !Validator::is_valid_object_name(&object) {
                debug!(
                    "Object name {} contains unusual characters (sanitized form: {})",
                    object,
                    Validator::sanitize_object_name(&object)
                );
            }

            let outcome = self.client.upload(content, &object).await;
            if !outcome.success {
                warn!(
                    "Upload failed for {} in {}: {}",
                    name,
                    archive_id,
                    outcome.error_message.as_deref().unwrap_or("unknown error")
                );
            }
            tally.record(&name, &outcome);
        }

        Ok(tally)
    }
}

pub struct BatchPipeline {
    worker: ArchiveWorker,
    catalog: FileCatalog,
    max_workers: usize,
    result_timeout: Option<Duration>,
    run_id: String,
}

impl BatchPipeline {
    pub fn new(
        streamer: ArchiveStreamer,
        client: ObjectStoreClient,
        catalog: FileCatalog,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            worker: ArchiveWorker {
                streamer: Arc::new(streamer),
                client,
            },
            catalog,
            max_workers: config.max_workers.max(1),
            result_timeout: config.result_timeout(),
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Streams one archive into the store. Never fails: errors, a crashed
    /// worker and an expired result timeout all become a FAILURE result
    /// carrying the message and the time spent.
    pub async fn process_one(&self, archive_id: &str, prefix: &str) -> FileResult {
        self.spawn_unit(archive_id.to_string(), prefix.to_string()).await
    }

    /// Runs one archive on its own task so a panic stays inside it.
    fn spawn_unit(
        &self,
        archive_id: String,
        prefix: String,
    ) -> impl Future<Output = FileResult> + use<> {
        let worker = self.worker.clone();
        let timeout = self.result_timeout;

        async move {
            let handle = tokio::spawn({
                let archive_id = archive_id.clone();
                async move { worker.process(&archive_id, &prefix).await }
            });
            collect_result(archive_id, handle, timeout).await
        }
    }

    /// Processes `archive_ids` on at most `max_workers` concurrent tasks and
    /// returns results in completion order, then appends them to the ledger.
    pub async fn process_batch(
        &self,
        archive_ids: &[String],
        prefix: &str,
        progress: Option<ProgressCallback<'_>>,
    ) -> BatchOutput {
        let total = archive_ids.len();
        info!(
            "Processing batch of {} archives with {} workers",
            total, self.max_workers
        );

        let units = archive_ids
            .iter()
            .map(|archive_id| self.spawn_unit(archive_id.clone(), prefix.to_string()));

        let mut completed = stream::iter(units).buffer_unordered(self.max_workers);
        let mut results = Vec::with_capacity(total);

        while let Some(result) = completed.next().await {
            results.push(result);
            let done = results.len();
            if let Some(last) = results.last() {
                info!("[{}/{}] {} -> {}", done, total, last.source_archive, last.status);
            }
            if let Some(callback) = progress {
                callback(done, total);
            }
        }

        let ledger_error = self.persist(&results).await.err();

        info!("Batch complete: {} archives accounted for", results.len());
        BatchOutput {
            results,
            ledger_error,
        }
    }

    pub fn summarize(results: &[FileResult]) -> BatchSummary {
        let summary = BatchSummary::from_results(results);
        debug!("Batch summary: {:?}", summary);
        summary
    }

    async fn persist(&self, results: &[FileResult]) -> Result<()> {
        let records: Vec<LedgerRecord> = results
            .iter()
            .map(|r| LedgerRecord::from_result(r, &self.run_id))
            .collect();
        let catalog = self.catalog.clone();
        let ledger_path = catalog.ledger_path().to_path_buf();

        tokio::task::spawn_blocking(move || catalog.persist(records))
            .await
            .map_err(|e| PipelineError::LedgerWrite {
                path: ledger_path,
                message: format!("ledger task failed: {}", e),
            })?
            .inspect_err(|e| error!("Results were not recorded: {}", e))
    }
}

/// Joins one worker, turning a timeout or a crashed task into a FAILURE
/// result so the rest of the batch is unaffected.
async fn collect_result(
    archive_id: String,
    handle: JoinHandle<FileResult>,
    timeout: Option<Duration>,
) -> FileResult {
    let started = Instant::now();
    let abort = handle.abort_handle();

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.abort();
                warn!("Archive {} timed out after {:?}", archive_id, limit);
                return FileResult::failure(
                    archive_id,
                    format!("Timed out after {:.1}s", limit.as_secs_f64()),
                    started.elapsed(),
                );
            }
        },
        None => handle.await,
    };

    joined.unwrap_or_else(|e| {
        let message = join_error_message(e);
        error!("Worker for {} crashed: {}", archive_id, message);
        FileResult::failure(archive_id, message, started.elapsed())
    })
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("worker cancelled: {}", err);
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("worker panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::streamer::testing::{corrupt_member, write_zip};
    use crate::models::FileStatus;
    use crate::storage::client::testing::RecordingStore;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        store: Arc<RecordingStore>,
        pipeline: BatchPipeline,
    }

    impl Fixture {
        fn catalog(&self) -> FileCatalog {
            FileCatalog::new(self.temp.path(), self.temp.path().join("ledger.csv"))
        }
    }

    async fn fixture(store: RecordingStore, config: PipelineConfig) -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(store);
        let client = ObjectStoreClient::connect(store.clone()).await.unwrap();
        let pipeline = BatchPipeline::new(
            ArchiveStreamer::new(temp.path(), ".xml"),
            client,
            FileCatalog::new(temp.path(), temp.path().join("ledger.csv")),
            &config,
        )
        .with_run_id("test-run");
        Fixture {
            temp,
            store,
            pipeline,
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_object_name_convention() {
        assert_eq!(object_name("prefix", "A.zip", "1.xml"), "prefix/A/1.xml");
        assert_eq!(object_name("p", "sub/B.zip", "x/2.xml"), "p/sub/B/x/2.xml");
        assert_eq!(object_name("p", "a\\b\\D.zip", "1.xml"), "p/a/b/D/1.xml");
        assert_eq!(object_name("p", "C.ZIP", "3.xml"), "p/C/3.xml");
    }

    #[tokio::test]
    async fn test_partial_success_when_empty_member_rejected() {
        let f = fixture(RecordingStore::default(), PipelineConfig::default()).await;
        write_zip(
            f.temp.path(),
            "A.zip",
            &[("1.xml", &[b'a'; 500]), ("2.xml", b"")],
        );

        let result = f.pipeline.process_one("A.zip", "prefix").await;

        assert_eq!(result.status, FileStatus::PartialSuccess);
        assert_eq!(result.xml_count, 1);
        assert_eq!(result.uploaded_object_names, vec!["prefix/A/1.xml"]);
        assert_eq!(result.bytes_uploaded, 500);
        assert!(result.error_message.unwrap().contains("2.xml"));
        assert_eq!(f.store.names(), vec!["prefix/A/1.xml"]);
    }

    #[tokio::test]
    async fn test_full_success_preserves_listing_order() {
        let f = fixture(RecordingStore::default(), PipelineConfig::default()).await;
        write_zip(
            f.temp.path(),
            "A.zip",
            &[("3.xml", b"<c/>"), ("1.xml", b"<a/>"), ("skip.txt", b"x"), ("2.xml", b"<b/>")],
        );

        let result = f.pipeline.process_one("A.zip", "p").await;

        assert_eq!(result.status, FileStatus::Success);
        assert_eq!(result.xml_count, 3);
        assert_eq!(
            result.uploaded_object_names,
            vec!["p/A/3.xml", "p/A/1.xml", "p/A/2.xml"]
        );
        assert_eq!(result.error_message, None);
    }

    #[tokio::test]
    async fn test_archive_without_payload_is_failure() {
        let f = fixture(RecordingStore::default(), PipelineConfig::default()).await;
        write_zip(f.temp.path(), "E.zip", &[("readme.txt", b"hello"), ("dir/", b"")]);

        let result = f.pipeline.process_one("E.zip", "p").await;

        assert_eq!(result.status, FileStatus::Failure);
        assert_eq!(result.xml_count, 0);
        assert!(result.uploaded_object_names.is_empty());
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_archives_become_failures() {
        let f = fixture(RecordingStore::default(), PipelineConfig::default()).await;
        std::fs::write(f.temp.path().join("bad.zip"), b"not a zip at all").unwrap();

        let missing = f.pipeline.process_one("B.zip", "p").await;
        assert_eq!(missing.status, FileStatus::Failure);
        assert!(missing.error_message.unwrap().contains("not found"));

        let corrupt = f.pipeline.process_one("bad.zip", "p").await;
        assert_eq!(corrupt.status, FileStatus::Failure);
        assert!(corrupt.error_message.unwrap().contains("corrupt"));
    }

    #[tokio::test]
    async fn test_every_upload_rejected_is_failure() {
        let mut store = RecordingStore::default();
        store.reject.insert("p/A/1.xml".to_string());
        store.reject.insert("p/A/2.xml".to_string());
        let f = fixture(store, PipelineConfig::default()).await;
        write_zip(f.temp.path(), "A.zip", &[("1.xml", b"<a/>"), ("2.xml", b"<b/>")]);

        let result = f.pipeline.process_one("A.zip", "p").await;

        assert_eq!(result.status, FileStatus::Failure);
        assert_eq!(result.xml_count, 0);
        assert!(result.error_message.unwrap().contains("rejected by store"));
    }

    #[tokio::test]
    async fn test_batch_returns_every_archive_once_with_narrow_pool() {
        let config = PipelineConfig {
            max_workers: 2,
            ..PipelineConfig::default()
        };
        let f = fixture(RecordingStore::default(), config).await;
        let names: Vec<String> = (0..7).map(|i| format!("{}.zip", i)).collect();
        for name in &names {
            write_zip(f.temp.path(), name, &[("1.xml", b"<a/>"), ("2.xml", b"<b/>")]);
        }

        let calls = AtomicUsize::new(0);
        let callback = |done: usize, total: usize| {
            assert_eq!(total, 7);
            assert!(done <= total);
            calls.fetch_add(1, Ordering::SeqCst);
        };
        let output = f.pipeline.process_batch(&names, "p", Some(&callback)).await;

        assert!(output.ledger_error.is_none());
        assert_eq!(output.results.len(), 7);
        let seen: HashSet<_> = output.results.iter().map(|r| r.source_archive.clone()).collect();
        assert_eq!(seen, names.iter().cloned().collect::<HashSet<_>>());
        assert!(output.results.iter().all(|r| r.status == FileStatus::Success));
        assert_eq!(calls.load(Ordering::SeqCst), 7);
        assert_eq!(f.store.names().len(), 14);

        let summary = BatchPipeline::summarize(&output.results);
        assert_eq!(summary.total_files, 7);
        assert_eq!(summary.successful, 7);
        assert_eq!(summary.total_xml_files_uploaded, 14);
    }

    #[tokio::test]
    async fn test_missing_archive_does_not_stop_batch() {
        let f = fixture(RecordingStore::default(), PipelineConfig::default()).await;
        write_zip(f.temp.path(), "A.zip", &[("1.xml", b"<a/>")]);
        write_zip(f.temp.path(), "C.zip", &[("1.xml", b"<c/>")]);

        let output = f
            .pipeline
            .process_batch(&ids(&["A.zip", "B.zip", "C.zip"]), "p", None)
            .await;

        assert_eq!(output.results.len(), 3);
        let b = output
            .results
            .iter()
            .find(|r| r.source_archive == "B.zip")
            .unwrap();
        assert_eq!(b.status, FileStatus::Failure);
        assert_eq!(b.xml_count, 0);
        assert!(!b.error_message.as_deref().unwrap_or_default().is_empty());

        let history = f.catalog().load_history().unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|r| r.run_id == "test-run"));
    }

    #[tokio::test]
    async fn test_five_successful_archives_summary() {
        let f = fixture(RecordingStore::default(), PipelineConfig::default()).await;
        let names: Vec<String> = (1..=5).map(|i| format!("S{}.zip", i)).collect();
        for name in &names {
            write_zip(f.temp.path(), name, &[("1.xml", b"<a/>")]);
        }

        let output = f.pipeline.process_batch(&names, "p", None).await;
        let summary = BatchPipeline::summarize(&output.results);

        assert_eq!(summary.total_files, 5);
        assert_eq!(summary.successful, 5);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.success_rate_percent, Some(100.0));
    }

    #[tokio::test]
    async fn test_panicking_worker_is_contained() {
        let mut store = RecordingStore::default();
        store.panic_on.insert("p/Boom/1.xml".to_string());
        let f = fixture(store, PipelineConfig::default()).await;
        write_zip(f.temp.path(), "Boom.zip", &[("1.xml", b"<a/>")]);
        write_zip(f.temp.path(), "Fine.zip", &[("1.xml", b"<a/>")]);

        let output = f
            .pipeline
            .process_batch(&ids(&["Boom.zip", "Fine.zip"]), "p", None)
            .await;

        assert_eq!(output.results.len(), 2);
        let boom = output
            .results
            .iter()
            .find(|r| r.source_archive == "Boom.zip")
            .unwrap();
        assert_eq!(boom.status, FileStatus::Failure);
        assert!(boom.error_message.as_deref().unwrap().contains("panicked"));
        let fine = output
            .results
            .iter()
            .find(|r| r.source_archive == "Fine.zip")
            .unwrap();
        assert_eq!(fine.status, FileStatus::Success);
    }

    #[tokio::test]
    async fn test_result_timeout_marks_only_slow_archive() {
        let mut store = RecordingStore::default();
        store.stall_on.insert("p/Slow/1.xml".to_string());
        let config = PipelineConfig {
            result_timeout_secs: Some(1),
            ..PipelineConfig::default()
        };
        let f = fixture(store, config).await;
        write_zip(f.temp.path(), "Slow.zip", &[("1.xml", b"<a/>")]);
        write_zip(f.temp.path(), "Quick.zip", &[("1.xml", b"<a/>")]);

        let output = f
            .pipeline
            .process_batch(&ids(&["Slow.zip", "Quick.zip"]), "p", None)
            .await;

        assert_eq!(output.results.len(), 2);
        let slow = output
            .results
            .iter()
            .find(|r| r.source_archive == "Slow.zip")
            .unwrap();
        assert_eq!(slow.status, FileStatus::Failure);
        assert!(slow.error_message.as_deref().unwrap().contains("Timed out"));
        assert!(
            output
                .results
                .iter()
                .any(|r| r.source_archive == "Quick.zip" && r.status == FileStatus::Success)
        );
    }

    #[tokio::test]
    async fn test_ledger_failure_keeps_results() {
        let temp = TempDir::new().unwrap();
        write_zip(temp.path(), "A.zip", &[("1.xml", b"<a/>")]);
        // The ledger path is a directory, so appending to it fails.
        let ledger = temp.path().join("ledger.csv");
        std::fs::create_dir(&ledger).unwrap();

        let client = ObjectStoreClient::connect(Arc::new(RecordingStore::default()))
            .await
            .unwrap();
        let pipeline = BatchPipeline::new(
            ArchiveStreamer::new(temp.path(), ".xml"),
            client,
            FileCatalog::new(temp.path(), &ledger),
            &PipelineConfig::default(),
        );

        let output = pipeline.process_batch(&ids(&["A.zip"]), "p", None).await;

        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].status, FileStatus::Success);
        assert!(matches!(
            output.ledger_error,
            Some(PipelineError::LedgerWrite { .. })
        ));
    }

    #[tokio::test]
    async fn test_same_named_archives_in_sibling_dirs_do_not_collide() {
        let f = fixture(RecordingStore::default(), PipelineConfig::default()).await;
        for dir in ["a", "b"] {
            std::fs::create_dir(f.temp.path().join(dir)).unwrap();
            write_zip(
                &f.temp.path().join(dir),
                "X.zip",
                &[("1.xml", format!("<from dir=\"{}\"/>", dir).as_bytes())],
            );
        }

        let archives = f.catalog().list_archives().unwrap();
        assert_eq!(archives, vec!["a/X.zip", "b/X.zip"]);

        let output = f.pipeline.process_batch(&archives, "p", None).await;
        let mut uploaded: Vec<_> = output
            .results
            .iter()
            .flat_map(|r| r.uploaded_object_names.clone())
            .collect();
        uploaded.sort();

        assert_eq!(uploaded, vec!["p/a/X/1.xml", "p/b/X/1.xml"]);
        let mut stored = f.store.names();
        stored.sort();
        assert_eq!(stored, uploaded);
    }

    #[tokio::test]
    async fn test_unreadable_member_skipped_archive_still_succeeds() {
        let f = fixture(RecordingStore::default(), PipelineConfig::default()).await;
        write_zip(
            f.temp.path(),
            "C.zip",
            &[("1.xml", b"<a/>"), ("2.xml", b"<b/>"), ("3.xml", b"<c/>")],
        );
        corrupt_member(f.temp.path(), "C.zip", "2.xml");

        let result = f.pipeline.process_one("C.zip", "p").await;

        assert_eq!(result.status, FileStatus::Success);
        assert_eq!(result.xml_count, 2);
        assert_eq!(result.uploaded_object_names, vec!["p/C/1.xml", "p/C/3.xml"]);
    }

    #[tokio::test]
    async fn test_process_one_contains_store_panic() {
        let mut store = RecordingStore::default();
        store.panic_on.insert("p/Boom/1.xml".to_string());
        let f = fixture(store, PipelineConfig::default()).await;
        write_zip(f.temp.path(), "Boom.zip", &[("1.xml", b"<a/>")]);

        let result = f.pipeline.process_one("Boom.zip", "p").await;

        assert_eq!(result.status, FileStatus::Failure);
        assert!(result.error_message.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let f = fixture(RecordingStore::default(), PipelineConfig::default()).await;
        let output = f.pipeline.process_batch(&[], "p", None).await;
        assert!(output.results.is_empty());
        assert!(output.ledger_error.is_none());
        assert!(BatchPipeline::summarize(&output.results).is_empty());
    }
}
