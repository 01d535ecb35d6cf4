// file: src/pipeline/progress.rs
// description: progress bars and running counts for archive batches
// reference: uses indicatif for progress bars and tracks per-status totals

use crate::models::{FileResult, FileStatus};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressStats {
    pub archives_done: usize,
    pub successful: usize,
    pub partial: usize,
    pub failed: usize,
    pub xml_uploaded: usize,
    pub bytes_uploaded: u64,
}

pub struct ProgressTracker {
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
    archives_done: AtomicUsize,
    successful: AtomicUsize,
    partial: AtomicUsize,
    failed: AtomicUsize,
    xml_uploaded: AtomicUsize,
    bytes_uploaded: AtomicU64,
}

impl ProgressTracker {
    pub fn with_color(total_archives: usize, colored: bool) -> Self {
        let multi_progress = MultiProgress::new();

        Self {
            main_bar: create_progress_bar(&multi_progress, total_archives as u64, colored),
            detail_bar: create_detail_bar(&multi_progress),
            archives_done: AtomicUsize::new(0),
            successful: AtomicUsize::new(0),
            partial: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            xml_uploaded: AtomicUsize::new(0),
            bytes_uploaded: AtomicU64::new(0),
        }
    }

    /// One archive finished; status unknown yet.
    pub fn advance(&self) {
        self.main_bar.inc(1);
    }

    /// Folds finished results into the counters shown under the bar.
    pub fn record(&self, results: &[FileResult]) {
        for result in results {
            self.archives_done.fetch_add(1, Ordering::SeqCst);
            let counter = match result.status {
                FileStatus::Success => &self.successful,
                FileStatus::PartialSuccess => &self.partial,
                FileStatus::Failure => &self.failed,
            };
            counter.fetch_add(1, Ordering::SeqCst);
            self.xml_uploaded.fetch_add(result.xml_count, Ordering::SeqCst);
            self.bytes_uploaded
                .fetch_add(result.bytes_uploaded, Ordering::SeqCst);
        }
        self.update_detail_bar();
    }

    pub fn set_message(&self, message: String) {
        self.main_bar.set_message(message);
    }

    pub fn finish(&self) {
        self.main_bar.finish_with_message("Processing complete");
        self.detail_bar.finish_and_clear();
    }

    pub fn get_stats(&self) -> ProgressStats {
        ProgressStats {
            archives_done: self.archives_done.load(Ordering::SeqCst),
            successful: self.successful.load(Ordering::SeqCst),
            partial: self.partial.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            xml_uploaded: self.xml_uploaded.load(Ordering::SeqCst),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::SeqCst),
        }
    }

    fn update_detail_bar(&self) {
        let stats = self.get_stats();
        self.detail_bar.set_message(format!(
            "Success: {} | Partial: {} | Failed: {} | XML uploaded: {}",
            stats.successful, stats.partial, stats.failed, stats.xml_uploaded
        ));
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.finish();
    }
}

fn create_progress_bar(multi_progress: &MultiProgress, total: u64, colored: bool) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(total));
    let template = if colored {
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}"
    } else {
        "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({eta}) {msg}"
    };
    let chars = if colored { "█▓▒░" } else { "=>-" };
    // Templates are fixed strings; fall back to the default style rather than fail.
    let style = ProgressStyle::default_bar()
        .template(template)
        .map(|s| s.progress_chars(chars))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

fn create_detail_bar(multi_progress: &MultiProgress) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(0));
    if let Ok(style) = ProgressStyle::default_bar().template("{msg}") {
        bar.set_style(style);
    }
    bar
}
