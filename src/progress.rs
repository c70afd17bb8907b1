//! Progress-callback trait for per-job export events.
//!
//! Inject an [`Arc<dyn ExportProgressCallback>`] via
//! [`crate::config::ExportConfigBuilder::progress_callback`] to receive events
//! as the driver runs each export job.
//!
//! # Example
//!
//! ```rust
//! use edgequake_md2pdf::{ExportConfig, ExportFormat, ExportProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     written: Arc<AtomicUsize>,
//! }
//!
//! impl ExportProgressCallback for CountingCallback {
//!     fn on_job_complete(&self, format: ExportFormat, output: &std::path::Path, bytes: u64) {
//!         self.written.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{format}: {} ({bytes} bytes)", output.display());
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     written: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ExportConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExportProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::config::ExportFormat;
use std::path::Path;
use std::sync::Arc;

/// Called by the export driver as it runs each job.
///
/// Jobs run one after another, so calls never overlap, but the trait is
/// `Send + Sync` so callbacks can be shared with other tasks. All methods
/// default to no-ops.
pub trait ExportProgressCallback: Send + Sync {
    /// Called once before the first job.
    ///
    /// # Arguments
    /// * `total_jobs`: number of formats that will be exported
    fn on_export_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Called before a job loads the source.
    fn on_job_start(&self, format: ExportFormat, job_num: usize, total_jobs: usize) {
        let _ = (format, job_num, total_jobs);
    }

    /// Called when a job has written its output file.
    ///
    /// # Arguments
    /// * `output`: final path of the written file
    /// * `bytes`: size of the written file
    fn on_job_complete(&self, format: ExportFormat, output: &Path, bytes: u64) {
        let _ = (format, output, bytes);
    }

    /// Called when a job fails. Later jobs still run.
    fn on_job_error(&self, format: ExportFormat, error: &str) {
        let _ = (format, error);
    }

    /// Called once after every job has been attempted.
    fn on_export_complete(&self, total_jobs: usize, success_count: usize) {
        let _ = (total_jobs, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExportConfig`].
pub type ProgressCallback = Arc<dyn ExportProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        success_total: AtomicUsize,
    }

    impl ExportProgressCallback for TrackingCallback {
        fn on_job_start(&self, _format: ExportFormat, _job_num: usize, _total_jobs: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_complete(&self, _format: ExportFormat, _output: &Path, _bytes: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_error(&self, _format: ExportFormat, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_export_complete(&self, _total_jobs: usize, success_count: usize) {
            self.success_total.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_export_start(2);
        cb.on_job_start(ExportFormat::Pdf, 1, 2);
        cb.on_job_complete(ExportFormat::Pdf, Path::new("a.pdf"), 10);
        cb.on_job_error(ExportFormat::Png, "browser crashed");
        cb.on_export_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_job_start(ExportFormat::Html, 1, 2);
        tracker.on_job_complete(ExportFormat::Html, Path::new("a.html"), 512);
        tracker.on_job_start(ExportFormat::Pdf, 2, 2);
        tracker.on_job_error(ExportFormat::Pdf, "timeout");
        tracker.on_export_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.success_total.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_export_start(4);
    }
}
