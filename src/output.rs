//! Result types returned by the export driver.

use crate::config::ExportFormat;
use crate::error::{JobError, Md2PdfError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a single export job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub format: ExportFormat,
    /// Destination path, when it could be resolved.
    pub output_path: Option<PathBuf>,
    /// `None` on success.
    pub error: Option<JobError>,
    /// Size of the written file. Zero on failure.
    pub bytes_written: u64,
    pub duration_ms: u64,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate counters for one invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportStats {
    pub total_jobs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_bytes: u64,
    pub total_duration_ms: u64,
}

/// Everything an invocation produced, one [`JobResult`] per requested format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    pub source: PathBuf,
    pub jobs: Vec<JobResult>,
    pub stats: ExportStats,
}

impl ExportReport {
    pub(crate) fn new(source: PathBuf, jobs: Vec<JobResult>, total_duration_ms: u64) -> Self {
        let succeeded = jobs.iter().filter(|j| j.is_success()).count();
        let stats = ExportStats {
            total_jobs: jobs.len(),
            succeeded,
            failed: jobs.len() - succeeded,
            total_bytes: jobs.iter().map(|j| j.bytes_written).sum(),
            total_duration_ms,
        };
        Self {
            source,
            jobs,
            stats,
        }
    }

    /// Paths of the files that were written.
    pub fn outputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.jobs
            .iter()
            .filter(|j| j.is_success())
            .filter_map(|j| j.output_path.as_ref())
    }

    pub fn has_failures(&self) -> bool {
        self.stats.failed > 0
    }

    /// Treat any failed job as an error.
    ///
    /// Returns [`Md2PdfError::AllJobsFailed`] when nothing was produced and
    /// [`Md2PdfError::PartialFailure`] when only some jobs failed.
    pub fn into_result(self) -> Result<ExportReport, Md2PdfError> {
        let ExportStats {
            total_jobs,
            succeeded,
            failed,
            ..
        } = self.stats;
        if failed == 0 {
            return Ok(self);
        }
        if succeeded == 0 {
            let first_error = self
                .jobs
                .iter()
                .find_map(|j| j.error.as_ref())
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(Md2PdfError::AllJobsFailed {
                total: total_jobs,
                first_error,
            });
        }
        Err(Md2PdfError::PartialFailure {
            success: succeeded,
            failed,
            total: total_jobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(format: ExportFormat, bytes: u64) -> JobResult {
        JobResult {
            format,
            output_path: Some(PathBuf::from(format!("/d/a.{}", format.extension()))),
            error: None,
            bytes_written: bytes,
            duration_ms: 1,
        }
    }

    fn failed(format: ExportFormat) -> JobResult {
        JobResult {
            format,
            output_path: None,
            error: Some(JobError::EngineFailed {
                detail: "boom".into(),
            }),
            bytes_written: 0,
            duration_ms: 1,
        }
    }

    #[test]
    fn stats_are_aggregated() {
        let r = ExportReport::new(
            "/d/a.md".into(),
            vec![ok(ExportFormat::Html, 10), ok(ExportFormat::Pdf, 32)],
            5,
        );
        assert_eq!(r.stats.total_jobs, 2);
        assert_eq!(r.stats.succeeded, 2);
        assert_eq!(r.stats.total_bytes, 42);
        assert_eq!(r.outputs().count(), 2);
        assert!(r.into_result().is_ok());
    }

    #[test]
    fn partial_failure_is_an_error_when_strict() {
        let r = ExportReport::new(
            "/d/a.md".into(),
            vec![failed(ExportFormat::Pdf), ok(ExportFormat::Png, 1)],
            5,
        );
        assert!(r.has_failures());
        assert!(matches!(
            r.into_result(),
            Err(Md2PdfError::PartialFailure {
                success: 1,
                failed: 1,
                total: 2
            })
        ));
    }

    #[test]
    fn total_failure_reports_first_error() {
        let r = ExportReport::new("/d/a.md".into(), vec![failed(ExportFormat::Pdf)], 5);
        match r.into_result() {
            Err(Md2PdfError::AllJobsFailed { total, first_error }) => {
                assert_eq!(total, 1);
                assert!(first_error.contains("boom"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn report_serialises_to_json() {
        let r = ExportReport::new("/d/a.md".into(), vec![ok(ExportFormat::Jpeg, 3)], 5);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"format\":\"jpeg\""));
    }
}
