//! Error types for the edgequake-md2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Md2PdfError`]: **Fatal**: the invocation cannot proceed at all
//!   (unsupported format, browser missing, source file absent). Returned as
//!   `Err(Md2PdfError)` from the top-level `export*` functions, and no job
//!   runs.
//!
//! * [`JobError`]: **Non-fatal**: a single export job failed (output
//!   directory missing, browser crashed mid-print) but sibling jobs are fine.
//!   Stored inside [`crate::output::JobResult`] so callers can inspect partial
//!   success rather than losing every format to one bad job.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-md2pdf library.
///
/// Job-level failures use [`JobError`] and are stored in
/// [`crate::output::JobResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Md2PdfError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The caller asked for a format we cannot produce.
    #[error("Unsupported export format '{format}'. Supported formats: html, pdf, png, jpeg.")]
    UnsupportedFormat { format: String },

    /// The caller asked for nothing.
    #[error("No export format requested. Supported formats: html, pdf, png, jpeg.")]
    NoFormats,

    /// Input file was not found at the given path.
    #[error("Markdown file not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    // ── Dependency errors ─────────────────────────────────────────────────
    /// No browser binary could be located or launched.
    #[error(
        "Chrome or Chromium is required for pdf/png/jpeg export but is not available: {detail}\n\n\
Set MD2PDF_CHROME_PATH=/path/to/chrome or pass --executable-path to use an existing browser.\n"
    )]
    RendererUnavailable { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Aggregate outcomes ────────────────────────────────────────────────
    /// Every requested job failed.
    #[error("All {total} export jobs failed.\nFirst error: {first_error}")]
    AllJobsFailed { total: usize, first_error: String },

    /// Some jobs succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::ExportReport::into_result`] when the
    /// caller wants to treat any job failure as an error.
    #[error("{failed}/{total} export jobs failed")]
    PartialFailure {
        success: usize,
        failed: usize,
        total: usize,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which branch of the error taxonomy a [`JobError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid settings for this job (e.g. missing output directory).
    Configuration,
    /// File-system failure reading the source or writing output.
    Io,
    /// The markdown layer or the browser failed.
    Rendering,
}

/// A non-fatal error for a single export job.
///
/// Stored alongside [`crate::output::JobResult`] when a job fails. Other jobs
/// of the same invocation continue.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum JobError {
    /// Absolute output-directory override names a directory that does not exist.
    #[error("The configured output directory does not exist: '{path}'\nCreate it or change --output-dir.")]
    OutputDirMissing { path: PathBuf },

    /// Source markdown disappeared between invocation start and this job.
    #[error("Markdown file not found: '{path}'")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the source.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Any other read failure (including invalid UTF-8).
    #[error("Failed to read '{path}': {detail}")]
    ReadFailed { path: PathBuf, detail: String },

    /// A custom template file could not be read.
    #[error("Failed to read HTML template '{path}': {detail}")]
    TemplateUnreadable { path: PathBuf, detail: String },

    /// `:[alt](file)` names a file that does not exist.
    #[error("Included file not found: '{path}' (included from '{from}')")]
    IncludeNotFound { path: PathBuf, from: PathBuf },

    /// Includes form a cycle.
    #[error("Circular include of '{path}'")]
    IncludeCycle { path: PathBuf },

    /// The headless browser failed to load or export the page.
    #[error("Browser export failed: {detail}")]
    EngineFailed { detail: String },

    /// Could not write the output or intermediate file.
    #[error("Failed to write '{path}': {detail}")]
    WriteFailed { path: PathBuf, detail: String },

    /// Unexpected internal error (e.g. a panicked blocking task).
    #[error("Internal error: {detail}")]
    Internal { detail: String },
}

impl JobError {
    /// Classify this error into the configuration / I/O / rendering taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            JobError::OutputDirMissing { .. } => ErrorCategory::Configuration,
            JobError::SourceNotFound { .. }
            | JobError::PermissionDenied { .. }
            | JobError::ReadFailed { .. }
            | JobError::TemplateUnreadable { .. }
            | JobError::WriteFailed { .. } => ErrorCategory::Io,
            JobError::IncludeNotFound { .. }
            | JobError::IncludeCycle { .. }
            | JobError::EngineFailed { .. }
            | JobError::Internal { .. } => ErrorCategory::Rendering,
        }
    }

    pub(crate) fn write_failed(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        JobError::WriteFailed {
            path: path.into(),
            detail: source.to_string(),
        }
    }
}
