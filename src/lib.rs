//! # edgequake-md2pdf
//!
//! Export Markdown documents to standalone HTML, PDF, PNG and JPEG.
//!
//! ## Why this crate?
//!
//! A markdown file rarely travels alone: it references images next to it,
//! pulls in other files, embeds diagrams and expects a stylesheet. This
//! crate renders it the way an editor preview would (GitHub Flavored
//! Markdown, highlighted code, mermaid and PlantUML diagrams), wraps it in a
//! styled page and, for the print formats, lets headless Chrome lay it out.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Source      read file, split front-matter
//!  ├─ 2. Directives  includes, ::: containers, PlantUML
//!  ├─ 3. Markup      comrak GFM + syntect highlighting + mermaid
//!  ├─ 4. Resources   image src → file: URIs, heading anchors
//!  ├─ 5. Assemble    template + stylesheets
//!  └─ 6. Render      html written directly; pdf/png/jpeg via Chrome
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_md2pdf::{export, ExportConfig, ExportFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExportConfig::builder()
//!         .formats(vec![ExportFormat::Html, ExportFormat::Pdf])
//!         .build()?;
//!     let report = export("README.md", &config).await?;
//!     for path in report.outputs() {
//!         println!("{}", path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-md2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## Browser
//!
//! PDF, PNG and JPEG need Chrome or Chromium. The binary is looked up in
//! `ExportConfig::executable_path`, `MD2PDF_CHROME_PATH`, `PATH` and the
//! usual install locations. HTML export never touches the browser.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod templates;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ClipRegion, ExportConfig, ExportConfigBuilder, ExportFormat, Margins, PaperFormat, PdfOptions,
    ScreenshotOptions,
};
pub use error::{ErrorCategory, JobError, Md2PdfError};
pub use export::{export, export_sync, parse_formats, render_html, resolve_engine};
pub use output::{ExportReport, ExportStats, JobResult};
pub use pipeline::render::{ChromeEngine, RenderEngine, RenderRequest};
pub use progress::{ExportProgressCallback, NoopProgressCallback, ProgressCallback};
