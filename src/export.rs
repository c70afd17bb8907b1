//! Export driver: one markdown source, one job per requested format.
//!
//! Jobs run one after another. Each job rebuilds the page from the source
//! (the HTML differs between formats: portable references for `html`,
//! `file:` URIs for the browser) and either writes it directly or hands it
//! to the [`RenderEngine`]. A failing job is recorded in its
//! [`JobResult`] and the next job still runs.

use crate::config::{ExportConfig, ExportFormat};
use crate::error::{JobError, Md2PdfError};
use crate::output::{ExportReport, JobResult};
use crate::pipeline::assemble::{self, TemplateView};
use crate::pipeline::directives::{self, DirectiveOptions};
use crate::pipeline::markup::{MarkdownRenderer, MarkupOptions};
use crate::pipeline::render::{self, ChromeEngine, RenderEngine, RenderRequest};
use crate::pipeline::resources::{self, ReferenceMode};
use crate::pipeline::{destination, source};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Export a markdown file to every format in `config.formats`.
///
/// # Returns
/// `Ok(ExportReport)` once every job has been attempted, even if some
/// failed (check `report.stats.failed`, or call
/// [`ExportReport::into_result`]).
///
/// # Errors
/// Returns `Err(Md2PdfError)` only when no job can run:
/// - the source file does not exist
/// - no format was requested
/// - a PDF/PNG/JPEG export was requested and no browser is available
pub async fn export(
    input: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<ExportReport, Md2PdfError> {
    let total_start = Instant::now();
    let source = absolute_source(input.as_ref())?;
    info!("Starting export: {}", source.display());

    if config.formats.is_empty() {
        return Err(Md2PdfError::NoFormats);
    }

    // ── Browser capability ───────────────────────────────────────────────
    let engine = if config.needs_browser() {
        let engine = locate_engine(config)
            .map_err(|detail| Md2PdfError::RendererUnavailable { detail })?;
        info!("Using render engine '{}'", engine.name());
        Some(engine)
    } else {
        debug!("HTML-only export, browser not needed");
        None
    };

    // Header/footer dates are the same for every job.
    let now = Utc::now();
    let total_jobs = config.formats.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_export_start(total_jobs);
    }

    let mut jobs = Vec::with_capacity(total_jobs);
    for (i, &format) in config.formats.iter().enumerate() {
        if let Some(ref cb) = config.progress_callback {
            cb.on_job_start(format, i + 1, total_jobs);
        }

        let result = run_job(&source, format, config, engine.as_ref(), now).await;

        if let Some(ref cb) = config.progress_callback {
            match (&result.error, &result.output_path) {
                (None, Some(path)) => cb.on_job_complete(format, path, result.bytes_written),
                (Some(e), _) => cb.on_job_error(format, &e.to_string()),
                (None, None) => {}
            }
        }
        jobs.push(result);
    }

    let report = ExportReport::new(source, jobs, total_start.elapsed().as_millis() as u64);
    info!(
        "Export complete: {}/{} jobs, {}ms total",
        report.stats.succeeded, report.stats.total_jobs, report.stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_export_complete(total_jobs, report.stats.succeeded);
    }

    Ok(report)
}

/// Synchronous wrapper around [`export`].
///
/// Creates a temporary tokio runtime internally.
pub fn export_sync(
    input: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<ExportReport, Md2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Md2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(export(input, config))
}

/// Build the standalone HTML page for `input` without writing anything.
///
/// References are kept portable, as for `html` exports.
pub async fn render_html(
    input: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<String, Md2PdfError> {
    let source = absolute_source(input.as_ref())?;
    build_page(&source, ExportFormat::Html, config)
        .await
        .map_err(|e| Md2PdfError::Internal(e.to_string()))
}

/// Parse user-supplied format names, rejecting the whole list on the first
/// unknown name. Duplicates are dropped, order is kept.
///
/// ```rust
/// use edgequake_md2pdf::{parse_formats, ExportFormat};
///
/// let formats = parse_formats(&["PDF", "jpg", "pdf"]).unwrap();
/// assert_eq!(formats, vec![ExportFormat::Pdf, ExportFormat::Jpeg]);
/// assert!(parse_formats(&["docx"]).is_err());
/// ```
pub fn parse_formats(names: &[impl AsRef<str>]) -> Result<Vec<ExportFormat>, Md2PdfError> {
    let mut formats = Vec::with_capacity(names.len());
    for name in names {
        let format: ExportFormat = name.as_ref().parse()?;
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    if formats.is_empty() {
        return Err(Md2PdfError::NoFormats);
    }
    Ok(formats)
}

/// The engine PDF/PNG/JPEG jobs would use, if one is available.
///
/// Order: `config.engine`, then a Chrome located through
/// `config.executable_path`, `MD2PDF_CHROME_PATH`, `PATH` and the usual
/// install locations.
pub fn resolve_engine(config: &ExportConfig) -> Option<Arc<dyn RenderEngine>> {
    locate_engine(config)
        .map_err(|reason| debug!("No render engine: {reason}"))
        .ok()
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn locate_engine(config: &ExportConfig) -> Result<Arc<dyn RenderEngine>, String> {
    if let Some(ref engine) = config.engine {
        return Ok(Arc::clone(engine));
    }
    let executable =
        chrome_auto::locate_chrome(config.executable_path.as_deref()).map_err(|e| e.to_string())?;
    debug!("Located browser at {}", executable.display());
    let idle = config
        .render_timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(render::UNBOUNDED_TIMEOUT);
    Ok(Arc::new(
        ChromeEngine::new(executable, config.browser_lang.as_str()).with_idle_timeout(idle),
    ))
}

fn absolute_source(input: &Path) -> Result<PathBuf, Md2PdfError> {
    let path = std::path::absolute(input)
        .map_err(|e| Md2PdfError::Internal(format!("Cannot resolve '{}': {e}", input.display())))?;
    if !path.is_file() {
        return Err(Md2PdfError::SourceNotFound { path });
    }
    Ok(path)
}

/// Run one export job, containing its failure.
async fn run_job(
    source: &Path,
    format: ExportFormat,
    config: &ExportConfig,
    engine: Option<&Arc<dyn RenderEngine>>,
    now: DateTime<Utc>,
) -> JobResult {
    let start = Instant::now();
    info!("Exporting {} → {}", source.display(), format);

    let output_path =
        destination::resolve_output_path(source, format, config.output_dir.as_deref()).await;
    let outcome = match &output_path {
        Ok(path) => export_to(source, path, format, config, engine, now).await,
        Err(e) => Err(e.clone()),
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(bytes_written) => {
            let path = output_path.ok();
            if let Some(ref p) = path {
                info!("Wrote {} ({} bytes, {}ms)", p.display(), bytes_written, duration_ms);
            }
            JobResult {
                format,
                output_path: path,
                error: None,
                bytes_written,
                duration_ms,
            }
        }
        Err(error) => {
            warn!("{} export failed: {}", format, error);
            JobResult {
                format,
                output_path: output_path.ok(),
                error: Some(error),
                bytes_written: 0,
                duration_ms,
            }
        }
    }
}

async fn export_to(
    source: &Path,
    output: &Path,
    format: ExportFormat,
    config: &ExportConfig,
    engine: Option<&Arc<dyn RenderEngine>>,
    now: DateTime<Utc>,
) -> Result<u64, JobError> {
    let page = build_page(source, format, config).await?;

    if !format.is_raster() {
        return write_atomic(output, page.as_bytes()).await;
    }

    let engine = engine.ok_or_else(|| JobError::Internal {
        detail: format!("no render engine for {format}"),
    })?;

    // The page must sit next to the source so relative resources resolve.
    let dir = source.parent().unwrap_or_else(|| Path::new("."));
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = tempfile::Builder::new()
        .prefix(&format!("{stem}_"))
        .suffix("_tmp.html")
        .tempfile_in(dir)
        .map_err(|e| JobError::write_failed(dir, &e))?;
    tokio::fs::write(tmp.path(), page.as_bytes())
        .await
        .map_err(|e| JobError::write_failed(tmp.path(), &e))?;
    debug!("Intermediate page: {}", tmp.path().display());

    let mut pdf = config.pdf.clone();
    pdf.header_template = assemble::transform_template(&pdf.header_template, now);
    pdf.footer_template = assemble::transform_template(&pdf.footer_template, now);

    let request = RenderRequest {
        html_path: tmp.path().to_path_buf(),
        format,
        pdf,
        screenshot: config.screenshot.clone(),
        timeout: config.render_timeout_secs.map(Duration::from_secs),
    };
    let bytes = render::render_document(engine, request).await?;

    // `tmp` is removed on drop, whichever way this function returns.
    write_atomic(output, &bytes).await
}

/// Source → standalone HTML page for `format`.
async fn build_page(
    source: &Path,
    format: ExportFormat,
    config: &ExportConfig,
) -> Result<String, JobError> {
    let doc = source::load_document(source).await?;
    let fm = &doc.front_matter;

    // Includes read files recursively; keep that off the async workers.
    let (text, path) = (doc.body.clone(), doc.path.clone());
    let server = config.plantuml_server.clone();
    let open = fm.str_or("plantumlOpenMarker", &config.plantuml_open_marker).to_string();
    let close = fm.str_or("plantumlCloseMarker", &config.plantuml_close_marker).to_string();
    let body = tokio::task::spawn_blocking(move || {
        directives::apply(
            &text,
            &path,
            &DirectiveOptions {
                plantuml_server: &server,
                plantuml_open_marker: &open,
                plantuml_close_marker: &close,
            },
        )
    })
    .await
    .map_err(|e| JobError::Internal {
        detail: format!("Directive task panicked: {e}"),
    })??;

    let fragment = MarkdownRenderer::new(MarkupOptions {
        breaks: fm.bool_or("breaks", config.breaks),
        emoji: fm.bool_or("emoji", config.emoji),
        highlight: config.highlight,
    })
    .render(&body)?;

    let mode = if format.is_raster() && config.convert_resource_paths {
        ReferenceMode::FileUri { doc_dir: doc.dir() }
    } else {
        ReferenceMode::Portable
    };
    let content = resources::rewrite_html(&fragment, mode);

    let style = assemble::read_styles(config, doc.dir()).await;
    let template = assemble::load_template(config).await?;
    let title = doc.title();
    let mermaid = assemble::mermaid_script(&config.mermaid_server);

    Ok(assemble::fill_template(
        &template,
        &TemplateView {
            title: &title,
            style: &style,
            content: &content,
            mermaid: &mermaid,
        },
    ))
}

/// Atomic write: write to a `.tmp` sibling, then rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<u64, JobError> {
    let ext = path
        .extension()
        .map(|e| format!("{}.tmp", e.to_string_lossy()))
        .unwrap_or_else(|| "tmp".to_string());
    let tmp_path = path.with_extension(ext);

    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| JobError::write_failed(path, &e))?;

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(JobError::write_failed(path, &e));
    }
    Ok(bytes.len() as u64)
}
