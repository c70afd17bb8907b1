//! Page rendering: assembled HTML file → PDF / PNG / JPEG bytes.
//!
//! ## Why a trait?
//!
//! The browser is the only collaborator that cannot run in a unit test.
//! [`RenderEngine`] is the seam: [`ChromeEngine`] drives a real headless
//! Chrome through `headless_chrome`, and tests inject a fake through
//! [`crate::config::ExportConfigBuilder::engine`].
//!
//! ## Why spawn_blocking?
//!
//! `headless_chrome` speaks CDP over a blocking websocket and waits on
//! condition variables. [`render_document`] moves each call onto tokio's
//! blocking pool so the runtime's worker threads never stall.

use crate::config::{css_length_to_inches, ExportFormat, PdfOptions, ScreenshotOptions};
use crate::error::JobError;
use chrome_auto::LaunchSettings;
use headless_chrome::protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport};
use headless_chrome::types::{Bounds, PrintToPdfOptions};
use headless_chrome::Tab;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Stand-in for "no timeout": CDP calls need a finite deadline.
pub const UNBOUNDED_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24);

/// One browser export.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Assembled HTML on disk. Relative resources resolve against its directory.
    pub html_path: PathBuf,
    /// `Pdf`, `Png` or `Jpeg`.
    pub format: ExportFormat,
    /// Header/footer date placeholders already substituted.
    pub pdf: PdfOptions,
    pub screenshot: ScreenshotOptions,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Something that can turn an HTML file into PDF or image bytes.
///
/// Implementations are called from a blocking thread.
pub trait RenderEngine: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str {
        "engine"
    }

    fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, JobError>;
}

/// Run `engine` on tokio's blocking pool.
pub async fn render_document(
    engine: &Arc<dyn RenderEngine>,
    request: RenderRequest,
) -> Result<Vec<u8>, JobError> {
    let engine = Arc::clone(engine);
    tokio::task::spawn_blocking(move || engine.render(&request))
        .await
        .map_err(|e| JobError::Internal {
            detail: format!("Render task panicked: {e}"),
        })?
}

// ── Chrome ───────────────────────────────────────────────────────────────

/// Headless Chrome/Chromium engine. Launches a fresh browser per export.
#[derive(Debug, Clone)]
pub struct ChromeEngine {
    executable: PathBuf,
    settings: LaunchSettings,
}

impl ChromeEngine {
    pub fn new(executable: impl Into<PathBuf>, lang: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            settings: LaunchSettings {
                lang: lang.into(),
                ..LaunchSettings::default()
            },
        }
    }

    /// Browser idle timeout; should cover the longest expected export.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.settings.idle_timeout = timeout;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

fn engine_failed<E: Display>(step: &'static str) -> impl FnOnce(E) -> JobError {
    move |e| JobError::EngineFailed {
        detail: format!("{step}: {e:#}"),
    }
}

impl RenderEngine for ChromeEngine {
    fn name(&self) -> &str {
        "chrome"
    }

    fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, JobError> {
        let browser = chrome_auto::launch_from_path(&self.executable, &self.settings)
            .map_err(engine_failed("launch"))?;
        let tab = browser.new_tab().map_err(engine_failed("open tab"))?;
        tab.set_default_timeout(request.timeout.unwrap_or(UNBOUNDED_TIMEOUT));

        let url = file_url(&request.html_path);
        debug!("Loading {url}");
        tab.navigate_to(&url).map_err(engine_failed("navigate"))?;
        tab.wait_until_navigated()
            .map_err(engine_failed("page load"))?;

        let bytes = match request.format {
            ExportFormat::Pdf => tab
                .print_to_pdf(Some(print_options(&request.pdf)))
                .map_err(engine_failed("print to PDF"))?,
            ExportFormat::Png | ExportFormat::Jpeg => {
                capture(&tab, request.format, &request.screenshot)?
            }
            ExportFormat::Html => {
                return Err(JobError::Internal {
                    detail: "HTML export does not use the browser".into(),
                })
            }
        };
        info!(
            "{} produced {} bytes of {}",
            self.name(),
            bytes.len(),
            request.format
        );
        Ok(bytes)
    }
}

/// Map [`PdfOptions`] onto Chrome's print parameters.
pub fn print_options(pdf: &PdfOptions) -> PrintToPdfOptions {
    let (width, height) = pdf.paper_size_inches();
    let page_ranges = pdf.page_ranges.trim();
    PrintToPdfOptions {
        landscape: Some(pdf.landscape),
        display_header_footer: Some(pdf.display_header_footer),
        print_background: Some(pdf.print_background),
        scale: Some(pdf.scale),
        paper_width: Some(width),
        paper_height: Some(height),
        margin_top: css_length_to_inches(&pdf.margin.top),
        margin_bottom: css_length_to_inches(&pdf.margin.bottom),
        margin_left: css_length_to_inches(&pdf.margin.left),
        margin_right: css_length_to_inches(&pdf.margin.right),
        page_ranges: (!page_ranges.is_empty()).then(|| page_ranges.to_string()),
        header_template: Some(pdf.header_template.clone()),
        footer_template: Some(pdf.footer_template.clone()),
        ..Default::default()
    }
}

fn capture(
    tab: &Arc<Tab>,
    format: ExportFormat,
    options: &ScreenshotOptions,
) -> Result<Vec<u8>, JobError> {
    let (cdp_format, quality) = match format {
        ExportFormat::Jpeg => (CaptureScreenshotFormatOption::Jpeg, Some(options.quality)),
        _ => (CaptureScreenshotFormatOption::Png, None),
    };

    let viewport = match options.clip {
        Some(clip) => Viewport {
            x: clip.x,
            y: clip.y,
            width: clip.width,
            height: clip.height,
            scale: 1.0,
        },
        None => {
            let width = page_dimension(tab, "scrollWidth")?;
            let height = page_dimension(tab, "scrollHeight")?;
            // Grow the window so content below the fold is laid out.
            if let Err(e) = tab.set_bounds(Bounds::Normal {
                left: None,
                top: None,
                width: Some(width),
                height: Some(height),
            }) {
                debug!("Could not resize window for full-page capture: {e:#}");
            }
            Viewport {
                x: 0.0,
                y: 0.0,
                width,
                height,
                scale: 1.0,
            }
        }
    };

    tab.capture_screenshot(cdp_format, quality, Some(viewport), true)
        .map_err(engine_failed("screenshot"))
}

fn page_dimension(tab: &Arc<Tab>, property: &str) -> Result<f64, JobError> {
    let expr = format!(
        "Math.max(document.documentElement.{property}, document.body ? document.body.{property} : 0)"
    );
    let value = tab
        .evaluate(&expr, false)
        .map_err(engine_failed("measure page"))?
        .value
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    Ok(value.max(1.0))
}

/// Path bytes escaped in a `file://` URL.
const PATH_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// `file://` URL for a local path.
pub fn file_url(path: &Path) -> String {
    let p = path.to_string_lossy().replace('\\', "/");
    let encoded = utf8_percent_encode(&p, PATH_ESCAPE).to_string();
    if encoded.starts_with('/') {
        format!("file://{encoded}")
    } else {
        format!("file:///{encoded}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClipRegion, PaperFormat};

    #[test]
    fn file_urls() {
        assert_eq!(file_url(Path::new("/tmp/a.html")), "file:///tmp/a.html");
        assert_eq!(
            file_url(Path::new("/tmp/my doc#1.html")),
            "file:///tmp/my%20doc%231.html"
        );
    }

    #[test]
    fn print_options_defaults() {
        let o = print_options(&PdfOptions::default());
        assert_eq!(o.paper_width, Some(8.27));
        assert_eq!(o.paper_height, Some(11.7));
        assert_eq!(o.landscape, Some(false));
        assert_eq!(o.display_header_footer, Some(true));
        assert_eq!(o.print_background, Some(true));
        assert!(o.page_ranges.is_none());
        let top = o.margin_top.unwrap();
        assert!((top - 1.5 / 2.54).abs() < 1e-9);
    }

    #[test]
    fn print_options_overrides() {
        let pdf = PdfOptions {
            format: PaperFormat::Letter,
            landscape: true,
            page_ranges: "1-2".into(),
            ..PdfOptions::default()
        };
        let o = print_options(&pdf);
        assert_eq!(o.paper_width, Some(8.5));
        assert_eq!(o.landscape, Some(true));
        assert_eq!(o.page_ranges.as_deref(), Some("1-2"));
    }

    struct EchoEngine;

    impl RenderEngine for EchoEngine {
        fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, JobError> {
            Ok(request.format.extension().as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn render_document_runs_engine() {
        let engine: Arc<dyn RenderEngine> = Arc::new(EchoEngine);
        let req = RenderRequest {
            html_path: "/tmp/x.html".into(),
            format: ExportFormat::Png,
            pdf: PdfOptions::default(),
            screenshot: ScreenshotOptions {
                quality: 100,
                clip: Some(ClipRegion {
                    x: 0.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                }),
            },
            timeout: None,
        };
        assert_eq!(render_document(&engine, req).await.unwrap(), b"png");
        assert_eq!(engine.name(), "engine");
    }
}
