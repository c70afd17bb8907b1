//! Configuration types for markdown export.
//!
//! Every export knob lives in [`ExportConfig`], built via its
//! [`ExportConfigBuilder`]. Defaults mirror the settings a fresh install of
//! the exporter ships with: PDF output next to the source, A4 paper, header
//! with title and date, footer with page numbers, highlighted code blocks.

use crate::error::Md2PdfError;
use crate::pipeline::directives::{marker_or, DEFAULT_CLOSE_MARKER, DEFAULT_OPEN_MARKER};
use crate::pipeline::render::RenderEngine;
use crate::progress::ExportProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for a markdown export.
///
/// Built via [`ExportConfig::builder()`] or using [`ExportConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_md2pdf::{ExportConfig, ExportFormat};
///
/// let config = ExportConfig::builder()
///     .formats(vec![ExportFormat::Pdf, ExportFormat::Png])
///     .output_dir("~/exports")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExportConfig {
    /// Formats to produce, in order. One export job per entry. Default: `[Pdf]`.
    pub formats: Vec<ExportFormat>,

    /// Destination directory override. `None` or empty writes next to the source.
    ///
    /// A leading `~` is expanded to the home directory and created on demand.
    /// Any other value must name an existing directory.
    pub output_dir: Option<String>,

    /// Extra stylesheet files, appended after the base stylesheet. Relative
    /// paths resolve against the source document's directory.
    pub stylesheets: Vec<PathBuf>,

    /// Include the bundled `markdown.css` and `markdown-pdf.css`. Default: true.
    pub include_default_styles: bool,

    /// Syntax-highlight fenced code blocks. Default: true.
    pub highlight: bool,

    /// CSS file replacing the built-in `tomorrow` highlight theme.
    pub highlight_style: Option<PathBuf>,

    /// HTML template replacing the built-in one.
    pub template: Option<PathBuf>,

    /// Default for the `breaks` front-matter key. Default: false.
    pub breaks: bool,

    /// Default for the `emoji` front-matter key. Default: true.
    pub emoji: bool,

    /// Mermaid script URL. Empty disables the script tag.
    pub mermaid_server: String,

    /// PlantUML server URL. Empty disables the diagram directive.
    pub plantuml_server: String,

    /// Default PlantUML open marker, overridable by front-matter.
    pub plantuml_open_marker: String,

    /// Default PlantUML close marker, overridable by front-matter.
    pub plantuml_close_marker: String,

    /// `file:` URI rewriting for PDF/PNG/JPEG. Default: true.
    ///
    /// HTML output keeps references portable regardless of this flag.
    pub convert_resource_paths: bool,

    /// PDF page options.
    pub pdf: PdfOptions,

    /// PNG/JPEG capture options.
    pub screenshot: ScreenshotOptions,

    /// Explicit Chrome/Chromium binary. Falls back to `MD2PDF_CHROME_PATH`,
    /// then `PATH`, then well-known install locations.
    pub executable_path: Option<PathBuf>,

    /// Browser UI language passed as `--lang`. Default: `en`.
    pub browser_lang: String,

    /// Per-job page load and export timeout. `None` waits indefinitely.
    pub render_timeout_secs: Option<u64>,

    /// Pre-constructed rendering engine. Takes precedence over browser discovery.
    pub engine: Option<Arc<dyn RenderEngine>>,

    /// Receives per-job progress events. `None` disables them.
    pub progress_callback: Option<Arc<dyn ExportProgressCallback>>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            formats: vec![ExportFormat::Pdf],
            output_dir: None,
            stylesheets: Vec::new(),
            include_default_styles: true,
            highlight: true,
            highlight_style: None,
            template: None,
            breaks: false,
            emoji: true,
            mermaid_server: DEFAULT_MERMAID_SERVER.to_string(),
            plantuml_server: DEFAULT_PLANTUML_SERVER.to_string(),
            plantuml_open_marker: DEFAULT_OPEN_MARKER.to_string(),
            plantuml_close_marker: DEFAULT_CLOSE_MARKER.to_string(),
            convert_resource_paths: true,
            pdf: PdfOptions::default(),
            screenshot: ScreenshotOptions::default(),
            executable_path: None,
            browser_lang: "en".to_string(),
            render_timeout_secs: None,
            engine: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfig")
            .field("formats", &self.formats)
            .field("output_dir", &self.output_dir)
            .field("stylesheets", &self.stylesheets)
            .field("include_default_styles", &self.include_default_styles)
            .field("highlight", &self.highlight)
            .field("highlight_style", &self.highlight_style)
            .field("template", &self.template)
            .field("breaks", &self.breaks)
            .field("emoji", &self.emoji)
            .field("mermaid_server", &self.mermaid_server)
            .field("plantuml_server", &self.plantuml_server)
            .field("pdf", &self.pdf)
            .field("screenshot", &self.screenshot)
            .field("executable_path", &self.executable_path)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("engine", &self.engine.as_ref().map(|_| "<dyn RenderEngine>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExportProgressCallback>"),
            )
            .finish()
    }
}

impl ExportConfig {
    /// Create a new builder for `ExportConfig`.
    pub fn builder() -> ExportConfigBuilder {
        ExportConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when at least one requested format needs the browser.
    pub fn needs_browser(&self) -> bool {
        self.formats.iter().any(|f| f.is_raster())
    }
}

/// Default mermaid script location.
pub const DEFAULT_MERMAID_SERVER: &str = "https://unpkg.com/mermaid/dist/mermaid.min.js";

/// Default PlantUML rendering server.
pub const DEFAULT_PLANTUML_SERVER: &str = "http://www.plantuml.com/plantuml";

/// Builder for [`ExportConfig`].
#[derive(Debug)]
pub struct ExportConfigBuilder {
    config: ExportConfig,
}

impl ExportConfigBuilder {
    pub fn formats(mut self, formats: Vec<ExportFormat>) -> Self {
        self.config.formats = formats;
        self
    }

    pub fn format(mut self, format: ExportFormat) -> Self {
        self.config.formats = vec![format];
        self
    }

    pub fn output_dir(mut self, dir: impl Into<String>) -> Self {
        let dir = dir.into();
        self.config.output_dir = if dir.trim().is_empty() {
            None
        } else {
            Some(dir)
        };
        self
    }

    pub fn stylesheet(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.stylesheets.push(path.into());
        self
    }

    pub fn stylesheets(mut self, paths: Vec<PathBuf>) -> Self {
        self.config.stylesheets = paths;
        self
    }

    pub fn include_default_styles(mut self, v: bool) -> Self {
        self.config.include_default_styles = v;
        self
    }

    pub fn highlight(mut self, v: bool) -> Self {
        self.config.highlight = v;
        self
    }

    pub fn highlight_style(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.highlight_style = Some(path.into());
        self
    }

    pub fn template(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template = Some(path.into());
        self
    }

    pub fn breaks(mut self, v: bool) -> Self {
        self.config.breaks = v;
        self
    }

    pub fn emoji(mut self, v: bool) -> Self {
        self.config.emoji = v;
        self
    }

    pub fn mermaid_server(mut self, url: impl Into<String>) -> Self {
        self.config.mermaid_server = url.into();
        self
    }

    pub fn plantuml_server(mut self, url: impl Into<String>) -> Self {
        self.config.plantuml_server = url.into();
        self
    }

    /// Lines that open and close a PlantUML block. Blank means the default.
    pub fn plantuml_markers(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.config.plantuml_open_marker = open.into();
        self.config.plantuml_close_marker = close.into();
        self
    }

    pub fn convert_resource_paths(mut self, v: bool) -> Self {
        self.config.convert_resource_paths = v;
        self
    }

    pub fn pdf(mut self, pdf: PdfOptions) -> Self {
        self.config.pdf = pdf;
        self
    }

    pub fn paper_format(mut self, format: PaperFormat) -> Self {
        self.config.pdf.format = format;
        self
    }

    pub fn landscape(mut self, v: bool) -> Self {
        self.config.pdf.landscape = v;
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.config.pdf.scale = scale.clamp(0.1, 2.0);
        self
    }

    pub fn display_header_footer(mut self, v: bool) -> Self {
        self.config.pdf.display_header_footer = v;
        self
    }

    pub fn header_template(mut self, html: impl Into<String>) -> Self {
        self.config.pdf.header_template = html.into();
        self
    }

    pub fn footer_template(mut self, html: impl Into<String>) -> Self {
        self.config.pdf.footer_template = html.into();
        self
    }

    pub fn page_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.config.pdf.page_ranges = ranges.into();
        self
    }

    pub fn screenshot(mut self, screenshot: ScreenshotOptions) -> Self {
        self.config.screenshot = screenshot;
        self
    }

    pub fn quality(mut self, quality: u32) -> Self {
        self.config.screenshot.quality = quality.min(100);
        self
    }

    pub fn clip(mut self, clip: ClipRegion) -> Self {
        self.config.screenshot.clip = Some(clip);
        self
    }

    pub fn executable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.executable_path = Some(path.into());
        self
    }

    pub fn browser_lang(mut self, lang: impl Into<String>) -> Self {
        self.config.browser_lang = lang.into();
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = Some(secs.max(1));
        self
    }

    pub fn engine(mut self, engine: Arc<dyn RenderEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn ExportProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<ExportConfig, Md2PdfError> {
        let c = &mut self.config;
        c.plantuml_open_marker = marker_or(&c.plantuml_open_marker, DEFAULT_OPEN_MARKER).into();
        c.plantuml_close_marker = marker_or(&c.plantuml_close_marker, DEFAULT_CLOSE_MARKER).into();

        let c = &self.config;
        if c.formats.is_empty() {
            return Err(Md2PdfError::NoFormats);
        }
        if !(0.1..=2.0).contains(&c.pdf.scale) {
            return Err(Md2PdfError::InvalidConfig(format!(
                "scale must be 0.1–2.0, got {}",
                c.pdf.scale
            )));
        }
        if c.screenshot.quality > 100 {
            return Err(Md2PdfError::InvalidConfig(format!(
                "quality must be 0–100, got {}",
                c.screenshot.quality
            )));
        }
        for (name, value) in [
            ("width", c.pdf.width.as_deref()),
            ("height", c.pdf.height.as_deref()),
            ("margin.top", Some(c.pdf.margin.top.as_str())),
            ("margin.right", Some(c.pdf.margin.right.as_str())),
            ("margin.bottom", Some(c.pdf.margin.bottom.as_str())),
            ("margin.left", Some(c.pdf.margin.left.as_str())),
        ] {
            if let Some(v) = value {
                if !v.trim().is_empty() && css_length_to_inches(v).is_none() {
                    return Err(Md2PdfError::InvalidConfig(format!(
                        "{name} is not a CSS length (px, in, cm, mm): '{v}'"
                    )));
                }
            }
        }
        if let Some(clip) = &c.screenshot.clip {
            if clip.width <= 0.0 || clip.height <= 0.0 {
                return Err(Md2PdfError::InvalidConfig(
                    "clip width and height must be > 0".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Output document format.
///
/// | Format | Produced by |
/// |--------|-------------|
/// | `html` | written directly, no browser |
/// | `pdf`  | browser print-to-PDF |
/// | `png`  | browser screenshot |
/// | `jpeg` | browser screenshot (accepts `jpg`) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Html,
    Pdf,
    Png,
    Jpeg,
}

impl ExportFormat {
    /// Every format, in the order `--all` exports them.
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Html,
        ExportFormat::Pdf,
        ExportFormat::Png,
        ExportFormat::Jpeg,
    ];

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Html => "html",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpeg",
        }
    }

    /// True for formats that go through the headless browser.
    pub fn is_raster(self) -> bool {
        !matches!(self, ExportFormat::Html)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = Md2PdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(ExportFormat::Html),
            "pdf" => Ok(ExportFormat::Pdf),
            "png" => Ok(ExportFormat::Png),
            "jpeg" | "jpg" => Ok(ExportFormat::Jpeg),
            _ => Err(Md2PdfError::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

/// Named paper sizes understood by the PDF exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperFormat {
    Letter,
    Legal,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    #[default]
    A4,
    A5,
    A6,
}

impl PaperFormat {
    /// Portrait `(width, height)` in inches.
    pub fn size_inches(self) -> (f64, f64) {
        match self {
            PaperFormat::Letter => (8.5, 11.0),
            PaperFormat::Legal => (8.5, 14.0),
            PaperFormat::Tabloid => (11.0, 17.0),
            PaperFormat::Ledger => (17.0, 11.0),
            PaperFormat::A0 => (33.1, 46.8),
            PaperFormat::A1 => (23.4, 33.1),
            PaperFormat::A2 => (16.54, 23.4),
            PaperFormat::A3 => (11.7, 16.54),
            PaperFormat::A4 => (8.27, 11.7),
            PaperFormat::A5 => (5.83, 8.27),
            PaperFormat::A6 => (4.13, 5.83),
        }
    }
}

impl FromStr for PaperFormat {
    type Err = Md2PdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s.trim().to_ascii_lowercase().as_str() {
            "letter" => PaperFormat::Letter,
            "legal" => PaperFormat::Legal,
            "tabloid" => PaperFormat::Tabloid,
            "ledger" => PaperFormat::Ledger,
            "a0" => PaperFormat::A0,
            "a1" => PaperFormat::A1,
            "a2" => PaperFormat::A2,
            "a3" => PaperFormat::A3,
            "a4" => PaperFormat::A4,
            "a5" => PaperFormat::A5,
            "a6" => PaperFormat::A6,
            other => {
                return Err(Md2PdfError::InvalidConfig(format!(
                    "unknown paper format '{other}'"
                )))
            }
        };
        Ok(format)
    }
}

// ── PDF / screenshot options ─────────────────────────────────────────────

/// Page margins as CSS lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: "1.5cm".into(),
            right: "1cm".into(),
            bottom: "1cm".into(),
            left: "1cm".into(),
        }
    }
}

/// Options for PDF output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfOptions {
    /// Paper size, ignored when `width` or `height` is set.
    pub format: PaperFormat,
    pub width: Option<String>,
    pub height: Option<String>,
    pub landscape: bool,
    /// Rendering scale, 0.1–2.0.
    pub scale: f64,
    pub display_header_footer: bool,
    /// Header HTML. Supports `%%ISO-DATETIME%%`, `%%ISO-DATE%%`, `%%ISO-TIME%%`
    /// plus Chrome's own `title`, `pageNumber` and `totalPages` classes.
    pub header_template: String,
    pub footer_template: String,
    pub print_background: bool,
    /// e.g. `1-5, 8`. Empty prints every page.
    pub page_ranges: String,
    pub margin: Margins,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            format: PaperFormat::A4,
            width: None,
            height: None,
            landscape: false,
            scale: 1.0,
            display_header_footer: true,
            header_template: crate::templates::DEFAULT_HEADER_TEMPLATE.to_string(),
            footer_template: crate::templates::DEFAULT_FOOTER_TEMPLATE.to_string(),
            print_background: true,
            page_ranges: String::new(),
            margin: Margins::default(),
        }
    }
}

impl PdfOptions {
    /// Portrait paper `(width, height)` in inches after applying
    /// `width`/`height` overrides. Chrome rotates the page for `landscape`.
    ///
    /// An explicit dimension overrides the named format; a missing one falls
    /// back to the format's value.
    pub fn paper_size_inches(&self) -> (f64, f64) {
        let (fw, fh) = self.format.size_inches();
        let w = self
            .width
            .as_deref()
            .and_then(css_length_to_inches)
            .unwrap_or(fw);
        let h = self
            .height
            .as_deref()
            .and_then(css_length_to_inches)
            .unwrap_or(fh);
        (w, h)
    }
}

/// Screenshot clip rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Options for PNG/JPEG output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotOptions {
    /// JPEG quality 0–100. Ignored for PNG.
    pub quality: u32,
    /// Capture region. `None` captures the full page.
    pub clip: Option<ClipRegion>,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            quality: 100,
            clip: None,
        }
    }
}

/// Convert a CSS length (`px`, `in`, `cm`, `mm`; unitless = px) to inches.
///
/// Returns `None` for anything else, including negative values.
pub fn css_length_to_inches(value: &str) -> Option<f64> {
    let v = value.trim().to_ascii_lowercase();
    let (number, per_inch) = if let Some(n) = v.strip_suffix("px") {
        (n, 96.0)
    } else if let Some(n) = v.strip_suffix("in") {
        (n, 1.0)
    } else if let Some(n) = v.strip_suffix("cm") {
        (n, 2.54)
    } else if let Some(n) = v.strip_suffix("mm") {
        (n, 25.4)
    } else {
        (v.as_str(), 96.0)
    };
    let n: f64 = number.trim().parse().ok()?;
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    Some(n / per_inch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_settings() {
        let c = ExportConfig::default();
        assert_eq!(c.formats, vec![ExportFormat::Pdf]);
        assert_eq!(c.pdf.format, PaperFormat::A4);
        assert!(c.pdf.display_header_footer);
        assert!(c.pdf.print_background);
        assert_eq!(c.pdf.margin.top, "1.5cm");
        assert_eq!(c.screenshot.quality, 100);
        assert!(c.screenshot.clip.is_none());
        assert!(c.render_timeout_secs.is_none());
        assert!(c.emoji);
        assert!(!c.breaks);
    }

    #[test]
    fn format_parsing_is_case_insensitive() {
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert_eq!("Jpg".parse::<ExportFormat>().unwrap(), ExportFormat::Jpeg);
        assert_eq!(" html ".parse::<ExportFormat>().unwrap(), ExportFormat::Html);
        assert!(matches!(
            "docx".parse::<ExportFormat>(),
            Err(Md2PdfError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn only_html_skips_browser() {
        assert!(!ExportFormat::Html.is_raster());
        assert!(ExportFormat::Pdf.is_raster());
        let c = ExportConfig::builder()
            .format(ExportFormat::Html)
            .build()
            .unwrap();
        assert!(!c.needs_browser());
    }

    #[test]
    fn builder_clamps() {
        let c = ExportConfig::builder()
            .scale(5.0)
            .quality(400)
            .build()
            .unwrap();
        assert_eq!(c.pdf.scale, 2.0);
        assert_eq!(c.screenshot.quality, 100);
    }

    #[test]
    fn empty_output_dir_means_none() {
        let c = ExportConfig::builder().output_dir("  ").build().unwrap();
        assert!(c.output_dir.is_none());
    }

    #[test]
    fn build_rejects_empty_formats() {
        let r = ExportConfig::builder().formats(vec![]).build();
        assert!(matches!(r, Err(Md2PdfError::NoFormats)));
    }

    #[test]
    fn build_rejects_bad_margin() {
        let mut pdf = PdfOptions::default();
        pdf.margin.left = "wide".into();
        let r = ExportConfig::builder().pdf(pdf).build();
        assert!(matches!(r, Err(Md2PdfError::InvalidConfig(_))));
    }

    #[test]
    fn css_lengths() {
        assert_eq!(css_length_to_inches("96px"), Some(1.0));
        assert_eq!(css_length_to_inches("2in"), Some(2.0));
        assert!((css_length_to_inches("2.54cm").unwrap() - 1.0).abs() < 1e-9);
        assert!((css_length_to_inches("25.4mm").unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(css_length_to_inches("192"), Some(2.0));
        assert_eq!(css_length_to_inches("-1cm"), None);
        assert_eq!(css_length_to_inches("1em"), None);
    }

    #[test]
    fn blank_plantuml_markers_use_defaults() {
        let c = ExportConfig::builder()
            .plantuml_markers("", "   ")
            .build()
            .unwrap();
        assert_eq!(c.plantuml_open_marker, "@startuml");
        assert_eq!(c.plantuml_close_marker, "@enduml");

        let c = ExportConfig::builder()
            .plantuml_markers(" ```uml ", "```")
            .build()
            .unwrap();
        assert_eq!(c.plantuml_open_marker, "```uml");
        assert_eq!(c.plantuml_close_marker, "```");
    }

    #[test]
    fn paper_size_overrides() {
        let mut pdf = PdfOptions::default();
        assert_eq!(pdf.paper_size_inches(), (8.27, 11.7));
        pdf.landscape = true;
        assert_eq!(pdf.paper_size_inches(), (8.27, 11.7));
        pdf.width = Some("5in".into());
        assert_eq!(pdf.paper_size_inches(), (5.0, 11.7));
    }

    #[test]
    fn paper_format_from_str() {
        assert_eq!("letter".parse::<PaperFormat>().unwrap(), PaperFormat::Letter);
        assert_eq!("A3".parse::<PaperFormat>().unwrap(), PaperFormat::A3);
        assert!("B5".parse::<PaperFormat>().is_err());
    }
}
