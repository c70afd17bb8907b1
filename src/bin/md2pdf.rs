//! CLI binary for edgequake-md2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExportConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_md2pdf::{
    export, parse_formats, render_html, resolve_engine, ClipRegion, ExportConfig, ExportFormat,
    ExportProgressCallback, ExportReport, Margins, PaperFormat, PdfOptions, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner naming the running job plus one
/// log line per finished job.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Wall-clock start of the running job.
    job_start: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            job_start: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.job_start
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExportProgressCallback for CliProgressCallback {
    fn on_export_start(&self, total_jobs: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Exporting {total_jobs} format(s)…"))
        ));
    }

    fn on_job_start(&self, format: ExportFormat, job_num: usize, total_jobs: usize) {
        if let Ok(mut t) = self.job_start.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_prefix(format!("{job_num}/{total_jobs}"));
        self.bar.set_message(format!("{format}…"));
    }

    fn on_job_complete(&self, format: ExportFormat, output: &Path, bytes: u64) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:<5} {}  {}",
            green("✓"),
            format,
            output.display(),
            dim(&format!("{bytes} bytes, {secs:.1}s")),
        ));
    }

    fn on_job_error(&self, format: ExportFormat, error: &str) {
        let secs = self.elapsed_secs();

        // First line only; the full message is in the summary / logs.
        let first = error.lines().next().unwrap_or(error);
        self.bar.println(format!(
            "  {} {:<5} {}  {}",
            red("✗"),
            format,
            red(first),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_export_complete(&self, total_jobs: usize, success_count: usize) {
        let failed = total_jobs.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} file(s) exported",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} exported  ({} failed)",
                if failed == total_jobs {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_jobs,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # PDF next to the source
  md2pdf README.md

  # Several formats at once
  md2pdf -t html,pdf,png README.md

  # Everything, into ~/exports (created if missing)
  md2pdf --all --output-dir ~/exports README.md

  # Landscape Letter, pages 1-3, no header/footer
  md2pdf --paper Letter --landscape --page-ranges 1-3 --no-header-footer notes.md

  # Custom styling
  md2pdf --stylesheet print.css --highlight-style github.css README.md

  # Assembled HTML on stdout (no browser needed)
  md2pdf --print-html README.md > page.html

  # Is a browser available?
  md2pdf --check-browser README.md

FRONT-MATTER KEYS:
  breaks               soft line breaks become <br />
  emoji                expand :shortcode: emoji (default true)
  plantumlOpenMarker   PlantUML block start (default @startuml)
  plantumlCloseMarker  PlantUML block end (default @enduml)

HEADER / FOOTER PLACEHOLDERS:
  %%ISO-DATETIME%%  %%ISO-DATE%%  %%ISO-TIME%%   (UTC)
  <span class="title|pageNumber|totalPages"></span>   (filled by Chrome)

ENVIRONMENT VARIABLES:
  MD2PDF_CHROME_PATH   Chrome/Chromium executable to use
  MD2PDF_*             Fallback for most flags (see --help)
  RUST_LOG             Override log filter
"#;

/// Export Markdown to HTML, PDF, PNG and JPEG.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Export Markdown to HTML, PDF, PNG and JPEG",
    long_about = "Export a Markdown document to standalone HTML, or to PDF, PNG and JPEG \
through headless Chrome. Supports GitHub Flavored Markdown, highlighted code, mermaid and \
PlantUML diagrams, file includes and custom templates and stylesheets.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown file to export.
    input: PathBuf,

    /// Output formats: html, pdf, png, jpeg (comma separated).
    #[arg(short = 't', long = "type", env = "MD2PDF_TYPE", value_delimiter = ',',
          default_value = "pdf", conflicts_with = "all")]
    types: Vec<String>,

    /// Export every format.
    #[arg(long)]
    all: bool,

    /// Output directory. `~` is expanded and created; other paths must exist.
    #[arg(short, long, env = "MD2PDF_OUTPUT_DIR")]
    output_dir: Option<String>,

    /// Extra stylesheet (repeatable). Relative to the markdown file.
    #[arg(long = "stylesheet", env = "MD2PDF_STYLESHEET", value_delimiter = ',')]
    stylesheets: Vec<PathBuf>,

    /// Do not include the built-in markdown stylesheets.
    #[arg(long, env = "MD2PDF_NO_DEFAULT_STYLES")]
    no_default_styles: bool,

    /// HTML template with {{{title}}}, {{{style}}}, {{{content}}}, {{{mermaid}}}.
    #[arg(long, env = "MD2PDF_TEMPLATE")]
    template: Option<PathBuf>,

    /// CSS file replacing the built-in highlight theme.
    #[arg(long, env = "MD2PDF_HIGHLIGHT_STYLE")]
    highlight_style: Option<PathBuf>,

    /// Disable syntax highlighting.
    #[arg(long, env = "MD2PDF_NO_HIGHLIGHT")]
    no_highlight: bool,

    /// Soft line breaks become <br /> (front-matter `breaks` wins).
    #[arg(long, env = "MD2PDF_BREAKS")]
    breaks: bool,

    /// Leave :shortcode: emoji untouched (front-matter `emoji` wins).
    #[arg(long, env = "MD2PDF_NO_EMOJI")]
    no_emoji: bool,

    /// Mermaid script URL. Empty disables mermaid.
    #[arg(long, env = "MD2PDF_MERMAID_SERVER")]
    mermaid_server: Option<String>,

    /// PlantUML server URL. Empty disables PlantUML.
    #[arg(long, env = "MD2PDF_PLANTUML_SERVER")]
    plantuml_server: Option<String>,

    /// Keep image references as written instead of file: URIs.
    #[arg(long, env = "MD2PDF_NO_CONVERT_PATHS")]
    no_convert_paths: bool,

    // ── PDF ──────────────────────────────────────────────────────────────
    /// Paper format: Letter, Legal, Tabloid, Ledger, A0–A6.
    #[arg(long, env = "MD2PDF_PAPER", default_value = "A4")]
    paper: String,

    /// Paper width (CSS length), overrides --paper.
    #[arg(long, env = "MD2PDF_WIDTH")]
    width: Option<String>,

    /// Paper height (CSS length), overrides --paper.
    #[arg(long, env = "MD2PDF_HEIGHT")]
    height: Option<String>,

    /// Landscape orientation.
    #[arg(long, env = "MD2PDF_LANDSCAPE")]
    landscape: bool,

    /// Rendering scale (0.1–2.0).
    #[arg(long, env = "MD2PDF_SCALE", default_value_t = 1.0)]
    scale: f64,

    /// Omit header and footer.
    #[arg(long, env = "MD2PDF_NO_HEADER_FOOTER")]
    no_header_footer: bool,

    /// Header HTML.
    #[arg(long, env = "MD2PDF_HEADER_TEMPLATE")]
    header_template: Option<String>,

    /// Footer HTML.
    #[arg(long, env = "MD2PDF_FOOTER_TEMPLATE")]
    footer_template: Option<String>,

    /// Do not print background graphics.
    #[arg(long, env = "MD2PDF_NO_BACKGROUND")]
    no_background: bool,

    /// Pages to print, e.g. `1-5, 8`.
    #[arg(long, env = "MD2PDF_PAGE_RANGES", default_value = "")]
    page_ranges: String,

    /// Margins as `top,right,bottom,left` CSS lengths.
    #[arg(long, env = "MD2PDF_MARGIN", default_value = "1.5cm,1cm,1cm,1cm")]
    margin: String,

    // ── Images ───────────────────────────────────────────────────────────
    /// JPEG quality (0–100).
    #[arg(long, env = "MD2PDF_QUALITY", default_value_t = 100,
          value_parser = clap::value_parser!(u32).range(0..=100))]
    quality: u32,

    /// Screenshot clip region `x,y,width,height`. Default: full page.
    #[arg(long, env = "MD2PDF_CLIP")]
    clip: Option<String>,

    // ── Browser ──────────────────────────────────────────────────────────
    /// Chrome/Chromium executable.
    #[arg(long, env = "MD2PDF_CHROME_PATH")]
    executable_path: Option<PathBuf>,

    /// Browser language.
    #[arg(long, env = "MD2PDF_LANG", default_value = "en")]
    lang: String,

    /// Per-job render timeout in seconds. Default: none.
    #[arg(long, env = "MD2PDF_TIMEOUT")]
    timeout: Option<u64>,

    // ── Modes ────────────────────────────────────────────────────────────
    /// Write the assembled HTML to stdout and exit.
    #[arg(long)]
    print_html: bool,

    /// Report whether a browser is available and exit.
    #[arg(long)]
    check_browser: bool,

    /// Print the export report as JSON.
    #[arg(long, env = "MD2PDF_JSON")]
    json: bool,

    /// Disable progress spinner.
    #[arg(long, env = "MD2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs; -v brings them back.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.print_html;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExportProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Check-browser mode ───────────────────────────────────────────────
    if cli.check_browser {
        match resolve_engine(&config) {
            Some(engine) => {
                println!("{} browser available ({})", green("✔"), engine.name());
                return Ok(());
            }
            None => {
                let searched = chrome_auto::candidate_paths(config.executable_path.as_deref())
                    .iter()
                    .map(|p| format!("  {}", p.display()))
                    .collect::<Vec<_>>()
                    .join("\n");
                anyhow::bail!(
                    "No browser available. Searched:\n{searched}\n{}",
                    chrome_auto::INSTALL_HINT
                );
            }
        }
    }

    // ── Print-html mode ──────────────────────────────────────────────────
    if cli.print_html {
        let html = render_html(&cli.input, &config)
            .await
            .context("Failed to render HTML")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(html.as_bytes())
            .context("Failed to write to stdout")?;
        return Ok(());
    }

    // ── Run export ───────────────────────────────────────────────────────
    let report = export(&cli.input, &config)
        .await
        .with_context(|| format!("Export of {} failed", cli.input.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet && !show_progress {
        print_summary(&report);
    }

    for job in report.jobs.iter().filter(|j| !j.is_success()) {
        if let Some(ref e) = job.error {
            eprintln!("{} {}: {}", red("error:"), job.format, e);
        }
    }
    report.into_result().context("Export incomplete")?;

    Ok(())
}

fn print_summary(report: &ExportReport) {
    for job in &report.jobs {
        match (&job.error, &job.output_path) {
            (None, Some(path)) => eprintln!("{}  {}", green("✓"), bold(&path.display().to_string())),
            (Some(_), _) => eprintln!("{}  {}", red("✗"), job.format),
            (None, None) => {}
        }
    }
    eprintln!(
        "Exported {}/{} in {}ms",
        report.stats.succeeded, report.stats.total_jobs, report.stats.total_duration_ms
    );
}

/// Map CLI args to `ExportConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExportConfig> {
    let formats = if cli.all {
        ExportFormat::ALL.to_vec()
    } else {
        parse_formats(&cli.types).context("Invalid --type")?
    };

    let defaults = PdfOptions::default();
    let pdf = PdfOptions {
        format: cli
            .paper
            .parse::<PaperFormat>()
            .context("Invalid --paper")?,
        width: cli.width.clone(),
        height: cli.height.clone(),
        landscape: cli.landscape,
        scale: cli.scale,
        display_header_footer: !cli.no_header_footer,
        header_template: cli
            .header_template
            .clone()
            .unwrap_or(defaults.header_template),
        footer_template: cli
            .footer_template
            .clone()
            .unwrap_or(defaults.footer_template),
        print_background: !cli.no_background,
        page_ranges: cli.page_ranges.clone(),
        margin: parse_margin(&cli.margin)?,
    };

    let mut builder = ExportConfig::builder()
        .formats(formats)
        .stylesheets(cli.stylesheets.clone())
        .include_default_styles(!cli.no_default_styles)
        .highlight(!cli.no_highlight)
        .breaks(cli.breaks)
        .emoji(!cli.no_emoji)
        .convert_resource_paths(!cli.no_convert_paths)
        .pdf(pdf)
        .quality(cli.quality)
        .browser_lang(cli.lang.as_str());

    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir.as_str());
    }
    if let Some(ref path) = cli.template {
        builder = builder.template(path);
    }
    if let Some(ref path) = cli.highlight_style {
        builder = builder.highlight_style(path);
    }
    if let Some(ref url) = cli.mermaid_server {
        builder = builder.mermaid_server(url.as_str());
    }
    if let Some(ref url) = cli.plantuml_server {
        builder = builder.plantuml_server(url.as_str());
    }
    if let Some(ref clip) = cli.clip {
        builder = builder.clip(parse_clip(clip)?);
    }
    if let Some(ref path) = cli.executable_path {
        builder = builder.executable_path(path);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.render_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--margin` (`top,right,bottom,left`, or one value for all sides).
fn parse_margin(s: &str) -> Result<Margins> {
    let parts: Vec<String> = s.split(',').map(|p| p.trim().to_string()).collect();
    match parts.as_slice() {
        [all] => Ok(Margins {
            top: all.clone(),
            right: all.clone(),
            bottom: all.clone(),
            left: all.clone(),
        }),
        [top, right, bottom, left] => Ok(Margins {
            top: top.clone(),
            right: right.clone(),
            bottom: bottom.clone(),
            left: left.clone(),
        }),
        _ => anyhow::bail!("--margin takes 1 or 4 comma-separated lengths (got '{s}')"),
    }
}

/// Parse `--clip` (`x,y,width,height`).
fn parse_clip(s: &str) -> Result<ClipRegion> {
    let values = s
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid clip value: '{}'", p.trim()))
        })
        .collect::<Result<Vec<_>>>()?;

    match values.as_slice() {
        [x, y, width, height] => Ok(ClipRegion {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        _ => anyhow::bail!("--clip takes x,y,width,height (got '{s}')"),
    }
}
