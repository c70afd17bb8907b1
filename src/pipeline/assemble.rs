//! Document assembly: template + stylesheets + rendered fragment.
//!
//! The template uses mustache-style placeholders. `{{{name}}}` inserts the
//! value verbatim and `{{name}}` inserts it HTML-escaped. Unknown names expand
//! to nothing.

use crate::config::ExportConfig;
use crate::error::JobError;
use crate::pipeline::markup::html_escape;
use crate::templates;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, warn};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}\}|\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
        .unwrap()
});

/// Values substituted into the page template.
#[derive(Debug, Clone, Default)]
pub struct TemplateView<'a> {
    pub title: &'a str,
    pub style: &'a str,
    pub content: &'a str,
    pub mermaid: &'a str,
}

impl TemplateView<'_> {
    fn lookup(&self, name: &str) -> &str {
        match name {
            "title" => self.title,
            "style" => self.style,
            "content" => self.content,
            "mermaid" => self.mermaid,
            _ => "",
        }
    }
}

/// Fill `template` with `view`.
pub fn fill_template(template: &str, view: &TemplateView<'_>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures<'_>| {
            if let Some(raw) = caps.get(1) {
                view.lookup(raw.as_str()).to_string()
            } else if let Some(escaped) = caps.get(2) {
                html_escape(view.lookup(escaped.as_str()))
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// The configured template, or the built-in one.
pub async fn load_template(config: &ExportConfig) -> Result<Cow<'static, str>, JobError> {
    match &config.template {
        None => Ok(Cow::Borrowed(templates::DEFAULT_TEMPLATE)),
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .map(Cow::Owned)
            .map_err(|e| JobError::TemplateUnreadable {
                path: path.clone(),
                detail: e.to_string(),
            }),
    }
}

/// Wrap stylesheet text in a `<style>` element. Empty input yields nothing.
pub fn make_css(css: &str) -> String {
    if css.trim().is_empty() {
        return String::new();
    }
    format!("\n<style>\n{css}\n</style>\n")
}

async fn read_stylesheet(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(css) => make_css(&css),
        Err(e) => {
            warn!("Skipping stylesheet {}: {e}", path.display());
            String::new()
        }
    }
}

/// Concatenate every stylesheet for the page, in cascade order: base
/// markdown styles, user stylesheets, highlight theme, print overrides.
pub async fn read_styles(config: &ExportConfig, doc_dir: &Path) -> String {
    let mut style = String::new();

    if config.include_default_styles {
        style.push_str(&make_css(templates::MARKDOWN_CSS));
    }

    for sheet in &config.stylesheets {
        let path = if sheet.is_absolute() {
            sheet.clone()
        } else {
            doc_dir.join(sheet)
        };
        style.push_str(&read_stylesheet(&path).await);
    }

    if config.highlight {
        match &config.highlight_style {
            Some(path) => style.push_str(&read_stylesheet(path).await),
            None => style.push_str(&make_css(templates::HIGHLIGHT_CSS)),
        }
    }

    if config.include_default_styles {
        style.push_str(&make_css(templates::MARKDOWN_PDF_CSS));
    }

    debug!("Assembled {} bytes of CSS", style.len());
    style
}

/// `<script>` tag loading mermaid, or nothing when no server is configured.
pub fn mermaid_script(server: &str) -> String {
    let server = server.trim();
    if server.is_empty() {
        String::new()
    } else {
        format!("<script src=\"{}\"></script>", html_escape(server))
    }
}

/// Replace the header/footer date placeholders with `now` (UTC).
///
/// * `%%ISO-DATETIME%%` → `YYYY-MM-DD hh:mm:ss`
/// * `%%ISO-DATE%%` → `YYYY-MM-DD`
/// * `%%ISO-TIME%%` → `hh:mm:ss`
pub fn transform_template(text: &str, now: DateTime<Utc>) -> String {
    text.replace(
        "%%ISO-DATETIME%%",
        &now.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
    .replace("%%ISO-DATE%%", &now.format("%Y-%m-%d").to_string())
    .replace("%%ISO-TIME%%", &now.format("%H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
    }

    #[test]
    fn placeholders_raw_and_escaped() {
        let view = TemplateView {
            title: "a<b>.md",
            style: "<style>x</style>",
            content: "<p>hi</p>",
            mermaid: "",
        };
        let out = fill_template("<t>{{title}}</t>{{{style}}}{{{ content }}}{{{mermaid}}}{{{other}}}", &view);
        assert_eq!(out, "<t>a&lt;b&gt;.md</t><style>x</style><p>hi</p>");
    }

    #[test]
    fn default_template_fills() {
        let view = TemplateView {
            title: "readme.md",
            style: "",
            content: "<h1>Hello</h1>",
            mermaid: &mermaid_script("https://cdn/mermaid.js"),
        };
        let html = fill_template(templates::DEFAULT_TEMPLATE, &view);
        assert!(html.contains("<title>readme.md</title>"));
        assert!(html.contains("<h1>Hello</h1>"));
        assert!(html.contains("<script src=\"https://cdn/mermaid.js\"></script>"));
        assert!(!html.contains("{{{"));
    }

    #[test]
    fn iso_placeholders() {
        let now = fixed_now();
        assert_eq!(transform_template("%%ISO-DATE%%", now), "2024-03-09");
        assert_eq!(transform_template("%%ISO-TIME%%", now), "07:05:01");
        assert_eq!(
            transform_template("at %%ISO-DATETIME%%!", now),
            "at 2024-03-09 07:05:01!"
        );
        assert_eq!(
            transform_template("%%ISO-DATE%% / %%ISO-DATE%%", now),
            "2024-03-09 / 2024-03-09"
        );
        assert_eq!(transform_template("plain text", now), "plain text");
    }

    #[test]
    fn date_is_ten_chars() {
        let out = transform_template("%%ISO-DATE%%", Utc::now());
        assert_eq!(out.len(), 10);
        assert_eq!(&out[4..5], "-");
    }

    #[test]
    fn empty_css_is_skipped() {
        assert_eq!(make_css("  \n"), "");
        assert_eq!(make_css("a{}"), "\n<style>\na{}\n</style>\n");
    }

    #[test]
    fn mermaid_disabled_when_empty() {
        assert_eq!(mermaid_script(""), "");
    }

    #[tokio::test]
    async fn style_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("user.css"), "/* USER */").unwrap();
        let config = ExportConfig::builder()
            .stylesheet("user.css")
            .stylesheet("missing.css")
            .build()
            .unwrap();
        let css = read_styles(&config, dir.path()).await;

        let base = css.find("font-family").unwrap();
        let user = css.find("/* USER */").unwrap();
        let theme = css.find(".hljs-keyword").unwrap();
        let pdf = css.find("page-break-after").unwrap();
        assert!(base < user && user < theme && theme < pdf);
    }

    #[tokio::test]
    async fn no_defaults_no_highlight() {
        let config = ExportConfig::builder()
            .include_default_styles(false)
            .highlight(false)
            .build()
            .unwrap();
        assert_eq!(read_styles(&config, Path::new("/")).await, "");
    }

    #[tokio::test]
    async fn unreadable_template_is_io_error() {
        let config = ExportConfig::builder()
            .template("/no/such/template.html")
            .build()
            .unwrap();
        let err = load_template(&config).await.unwrap_err();
        assert!(matches!(err, JobError::TemplateUnreadable { .. }));
    }
}
