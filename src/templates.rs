//! Bundled page template, stylesheets and PDF header/footer defaults.
//!
//! Everything here is compiled into the binary with `include_str!` so an
//! export never depends on files shipped next to the executable. Callers
//! override the template through [`crate::config::ExportConfig::template`] and
//! the highlight theme through [`crate::config::ExportConfig::highlight_style`];
//! these constants are used only when no override is provided.

/// Default page template. Placeholders: `{{{title}}}`, `{{{style}}}`,
/// `{{{mermaid}}}`, `{{{content}}}`.
pub const DEFAULT_TEMPLATE: &str = include_str!("../assets/template.html");

/// Base markdown stylesheet.
pub const MARKDOWN_CSS: &str = include_str!("../assets/styles/markdown.css");

/// Built-in `tomorrow` syntax-highlight theme.
pub const HIGHLIGHT_CSS: &str = include_str!("../assets/styles/tomorrow.css");

/// Print-oriented overrides, applied last.
pub const MARKDOWN_PDF_CSS: &str = include_str!("../assets/styles/markdown-pdf.css");

/// PDF header: document title on the left, export date on the right.
pub const DEFAULT_HEADER_TEMPLATE: &str = r#"<div style="font-size: 9px; margin-left: 1cm;"> <span class="title"></span></div> <div style="font-size: 9px; margin-left: auto; margin-right: 1cm; ">%%ISO-DATE%%</div>"#;

/// PDF footer: `page / total`, centred.
pub const DEFAULT_FOOTER_TEMPLATE: &str = r#"<div style="font-size: 9px; margin: 0 auto;"> <span class="pageNumber"></span> / <span class="totalPages"></span></div>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_has_all_placeholders() {
        for p in ["{{{title}}}", "{{{style}}}", "{{{mermaid}}}", "{{{content}}}"] {
            assert!(DEFAULT_TEMPLATE.contains(p), "missing {p}");
        }
    }

    #[test]
    fn stylesheets_are_not_empty() {
        assert!(MARKDOWN_CSS.contains("body"));
        assert!(HIGHLIGHT_CSS.contains(".hljs-keyword"));
        assert!(MARKDOWN_PDF_CSS.contains("page-break-after"));
    }

    #[test]
    fn header_footer_use_chrome_classes() {
        assert!(DEFAULT_HEADER_TEMPLATE.contains("class=\"title\""));
        assert!(DEFAULT_HEADER_TEMPLATE.contains("%%ISO-DATE%%"));
        assert!(DEFAULT_FOOTER_TEMPLATE.contains("pageNumber"));
        assert!(DEFAULT_FOOTER_TEMPLATE.contains("totalPages"));
    }
}
