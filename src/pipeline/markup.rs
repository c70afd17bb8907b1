//! Markdown → HTML fragment via comrak, with highlighted code blocks.
//!
//! Fenced code blocks are replaced on the AST before formatting, so the
//! formatter emits our markup verbatim:
//!
//! * a `mermaid` info string yields `<div class="mermaid">…</div>` for the
//!   mermaid script to pick up in the browser,
//! * anything else yields `<pre class="hljs"><code><div>…</div></code></pre>`,
//!   highlighted with `hljs-` prefixed classes when syntect knows the language.

use crate::error::JobError;
use comrak::nodes::{NodeHtmlBlock, NodeValue};
use comrak::{Arena, Options};
use once_cell::sync::Lazy;
use regex::Regex;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use tracing::{debug, warn};

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

static MERMAID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bmermaid\b").unwrap());

/// Per-document rendering switches, resolved from front-matter and config.
#[derive(Debug, Clone, Copy)]
pub struct MarkupOptions {
    /// Soft line breaks become `<br />`.
    pub breaks: bool,
    /// Expand `:shortcode:` emoji.
    pub emoji: bool,
    /// Syntax-highlight fenced code.
    pub highlight: bool,
}

/// Renders markdown with GitHub Flavored Markdown extensions.
pub struct MarkdownRenderer {
    options: Options<'static>,
    highlight: bool,
}

impl MarkdownRenderer {
    /// Configures GFM extensions (tables, strikethrough, autolinks, task
    /// lists, footnotes, description lists) and raw HTML passthrough.
    pub fn new(opts: MarkupOptions) -> Self {
        let mut options = Options::default();

        options.extension.strikethrough = true;
        options.extension.table = true;
        options.extension.autolink = true;
        options.extension.tasklist = true;
        options.extension.footnotes = true;
        options.extension.description_lists = true;
        options.extension.shortcodes = opts.emoji;

        options.render.unsafe_ = true;
        options.render.hardbreaks = opts.breaks;

        Self {
            options,
            highlight: opts.highlight,
        }
    }

    /// Render markdown to an HTML fragment.
    pub fn render(&self, markdown: &str) -> Result<String, JobError> {
        let arena = Arena::new();
        let root = comrak::parse_document(&arena, markdown, &self.options);

        let mut blocks = 0usize;
        for node in root.descendants() {
            let mut ast = node.data.borrow_mut();
            let replacement = match &ast.value {
                NodeValue::CodeBlock(block) if block.fenced => {
                    Some(self.render_code_block(&block.info, &block.literal))
                }
                _ => None,
            };
            if let Some(literal) = replacement {
                ast.value = NodeValue::HtmlBlock(NodeHtmlBlock {
                    block_type: 0,
                    literal,
                });
                blocks += 1;
            }
        }

        let mut out = Vec::with_capacity(markdown.len() * 2);
        comrak::format_html(root, &self.options, &mut out).map_err(|e| JobError::Internal {
            detail: format!("HTML formatting failed: {e}"),
        })?;
        debug!("Rendered markdown ({} code blocks)", blocks);

        String::from_utf8(out).map_err(|e| JobError::Internal {
            detail: format!("Rendered HTML is not UTF-8: {e}"),
        })
    }

    fn render_code_block(&self, info: &str, code: &str) -> String {
        let lang = info.split_whitespace().next().unwrap_or("");

        if MERMAID_RE.is_match(lang) {
            return format!("<div class=\"mermaid\">{}</div>\n", html_escape(code));
        }

        let body = if self.highlight && !lang.is_empty() {
            highlight_code(code, lang).unwrap_or_else(|| html_escape(code))
        } else {
            html_escape(code)
        };
        format!("<pre class=\"hljs\"><code><div>{body}</div></code></pre>\n")
    }
}

/// Highlight `code` with CSS classes. `None` when the language is unknown or
/// highlighting fails.
fn highlight_code(code: &str, language: &str) -> Option<String> {
    if code.is_empty() {
        return Some(String::new());
    }

    let syntax = SYNTAX_SET
        .find_syntax_by_token(language)
        .or_else(|| SYNTAX_SET.find_syntax_by_extension(language))?;

    let mut generator = ClassedHTMLGenerator::new_with_class_style(
        syntax,
        &SYNTAX_SET,
        ClassStyle::SpacedPrefixed { prefix: "hljs-" },
    );
    for line in LinesWithEndings::from(code) {
        if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
            warn!("Highlighting '{language}' failed, falling back to plain text: {e}");
            return None;
        }
    }
    Some(generator.finalize())
}

/// Escape text for HTML element content and quoted attribute values.
pub(crate) fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(md: &str, breaks: bool, emoji: bool) -> String {
        MarkdownRenderer::new(MarkupOptions {
            breaks,
            emoji,
            highlight: true,
        })
        .render(md)
        .unwrap()
    }

    #[test]
    fn gfm_table_and_strikethrough() {
        let html = render("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n", false, true);
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn breaks_setting() {
        assert!(render("one\ntwo\n", true, true).contains("<br />"));
        assert!(!render("one\ntwo\n", false, true).contains("<br />"));
    }

    #[test]
    fn emoji_setting() {
        assert!(render("hi :smile:\n", false, true).contains('😄'));
        assert!(render("hi :smile:\n", false, false).contains(":smile:"));
    }

    #[test]
    fn mermaid_block() {
        let html = render("```mermaid\ngraph TD; A-->B\n```\n", false, true);
        assert!(html.contains("<div class=\"mermaid\">graph TD; A--&gt;B\n</div>"));
        assert!(!html.contains("<pre"));
    }

    #[test]
    fn known_language_is_highlighted() {
        let html = render("```rust\nfn main() {}\n```\n", false, true);
        assert!(html.contains("<pre class=\"hljs\"><code><div>"));
        assert!(html.contains("hljs-"));
    }

    #[test]
    fn unknown_language_is_escaped() {
        let html = render("```nosuchlang\n<b>&</b>\n```\n", false, true);
        assert!(html.contains("<pre class=\"hljs\"><code><div>&lt;b&gt;&amp;&lt;/b&gt;\n</div></code></pre>"));
    }

    #[test]
    fn highlight_off_escapes() {
        let html = MarkdownRenderer::new(MarkupOptions {
            breaks: false,
            emoji: true,
            highlight: false,
        })
        .render("```rust\nlet a = 1 < 2;\n```\n")
        .unwrap();
        assert!(html.contains("let a = 1 &lt; 2;"));
        assert!(!html.contains("hljs-"));
    }

    #[test]
    fn escape_covers_text_and_attributes() {
        assert_eq!(
            html_escape(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn raw_html_passes_through() {
        let html = render("<div class=\"note\">hi</div>\n", false, true);
        assert!(html.contains("<div class=\"note\">hi</div>"));
    }
}
