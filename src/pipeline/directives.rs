//! Source directives applied to the markdown text before parsing.
//!
//! * `:[alt](part.md)`: replaced by the contents of `part.md`, recursively.
//! * `::: name` / `:::`: open and close a `<div class="name">` container.
//! * PlantUML blocks between the open and close markers: replaced by an
//!   `<img>` pointing at the PlantUML server.
//!
//! Fenced code blocks are left untouched so documentation about these
//! directives can show them literally.

use crate::error::JobError;
use crate::pipeline::encode::encode_diagram;
use crate::pipeline::markup::html_escape;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

static INCLUDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i):\[[^\]\n]+\]\(([^)\n]+\.[^)\n]+)\)").unwrap());

static CONTAINER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}:{3,}[ \t]*([^\s:][^\n]*?)?[ \t]*$").unwrap());

/// Default line that opens a PlantUML block.
pub const DEFAULT_OPEN_MARKER: &str = "@startuml";
/// Default line that closes a PlantUML block.
pub const DEFAULT_CLOSE_MARKER: &str = "@enduml";

/// Directive settings resolved from config and front-matter.
#[derive(Debug, Clone)]
pub struct DirectiveOptions<'a> {
    /// Empty disables PlantUML rendering.
    pub plantuml_server: &'a str,
    /// Blank falls back to [`DEFAULT_OPEN_MARKER`].
    pub plantuml_open_marker: &'a str,
    /// Blank falls back to [`DEFAULT_CLOSE_MARKER`].
    pub plantuml_close_marker: &'a str,
}

/// `marker` trimmed, or `default` when nothing is left.
pub fn marker_or<'a>(marker: &'a str, default: &'a str) -> &'a str {
    match marker.trim() {
        "" => default,
        m => m,
    }
}

/// Apply every directive to `body`, the markdown of the file at `source`.
pub fn apply(body: &str, source: &Path, opts: &DirectiveOptions<'_>) -> Result<String, JobError> {
    let mut stack = vec![source.to_path_buf()];
    let expanded = expand_includes(body, source, &mut stack)?;
    render_blocks(&expanded, opts)
}

// ── Fence tracking ───────────────────────────────────────────────────────

/// Tracks whether the current line belongs to a fenced code block.
#[derive(Default)]
struct FenceTracker {
    open: Option<(char, usize)>,
}

impl FenceTracker {
    fn in_fence(&self) -> bool {
        self.open.is_some()
    }

    /// Feed one line; returns true if the line is part of a fence
    /// (opening, body or closing).
    fn consume(&mut self, line: &str) -> bool {
        let indent = line.len() - line.trim_start_matches(' ').len();
        let rest = line.trim_start_matches(' ');
        let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~');
        let run = marker.map_or(0, |m| rest.chars().take_while(|c| *c == m).count());

        match self.open {
            Some((ch, len)) => {
                if indent <= 3
                    && marker == Some(ch)
                    && run >= len
                    && rest[run..].trim().is_empty()
                {
                    self.open = None;
                }
                true
            }
            None => {
                if let Some(ch) = marker {
                    if indent <= 3 && run >= 3 && !(ch == '`' && rest[run..].contains('`')) {
                        self.open = Some((ch, run));
                        return true;
                    }
                }
                false
            }
        }
    }
}

// ── Includes ─────────────────────────────────────────────────────────────

fn expand_includes(
    body: &str,
    source: &Path,
    stack: &mut Vec<PathBuf>,
) -> Result<String, JobError> {
    let dir = source.parent().unwrap_or_else(|| Path::new("."));
    let mut fences = FenceTracker::default();
    let mut out = String::with_capacity(body.len());

    for line in body.split_inclusive('\n') {
        if fences.consume(line) || !INCLUDE_RE.is_match(line) {
            out.push_str(line);
            continue;
        }

        let mut last = 0;
        for caps in INCLUDE_RE.captures_iter(line) {
            let (Some(whole), Some(target)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&line[last..whole.start()]);
            out.push_str(&include_file(target.as_str().trim(), dir, source, stack)?);
            last = whole.end();
        }
        out.push_str(&line[last..]);
    }
    Ok(out)
}

fn include_file(
    target: &str,
    dir: &Path,
    from: &Path,
    stack: &mut Vec<PathBuf>,
) -> Result<String, JobError> {
    let joined = dir.join(target);
    let path = std::fs::canonicalize(&joined).map_err(|_| JobError::IncludeNotFound {
        path: joined.clone(),
        from: from.to_path_buf(),
    })?;

    if stack.iter().any(|p| same_file(p, &path)) {
        return Err(JobError::IncludeCycle { path });
    }

    let text = std::fs::read_to_string(&path).map_err(|e| JobError::ReadFailed {
        path: path.clone(),
        detail: e.to_string(),
    })?;
    debug!("Including {} from {}", path.display(), from.display());

    stack.push(path.clone());
    let expanded = expand_includes(&text, &path, stack);
    stack.pop();
    expanded
}

fn same_file(a: &Path, b: &Path) -> bool {
    match std::fs::canonicalize(a) {
        Ok(a) => a == b,
        Err(_) => a == b,
    }
}

// ── Containers and PlantUML ──────────────────────────────────────────────

fn render_blocks(body: &str, opts: &DirectiveOptions<'_>) -> Result<String, JobError> {
    let uml_enabled = !opts.plantuml_server.trim().is_empty();
    let open_marker = marker_or(opts.plantuml_open_marker, DEFAULT_OPEN_MARKER);
    let close_marker = marker_or(opts.plantuml_close_marker, DEFAULT_CLOSE_MARKER);
    let mut fences = FenceTracker::default();
    let mut out = String::with_capacity(body.len());
    let mut uml: Option<Vec<&str>> = None;

    for line in body.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\n', '\r']);

        if let Some(lines) = uml.as_mut() {
            if bare.trim_start().starts_with(close_marker) {
                let diagram = format!(
                    "{DEFAULT_OPEN_MARKER}\n{}\n{DEFAULT_CLOSE_MARKER}",
                    lines.join("\n")
                );
                out.push_str(&plantuml_image(&diagram, opts.plantuml_server)?);
                uml = None;
            } else {
                lines.push(bare);
            }
            continue;
        }

        if !fences.in_fence()
            && uml_enabled
            && bare.trim_start().starts_with(open_marker)
        {
            uml = Some(Vec::new());
            continue;
        }

        if fences.consume(line) {
            out.push_str(line);
            continue;
        }

        if let Some(caps) = CONTAINER_RE.captures(bare) {
            match caps.get(1).map(|m| m.as_str().trim()) {
                Some(name) if !name.is_empty() => {
                    out.push_str(&format!("\n<div class=\"{}\">\n\n", html_escape(name)));
                }
                _ => out.push_str("\n</div>\n\n"),
            }
            continue;
        }

        out.push_str(line);
    }

    // An unclosed diagram is kept as plain text.
    if let Some(lines) = uml {
        out.push_str(open_marker);
        out.push('\n');
        for l in lines {
            out.push_str(l);
            out.push('\n');
        }
    }
    Ok(out)
}

fn plantuml_image(diagram: &str, server: &str) -> Result<String, JobError> {
    let token = encode_diagram(diagram).map_err(|e| JobError::Internal {
        detail: format!("PlantUML encoding failed: {e}"),
    })?;
    Ok(format!(
        "\n<img src=\"{}/svg/{}\" alt=\"uml diagram\">\n\n",
        server.trim_end_matches('/'),
        token
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn opts() -> DirectiveOptions<'static> {
        DirectiveOptions {
            plantuml_server: "http://www.plantuml.com/plantuml",
            plantuml_open_marker: "@startuml",
            plantuml_close_marker: "@enduml",
        }
    }

    #[test]
    fn containers_become_divs() {
        let out = render_blocks("::: warning\nBe careful\n:::\n", &opts()).unwrap();
        assert!(out.contains("<div class=\"warning\">"));
        assert!(out.contains("Be careful"));
        assert!(out.contains("</div>"));
    }

    #[test]
    fn fenced_code_is_untouched() {
        let src = "```\n::: warning\n@startuml\n:[x](y.md)\n```\n";
        let out = render_blocks(src, &opts()).unwrap();
        assert_eq!(out, src);
        let dir = tempfile::tempdir().unwrap();
        let included = expand_includes(src, &dir.path().join("a.md"), &mut vec![]).unwrap();
        assert_eq!(included, src);
    }

    #[test]
    fn plantuml_becomes_image() {
        let src = "before\n\n@startuml\nA -> B\n@enduml\nafter\n";
        let out = render_blocks(src, &opts()).unwrap();
        let expected = encode_diagram("@startuml\nA -> B\n@enduml").unwrap();
        assert!(out.contains(&format!(
            "<img src=\"http://www.plantuml.com/plantuml/svg/{expected}\" alt=\"uml diagram\">"
        )));
        assert!(out.contains("after"));
        assert!(!out.contains("A -> B"));
    }

    #[test]
    fn custom_markers() {
        let o = DirectiveOptions {
            plantuml_open_marker: "```plantuml-open",
            plantuml_close_marker: "```plantuml-close",
            ..opts()
        };
        let out = render_blocks("```plantuml-open\nA -> B\n```plantuml-close\n", &o).unwrap();
        assert!(out.contains("alt=\"uml diagram\""));
    }

    #[test]
    fn blank_markers_fall_back_to_defaults() {
        let o = DirectiveOptions {
            plantuml_open_marker: "",
            plantuml_close_marker: "  ",
            ..opts()
        };
        let out = render_blocks("# Title\n\nSome text\nmore\n", &o).unwrap();
        assert_eq!(out, "# Title\n\nSome text\nmore\n");

        let out = render_blocks("text\n@startuml\nA -> B\n@enduml\n", &o).unwrap();
        assert!(out.starts_with("text\n"));
        assert_eq!(out.matches("<img").count(), 1);
    }

    #[test]
    fn empty_server_disables_plantuml() {
        let o = DirectiveOptions {
            plantuml_server: "",
            ..opts()
        };
        let src = "@startuml\nA -> B\n@enduml\n";
        assert_eq!(render_blocks(src, &o).unwrap(), src);
    }

    #[test]
    fn includes_are_recursive_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("parts")).unwrap();
        fs::write(dir.path().join("parts/a.md"), "A start\n:[b](b.md)\n").unwrap();
        fs::write(dir.path().join("parts/b.md"), "B body\n").unwrap();
        let main = dir.path().join("main.md");
        fs::write(&main, "").unwrap();

        let out = apply("# Doc\n:[part a](parts/a.md)\n", &main, &opts()).unwrap();
        assert!(out.contains("A start"));
        assert!(out.contains("B body"));
        assert!(!out.contains(":["));
    }

    #[test]
    fn include_cycle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), ":[b](b.md)\n").unwrap();
        fs::write(dir.path().join("b.md"), ":[a](a.md)\n").unwrap();
        let main = fs::canonicalize(dir.path()).unwrap().join("main.md");
        fs::write(&main, "").unwrap();

        let err = apply(":[a](a.md)\n", &main, &opts()).unwrap_err();
        assert!(matches!(err, JobError::IncludeCycle { .. }), "got {err:?}");
    }

    #[test]
    fn missing_include_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.md");
        let err = apply(":[gone](gone.md)\n", &main, &opts()).unwrap_err();
        assert!(matches!(err, JobError::IncludeNotFound { .. }));
    }
}
