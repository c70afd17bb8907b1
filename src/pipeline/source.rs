//! Source loading: read a markdown file and split off its front-matter.
//!
//! Front-matter is the YAML-style block fenced by `---` at the very top of
//! the file. Only flat `key: value` pairs are recognised. That covers every
//! key the exporter reads (`breaks`, `emoji`, `plantumlOpenMarker`,
//! `plantumlCloseMarker`) without pulling in a YAML parser. Nested or list
//! values are kept as raw strings.

use crate::error::JobError;
use serde_json::{Map, Number, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A markdown source with its parsed front-matter.
#[derive(Debug, Clone)]
pub struct Document {
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// Markdown text after the front-matter block.
    pub body: String,
    pub front_matter: FrontMatter,
}

impl Document {
    /// Directory containing the source. Relative references resolve here.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("/"))
    }

    /// File name of the source, used as the page title.
    pub fn title(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Flat key → value map parsed from the front-matter block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter(Map<String, Value>);

impl FrontMatter {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Boolean lookup with the exporter's fallback rule: an explicit `false`
    /// wins, any other truthy value is `true`, and a missing or falsy value
    /// takes `default`.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(false)) => false,
            Some(v) if is_truthy(v) => true,
            _ => default,
        }
    }

    /// String lookup; missing or falsy values take `default`.
    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.0.get(key) {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => default,
        }
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Read and parse a markdown file.
///
/// # Errors
/// * [`JobError::SourceNotFound`] if the file is gone
/// * [`JobError::PermissionDenied`] if it cannot be opened
/// * [`JobError::ReadFailed`] for anything else, including invalid UTF-8
pub async fn load_document(path: &Path) -> Result<Document, JobError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => JobError::SourceNotFound {
                path: path.to_path_buf(),
            },
            ErrorKind::PermissionDenied => JobError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => JobError::ReadFailed {
                path: path.to_path_buf(),
                detail: e.to_string(),
            },
        })?;

    let (front_matter, body) = split_front_matter(&raw);
    debug!(
        "Loaded {} ({} bytes, {} front-matter keys)",
        path.display(),
        body.len(),
        front_matter.0.len()
    );

    Ok(Document {
        path: path.to_path_buf(),
        body,
        front_matter,
    })
}

/// Split `text` into front-matter and body.
///
/// Returns an empty map and the whole text when there is no well-formed
/// block (opening `---` on the first line, closing `---` or `...`).
pub fn split_front_matter(text: &str) -> (FrontMatter, String) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.split_inclusive('\n');

    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return (FrontMatter::default(), text.to_string()),
    }

    let mut offset = text.split_inclusive('\n').next().map_or(0, str::len);
    let mut map = Map::new();
    for line in lines {
        offset += line.len();
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return (FrontMatter(map), text[offset..].to_string());
        }
        if let Some((key, value)) = parse_pair(trimmed) {
            map.insert(key, value);
        }
    }

    // Unterminated block: not front-matter.
    (FrontMatter::default(), text.to_string())
}

fn parse_pair(line: &str) -> Option<(String, Value)> {
    if line.trim_start().starts_with('#') || line.starts_with([' ', '\t']) {
        return None;
    }
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), parse_scalar(value.trim())))
}

fn parse_scalar(raw: &str) -> Value {
    match raw {
        "" | "~" | "null" | "Null" | "NULL" => return Value::Null,
        "true" | "True" | "TRUE" => return Value::Bool(true),
        "false" | "False" | "FALSE" => return Value::Bool(false),
        _ => {}
    }
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return Value::String(raw[1..raw.len() - 1].to_string());
        }
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_front_matter() {
        let (fm, body) = split_front_matter("# Title\n\ntext\n");
        assert!(fm.is_empty());
        assert_eq!(body, "# Title\n\ntext\n");
    }

    #[test]
    fn parses_flat_pairs() {
        let src = "---\nbreaks: true\nemoji: false\nplantumlOpenMarker: \"@startuml\"\ncount: 3\n---\n# Body\n";
        let (fm, body) = split_front_matter(src);
        assert_eq!(body, "# Body\n");
        assert_eq!(fm.get("breaks"), Some(&Value::Bool(true)));
        assert_eq!(fm.get("emoji"), Some(&Value::Bool(false)));
        assert_eq!(fm.str_or("plantumlOpenMarker", "x"), "@startuml");
        assert_eq!(fm.get("count"), Some(&Value::Number(3.into())));
    }

    #[test]
    fn unterminated_block_is_body() {
        let src = "---\nbreaks: true\n# no end\n";
        let (fm, body) = split_front_matter(src);
        assert!(fm.is_empty());
        assert_eq!(body, src);
    }

    #[test]
    fn bool_fallback_rules() {
        let (fm, _) = split_front_matter("---\na: false\nb: yes\nc: 0\nd:\n---\n");
        assert!(!fm.bool_or("a", true), "explicit false wins");
        assert!(fm.bool_or("b", false), "truthy string");
        assert!(fm.bool_or("c", true), "falsy number takes default");
        assert!(!fm.bool_or("c", false));
        assert!(fm.bool_or("d", true), "null takes default");
        assert!(!fm.bool_or("missing", false));
    }

    #[test]
    fn str_fallback() {
        let (fm, _) = split_front_matter("---\nempty: ''\n---\n");
        assert_eq!(fm.str_or("empty", "@enduml"), "@enduml");
        assert_eq!(fm.str_or("missing", "@enduml"), "@enduml");
    }

    #[test]
    fn bom_is_ignored() {
        let (fm, body) = split_front_matter("\u{feff}---\nemoji: false\n---\nx");
        assert!(!fm.bool_or("emoji", true));
        assert_eq!(body, "x");
    }

    #[tokio::test]
    async fn load_missing_file() {
        let err = load_document(Path::new("/definitely/not/here.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn load_reads_title_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.md");
        std::fs::write(&path, "---\nbreaks: true\n---\nhello\n").unwrap();
        let doc = load_document(&path).await.unwrap();
        assert_eq!(doc.title(), "readme.md");
        assert_eq!(doc.dir(), dir.path());
        assert_eq!(doc.body, "hello\n");
        assert!(doc.front_matter.bool_or("breaks", false));
    }
}
