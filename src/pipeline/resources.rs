//! Resource-reference rewriting and heading anchors.
//!
//! Runs over the rendered HTML fragment after markdown conversion:
//!
//! 1. every `<img src>` (markdown images and raw HTML alike) is normalized so
//!    the browser can load it from the temporary HTML file,
//! 2. every `h1`–`h6` without an `id` gets a slug id for in-document links.
//!
//! The fragment is parsed with `tl` only to locate attribute values; edits are
//! spliced into the original text at those byte offsets so every other byte
//! of the markup survives unchanged.

use crate::pipeline::markup::html_escape;
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// How image references are rewritten.
#[derive(Debug, Clone, Copy)]
pub enum ReferenceMode<'a> {
    /// Turn local references into `file:` URIs resolved against `doc_dir`.
    FileUri { doc_dir: &'a Path },
    /// Only percent-decode and strip quotes, keeping the HTML relocatable.
    Portable,
}

/// The form a reference takes before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `file:` scheme.
    FileUri,
    /// Protocol-relative / UNC: `//host/share/...`.
    NetworkPath,
    /// `/abs/path` or a drive path such as `C:/img.png`.
    AbsolutePath,
    /// No scheme, not absolute.
    RelativePath,
    /// Any other scheme (`https:`, `data:`, ...). Left alone.
    External,
}

static SCHEME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*):").unwrap());

/// Classify an already-decoded reference.
pub fn classify(reference: &str) -> ReferenceKind {
    if let Some(caps) = SCHEME_RE.captures(reference) {
        let scheme = &caps[1];
        if scheme.eq_ignore_ascii_case("file") {
            return ReferenceKind::FileUri;
        }
        if scheme.len() == 1 {
            return ReferenceKind::AbsolutePath;
        }
        return ReferenceKind::External;
    }
    if reference.starts_with("//") {
        ReferenceKind::NetworkPath
    } else if reference.starts_with('/') {
        ReferenceKind::AbsolutePath
    } else {
        ReferenceKind::RelativePath
    }
}

/// Error from [`decode_uri_component`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedUri(pub String);

impl std::fmt::Display for MalformedUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "URI malformed: '{}'", self.0)
    }
}

/// Strict percent-decoding: every `%` must start a two-hex-digit escape and
/// the decoded bytes must be UTF-8.
pub fn decode_uri_component(input: &str) -> Result<String, MalformedUri> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(MalformedUri(input.to_string()));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    percent_encoding::percent_decode_str(input)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| MalformedUri(input.to_string()))
}

fn strip_quotes(s: &str) -> String {
    s.replace(['"', '\''], "")
}

/// Rewrite a reference for browser export, resolving local paths against
/// `doc_dir`.
///
/// Empty, external and already three-slash `file:///` references are
/// returned unchanged, as is a reference whose percent-encoding is malformed.
pub fn normalize_reference(raw: &str, doc_dir: &Path) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let decoded = match decode_uri_component(raw) {
        Ok(d) => d,
        Err(e) => {
            warn!("Leaving image reference as-is: {e}");
            return raw.to_string();
        }
    };
    let href = strip_quotes(&decoded).replace('\\', "/").replace('#', "%23");

    match classify(&href) {
        ReferenceKind::FileUri => {
            if href.starts_with("file:///") {
                href
            } else {
                // `file:` + rest, any slash count other than three.
                format!("file:///{}", href[5..].trim_start_matches('/'))
            }
        }
        ReferenceKind::External => raw.to_string(),
        ReferenceKind::NetworkPath => {
            format!("file:/{}", normalize_segments(&href[1..]))
        }
        ReferenceKind::AbsolutePath | ReferenceKind::RelativePath => {
            let resolved = resolve_against(&href, doc_dir).replace('#', "%23");
            if resolved.starts_with("//") {
                format!("file:{resolved}")
            } else if resolved.starts_with('/') {
                format!("file://{resolved}")
            } else {
                format!("file:///{resolved}")
            }
        }
    }
}

/// Portable rewrite used for HTML output: decode and strip quotes only.
pub fn portable_reference(raw: &str) -> String {
    match decode_uri_component(raw) {
        Ok(d) => strip_quotes(&d),
        Err(e) => {
            warn!("Leaving image reference as-is: {e}");
            raw.to_string()
        }
    }
}

fn is_drive_path(p: &str) -> bool {
    let b = p.as_bytes();
    b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

/// Lexically resolve `reference` (with `/` separators) against `dir`.
fn resolve_against(reference: &str, dir: &Path) -> String {
    if is_drive_path(reference) {
        return normalize_segments(reference);
    }
    if reference.starts_with('/') {
        return normalize_segments(reference);
    }
    let base = dir.to_string_lossy().replace('\\', "/");
    let joined = if base.ends_with('/') {
        format!("{base}{reference}")
    } else {
        format!("{base}/{reference}")
    };
    normalize_segments(&joined)
}

/// Collapse `.`, `..` and repeated separators, keeping a leading `/` or
/// drive prefix.
fn normalize_segments(path: &str) -> String {
    let (prefix, rest) = if is_drive_path(path) {
        (&path[..2], &path[2..])
    } else {
        ("", path)
    };
    let absolute = rest.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in rest.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let mut out = String::from(prefix);
    if absolute {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    out
}

// ── Heading slugs ────────────────────────────────────────────────────────

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static PUNCTUATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\]\[!'#$%&()*+,./:;<=>?@\\^_{|}~`。，、；：？！…—·ˉ¨‘’“”々～‖∶＂＇｀｜〃〔〕〈〉《》「」『』．〖〗【】（）［］｛｝]").unwrap()
});

/// Characters `encodeURI` leaves alone besides ASCII alphanumerics.
const ENCODE_URI: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

/// Anchor id for a heading's text.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let dashed = WHITESPACE_RE.replace_all(&lowered, "-");
    let stripped = PUNCTUATION_RE.replace_all(&dashed, "");
    let trimmed = stripped.trim_matches('-');
    utf8_percent_encode(trimmed, ENCODE_URI).to_string()
}

/// Hands out unique slugs within one document.
#[derive(Debug, Default)]
pub struct SlugRegistry {
    seen: HashMap<String, usize>,
}

impl SlugRegistry {
    /// First use returns `slug`; repeats get `-1`, `-2`, ...
    pub fn unique(&mut self, slug: String) -> String {
        let Some(&used) = self.seen.get(&slug) else {
            self.seen.insert(slug.clone(), 0);
            return slug;
        };
        let mut n = used;
        loop {
            n += 1;
            let candidate = format!("{slug}-{n}");
            if !self.seen.contains_key(&candidate) {
                self.seen.insert(slug, n);
                self.seen.insert(candidate.clone(), 0);
                return candidate;
            }
        }
    }
}

// ── HTML pass ────────────────────────────────────────────────────────────

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Byte offset of `part` inside `haystack`, if it was borrowed from it.
fn offset_in(haystack: &str, part: &[u8]) -> Option<usize> {
    let start = (part.as_ptr() as usize).checked_sub(haystack.as_ptr() as usize)?;
    (start + part.len() <= haystack.len()).then_some(start)
}

/// Rewrite image references and add heading anchors in an HTML fragment.
pub fn rewrite_html(html: &str, mode: ReferenceMode<'_>) -> String {
    let dom = match tl::parse(html, tl::ParserOptions::default()) {
        Ok(dom) => dom,
        Err(e) => {
            warn!("Could not parse rendered HTML, references left as-is: {e:?}");
            return html.to_string();
        }
    };
    let parser = dom.parser();
    let mut edits: Vec<Edit> = Vec::new();
    let mut slugs = SlugRegistry::default();

    // Existing ids are reserved so generated ones never collide with them.
    for node in dom.nodes() {
        if let Some(id) = node.as_tag().and_then(|t| attribute(t, "id").flatten()) {
            slugs.unique(id.into_owned());
        }
    }

    for node in dom.nodes() {
        let Some(tag) = node.as_tag() else { continue };
        let name = tag.name().as_utf8_str().to_ascii_lowercase();

        if name == "img" {
            let Some(Some(src)) = attribute(tag, "src") else {
                continue;
            };
            let raw = unescape_entities(&src);
            let rewritten = match mode {
                ReferenceMode::FileUri { doc_dir } => normalize_reference(&raw, doc_dir),
                ReferenceMode::Portable => portable_reference(&raw),
            };
            if rewritten == raw {
                continue;
            }
            let bytes = src.as_bytes();
            if let Some(start) = offset_in(html, bytes) {
                let quoted = start > 0 && matches!(html.as_bytes()[start - 1], b'"' | b'\'');
                let escaped = html_escape(&rewritten);
                debug!("Image reference '{raw}' → '{rewritten}'");
                edits.push(Edit {
                    start,
                    end: start + bytes.len(),
                    text: if quoted { escaped } else { format!("\"{escaped}\"") },
                });
            }
        } else if matches!(name.as_str(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
            if attribute(tag, "id").is_some() {
                continue;
            }
            let text = unescape_entities(&tag.inner_text(parser));
            let slug = slugify(&text);
            if slug.is_empty() {
                continue;
            }
            let id = slugs.unique(slug);
            let name_bytes = tag.name().as_bytes();
            if let Some(start) = offset_in(html, name_bytes) {
                let at = start + name_bytes.len();
                edits.push(Edit {
                    start: at,
                    end: at,
                    text: format!(" id=\"{}\"", html_escape(&id)),
                });
            }
        }
    }

    splice(html, edits)
}

/// Like `Attributes::get`, but matches the name case-insensitively as HTML does.
fn attribute<'t>(tag: &'t tl::HTMLTag<'_>, name: &str) -> Option<Option<Cow<'t, str>>> {
    tag.attributes()
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}

fn splice(html: &str, mut edits: Vec<Edit>) -> String {
    if edits.is_empty() {
        return html.to_string();
    }
    edits.sort_by_key(|e| e.start);
    let mut out = String::with_capacity(html.len() + edits.len() * 16);
    let mut cursor = 0;
    for e in edits {
        if e.start < cursor {
            continue;
        }
        out.push_str(&html[cursor..e.start]);
        out.push_str(&e.text);
        cursor = e.end;
    }
    out.push_str(&html[cursor..]);
    out
}

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|amp|lt|gt|quot|apos|nbsp);").unwrap());

fn unescape_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    ENTITY_RE
        .replace_all(s, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => {
                    let num = &entity[1..];
                    let code = if let Some(hex) = num.strip_prefix(['x', 'X']) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIR: &str = "/docs/guide";

    fn norm(r: &str) -> String {
        normalize_reference(r, Path::new(DIR))
    }

    #[test]
    fn relative_paths_resolve_against_document_dir() {
        assert_eq!(norm("img/a.png"), "file:///docs/guide/img/a.png");
        assert_eq!(norm("./a.png"), "file:///docs/guide/a.png");
        assert_eq!(norm("../shared/a.png"), "file:///docs/shared/a.png");
    }

    #[test]
    fn absolute_paths_get_file_scheme() {
        assert_eq!(norm("/var/img/a.png"), "file:///var/img/a.png");
        assert_eq!(norm("C:\\pics\\a.png"), "file:///C:/pics/a.png");
    }

    #[test]
    fn network_paths() {
        assert_eq!(norm("//server/share/a.png"), "file://server/share/a.png");
    }

    #[test]
    fn file_uris() {
        assert_eq!(norm("file:///tmp/a.png"), "file:///tmp/a.png");
        assert_eq!(norm("file://tmp/a.png"), "file:///tmp/a.png");
        assert_eq!(norm("file:/tmp/a.png"), "file:///tmp/a.png");
    }

    #[test]
    fn already_normalized_is_stable() {
        let once = norm("img/a b.png");
        assert_eq!(norm(&once), once);
    }

    #[test]
    fn hash_is_encoded() {
        assert_eq!(norm("img/c#1.png"), "file:///docs/guide/img/c%231.png");
        assert_eq!(norm("img/c%231.png"), "file:///docs/guide/img/c%231.png");
    }

    #[test]
    fn external_and_empty_untouched() {
        assert_eq!(norm("https://example.com/a%20b.png"), "https://example.com/a%20b.png");
        assert_eq!(norm("data:image/png;base64,AAAA"), "data:image/png;base64,AAAA");
        assert_eq!(norm(""), "");
    }

    #[test]
    fn quotes_stripped_and_percent_decoded() {
        assert_eq!(norm("\"my%20pic.png\""), "file:///docs/guide/my pic.png");
    }

    #[test]
    fn malformed_percent_is_left_alone() {
        assert_eq!(norm("100%.png"), "100%.png");
        assert_eq!(norm("bad%ZZ.png"), "bad%ZZ.png");
        assert!(decode_uri_component("%E0%A4%A").is_err());
        assert!(decode_uri_component("%FF").is_err());
        assert_eq!(decode_uri_component("a%20b").unwrap(), "a b");
    }

    #[test]
    fn classification() {
        assert_eq!(classify("file:///x"), ReferenceKind::FileUri);
        assert_eq!(classify("//h/x"), ReferenceKind::NetworkPath);
        assert_eq!(classify("/x"), ReferenceKind::AbsolutePath);
        assert_eq!(classify("D:/x"), ReferenceKind::AbsolutePath);
        assert_eq!(classify("x/y"), ReferenceKind::RelativePath);
        assert_eq!(classify("https://x"), ReferenceKind::External);
    }

    #[test]
    fn portable_only_decodes() {
        assert_eq!(portable_reference("img/my%20pic.png"), "img/my pic.png");
        assert_eq!(portable_reference("'a.png'"), "a.png");
        assert_eq!(portable_reference("50%.png"), "50%.png");
    }

    #[test]
    fn slug_rules() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  What's new?  "), "whats-new");
        assert_eq!(slugify("C++ & Rust: a_b"), "c--rust-ab");
        assert_eq!(slugify("-- Edge --"), "edge");
        assert_eq!(slugify("日本語、テスト"), "%E6%97%A5%E6%9C%AC%E8%AA%9E%E3%83%86%E3%82%B9%E3%83%88");
    }

    #[test]
    fn slug_registry_suffixes_duplicates() {
        let mut r = SlugRegistry::default();
        assert_eq!(r.unique("intro".into()), "intro");
        assert_eq!(r.unique("intro".into()), "intro-1");
        assert_eq!(r.unique("intro".into()), "intro-2");
        assert_eq!(r.unique("other".into()), "other");
    }

    #[test]
    fn rewrite_preserves_other_bytes() {
        let html = "<p>a<br>b</p>\n<p><img src=\"img/x.png\" alt=\"x\"></p>\n";
        let out = rewrite_html(html, ReferenceMode::FileUri { doc_dir: Path::new(DIR) });
        assert_eq!(
            out,
            "<p>a<br>b</p>\n<p><img src=\"file:///docs/guide/img/x.png\" alt=\"x\"></p>\n"
        );
    }

    #[test]
    fn rewrite_handles_entities_and_raw_html() {
        let html = "<div><img src='a&amp;b.png'></div>";
        let out = rewrite_html(html, ReferenceMode::FileUri { doc_dir: Path::new(DIR) });
        assert_eq!(out, "<div><img src='file:///docs/guide/a&amp;b.png'></div>");
    }

    #[test]
    fn uppercase_attribute_names_are_matched() {
        let html = "<img SRC=\"x.png\"><h2 ID=\"x\">Top</h2><h2>X</h2>";
        let out = rewrite_html(html, ReferenceMode::FileUri { doc_dir: Path::new(DIR) });
        assert_eq!(
            out,
            "<img SRC=\"file:///docs/guide/x.png\"><h2 ID=\"x\">Top</h2><h2 id=\"x-1\">X</h2>"
        );
    }

    #[test]
    fn rewrite_portable_mode() {
        let html = "<img src=\"my%20pic.png\">";
        assert_eq!(
            rewrite_html(html, ReferenceMode::Portable),
            "<img src=\"my pic.png\">"
        );
    }

    #[test]
    fn headings_get_ids() {
        let html = "<h1>Intro</h1>\n<h2>Intro</h2>\n<h3 id=\"keep\">Kept</h3>\n";
        let out = rewrite_html(html, ReferenceMode::Portable);
        assert_eq!(
            out,
            "<h1 id=\"intro\">Intro</h1>\n<h2 id=\"intro-1\">Intro</h2>\n<h3 id=\"keep\">Kept</h3>\n"
        );
    }
}
