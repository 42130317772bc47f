//! Metadata block grammar for planning documents.
//!
//! A document may start with a block delimited by lines consisting solely
//! of `---`. Inside it:
//!
//! ```text
//! phase: 03-auth                 scalar
//! depends_on: [02, "setup"]      inline list of scalars
//! files_modified:                block list
//!   - src/auth.rs
//! fingerprints:                  block list of maps
//!   - path: src/auth.rs
//!     size: 1024
//!     mtime: 1718000000000
//! must_haves:                    map of named sub-lists
//!   truths:
//!     - "User can log in"
//! ```
//!
//! Scalars are kept as strings (surrounding quotes stripped); callers use the
//! typed accessors. [`Frontmatter::render`] emits the same grammar, so
//! `parse(render(x)) == x`.

use std::fmt::Write as _;

/// Errors from metadata parsing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrontmatterError {
    #[error("Malformed metadata at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Metadata block opened at line 1 is never closed")]
    Unterminated,
}

type Result<T> = std::result::Result<T, FrontmatterError>;

/// A metadata value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Scalar(String),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_str()?.trim().parse().ok()
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_str()?.trim().parse().ok()
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Look up `key` when this value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    fn is_scalar(&self) -> bool {
        matches!(self, Value::Scalar(_))
    }
}

/// Ordered metadata fields of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    entries: Vec<(String, Value)>,
}

impl Frontmatter {
    /// Parse the text between the `---` delimiters.
    pub fn parse(block: &str) -> Result<Self> {
        let lines = significant_lines(block, 1);
        let mut pos = 0;
        let entries = parse_map(&lines, &mut pos, 0)?;
        if let Some(line) = lines.get(pos) {
            return Err(FrontmatterError::Malformed {
                line: line.number,
                reason: "unexpected indentation".to_string(),
            });
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Scalar value of `key`; empty scalars count as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str().filter(|s| !s.is_empty())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    /// Scalar items of a list-valued `key`. A lone scalar reads as a
    /// one-element list.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::Scalar(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Insert or replace `key`, keeping its original position.
    pub fn set(&mut self, key: &str, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the fields (without the `---` delimiters).
    pub fn render(&self) -> String {
        let mut out = String::new();
        render_entries(&mut out, &self.entries, 0);
        out
    }
}

/// A planning document split into metadata header and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Raw header text (leading BOM and both delimiter lines), kept verbatim
    /// so body-only rewrites never reformat metadata.
    header: String,
    frontmatter: Frontmatter,
    body: String,
}

const BOM: &str = "\u{feff}";

impl Document {
    pub fn parse(text: &str) -> Result<Self> {
        let (bom, text) = match text.strip_prefix(BOM) {
            Some(rest) => (BOM, rest),
            None => ("", text),
        };
        let mut segments = text.split_inclusive('\n');
        let opens = segments.next().is_some_and(|first| first.trim_end() == "---");
        if !opens {
            return Ok(Self {
                header: bom.to_string(),
                frontmatter: Frontmatter::default(),
                body: text.to_string(),
            });
        }

        let mut offset = text.split_inclusive('\n').next().map_or(0, str::len);
        let block_start = offset;
        for segment in segments {
            let segment_start = offset;
            offset += segment.len();
            if segment.trim_end() == "---" {
                let block = &text[block_start..segment_start];
                let lines = significant_lines(block, 2);
                let mut pos = 0;
                let entries = parse_map(&lines, &mut pos, 0)?;
                if let Some(line) = lines.get(pos) {
                    return Err(FrontmatterError::Malformed {
                        line: line.number,
                        reason: "unexpected indentation".to_string(),
                    });
                }
                return Ok(Self {
                    header: format!("{bom}{}", &text[..offset]),
                    frontmatter: Frontmatter { entries },
                    body: text[offset..].to_string(),
                });
            }
        }
        Err(FrontmatterError::Unterminated)
    }

    pub fn frontmatter(&self) -> &Frontmatter {
        &self.frontmatter
    }

    pub fn has_frontmatter(&self) -> bool {
        !self.header.trim_start_matches(BOM).is_empty()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Full text with the original header and a replacement body.
    pub fn with_body(&self, body: &str) -> String {
        format!("{}{body}", self.header)
    }

    pub fn to_text(&self) -> String {
        self.with_body(&self.body)
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Line<'a> {
    number: usize,
    indent: usize,
    text: &'a str,
}

fn significant_lines(block: &str, first_number: usize) -> Vec<Line<'_>> {
    block
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let raw = raw.trim_end();
            let text = raw.trim_start();
            if text.is_empty() || text.starts_with('#') {
                return None;
            }
            Some(Line {
                number: first_number + i,
                indent: raw.len() - text.len(),
                text,
            })
        })
        .collect()
}

fn is_list_item(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

fn parse_map(lines: &[Line<'_>], pos: &mut usize, indent: usize) -> Result<Vec<(String, Value)>> {
    let mut entries = Vec::new();
    while let Some(line) = lines.get(*pos) {
        if line.indent < indent || (line.indent == indent && is_list_item(line.text)) {
            break;
        }
        if line.indent > indent {
            return Err(FrontmatterError::Malformed {
                line: line.number,
                reason: "unexpected indentation".to_string(),
            });
        }
        let Some((key, rest)) = split_key(line.text) else {
            return Err(FrontmatterError::Malformed {
                line: line.number,
                reason: format!("expected `key: value`, found `{}`", line.text),
            });
        };
        *pos += 1;
        let value = parse_value(rest, lines, pos, indent)?;
        entries.push((key.to_string(), value));
    }
    Ok(entries)
}

/// Value following `key:` whose key sits at column `owner_indent`.
fn parse_value(rest: &str, lines: &[Line<'_>], pos: &mut usize, owner_indent: usize) -> Result<Value> {
    if !rest.is_empty() {
        return Ok(parse_inline(rest));
    }
    match lines.get(*pos) {
        Some(next) if is_list_item(next.text) && next.indent >= owner_indent => {
            let indent = next.indent;
            Ok(Value::List(parse_list(lines, pos, indent)?))
        }
        Some(next) if next.indent > owner_indent => {
            let indent = next.indent;
            Ok(Value::Map(parse_map(lines, pos, indent)?))
        }
        _ => Ok(Value::Scalar(String::new())),
    }
}

fn parse_list(lines: &[Line<'_>], pos: &mut usize, indent: usize) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    while let Some(line) = lines.get(*pos) {
        if line.indent != indent || !is_list_item(line.text) {
            break;
        }
        *pos += 1;
        let item = line.text[1..].trim_start();
        if item.is_empty() {
            items.push(parse_value("", lines, pos, indent + 1)?);
            continue;
        }
        match split_key(item) {
            Some((key, rest)) if !starts_quoted(item) => {
                let key_col = indent + (line.text.len() - item.len());
                let mut entries = vec![(key.to_string(), parse_value(rest, lines, pos, key_col)?)];
                if lines.get(*pos).is_some_and(|l| l.indent == key_col) {
                    entries.extend(parse_map(lines, pos, key_col)?);
                }
                items.push(Value::Map(entries));
            }
            _ => items.push(parse_inline(item)),
        }
    }
    Ok(items)
}

/// Split `key: rest`. Keys are identifier-like; anything else is not a key.
fn split_key(text: &str) -> Option<(&str, &str)> {
    let colon = text.find(':')?;
    let key = &text[..colon];
    let valid = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return None;
    }
    let rest = &text[colon + 1..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some((key, rest.trim()))
}

fn starts_quoted(text: &str) -> bool {
    text.starts_with('"') || text.starts_with('\'')
}

fn parse_inline(text: &str) -> Value {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        return Value::List(
            split_inline_items(inner)
                .into_iter()
                .map(|item| Value::Scalar(unquote(item).to_string()))
                .collect(),
        );
    }
    Value::Scalar(unquote(text).to_string())
}

fn split_inline_items(inner: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (None, '"' | '\'') => quote = Some(c),
            (None, ',') => {
                items.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = inner[start..].trim();
    if !last.is_empty() || !items.is_empty() {
        items.push(last);
    }
    items
}

fn unquote(text: &str) -> &str {
    let text = text.trim();
    for q in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(q) && text.ends_with(q) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

fn render_entries(out: &mut String, entries: &[(String, Value)], indent: usize) {
    let pad = " ".repeat(indent);
    for (key, value) in entries {
        match value {
            Value::Scalar(s) if s.is_empty() => {
                let _ = writeln!(out, "{pad}{key}:");
            }
            Value::Scalar(s) => {
                let _ = writeln!(out, "{pad}{key}: {}", quote_if_needed(s));
            }
            Value::List(items) if items.iter().all(Value::is_scalar) => {
                let _ = writeln!(out, "{pad}{key}: {}", render_inline_list(items));
            }
            Value::List(items) => {
                let _ = writeln!(out, "{pad}{key}:");
                for item in items {
                    render_item(out, item, indent + 2);
                }
            }
            Value::Map(children) => {
                let _ = writeln!(out, "{pad}{key}:");
                render_entries(out, children, indent + 2);
            }
        }
    }
}

fn render_item(out: &mut String, item: &Value, indent: usize) {
    let pad = " ".repeat(indent);
    match item {
        Value::Scalar(s) => {
            let _ = writeln!(out, "{pad}- {}", quote_if_needed(s));
        }
        Value::List(items) if items.iter().all(Value::is_scalar) => {
            let _ = writeln!(out, "{pad}- {}", render_inline_list(items));
        }
        Value::List(items) => {
            let _ = writeln!(out, "{pad}-");
            for nested in items {
                render_item(out, nested, indent + 2);
            }
        }
        Value::Map(entries) => {
            let mut block = String::new();
            render_entries(&mut block, entries, indent + 2);
            // The first entry shares the dash line.
            let inner_pad = " ".repeat(indent + 2);
            let dashed = format!("{pad}- ");
            out.push_str(&block.replacen(&inner_pad, &dashed, 1));
        }
    }
}

fn render_inline_list(items: &[Value]) -> String {
    let rendered: Vec<String> = items
        .iter()
        .filter_map(Value::as_str)
        .map(quote_if_needed)
        .collect();
    format!("[{}]", rendered.join(", "))
}

fn quote_if_needed(s: &str) -> String {
    let needs = s.is_empty()
        || s.trim() != s
        || s.contains(',')
        || s.contains(": ")
        || s.contains('#')
        || s.starts_with(['[', '"', '\'', '-']);
    if !needs {
        return s.to_string();
    }
    if s.contains('"') {
        format!("'{s}'")
    } else {
        format!("\"{s}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PLAN: &str = r#"---
phase: 03-auth
plan: 02
depends_on: ["01", setup]
files_modified:
  - src/auth.rs
  - src/session.rs
fingerprints:
  - path: src/auth.rs
    size: 1024
    mtime: 1718000000000
  - path: docs/api.md
    size: 10
    mtime: 1718000000001
must_haves:
  truths:
    - "User can log in: with email"
    - Session persists
  artifacts:
    - src/auth.rs
  key_links: []
---
# Plan body
"#;

    #[test]
    fn parses_every_shape() {
        let doc = Document::parse(PLAN).expect("parse");
        let fm = doc.frontmatter();

        assert_eq!(fm.get_str("phase"), Some("03-auth"));
        assert_eq!(fm.get_i64("plan"), Some(2));
        assert_eq!(fm.get_list("depends_on"), vec!["01", "setup"]);
        assert_eq!(fm.get_list("files_modified"), vec!["src/auth.rs", "src/session.rs"]);

        let prints = fm.get("fingerprints").and_then(Value::as_list).expect("list");
        assert_eq!(prints.len(), 2);
        assert_eq!(prints[0].get("path").and_then(Value::as_str), Some("src/auth.rs"));
        assert_eq!(prints[1].get("mtime").and_then(Value::as_i64), Some(1_718_000_000_001));

        let must = fm.get("must_haves").expect("must_haves");
        let truths = must.get("truths").and_then(Value::as_list).expect("truths");
        assert_eq!(truths[0].as_str(), Some("User can log in: with email"));
        assert_eq!(must.get("key_links").and_then(Value::as_list).map(<[Value]>::len), Some(0));

        assert_eq!(doc.body(), "# Plan body\n");
    }

    #[test]
    fn render_then_parse_is_identity() {
        let doc = Document::parse(PLAN).expect("parse");
        let rendered = doc.frontmatter().render();
        let reparsed = Frontmatter::parse(&rendered).expect("reparse");
        assert_eq!(&reparsed, doc.frontmatter());
    }

    #[test]
    fn body_rewrite_keeps_header_verbatim() {
        let text = "---\nstatus:   building   \n---\nPhase: 1 of 3\n";
        let doc = Document::parse(text).expect("parse");
        assert_eq!(doc.with_body("Phase: 2 of 3\n"), "---\nstatus:   building   \n---\nPhase: 2 of 3\n");
        assert_eq!(doc.to_text(), text);
    }

    #[test]
    fn byte_order_mark_stays_in_header() {
        let doc = Document::parse("\u{feff}---\nphase: 1\n---\nbody\n").expect("parse");
        assert!(doc.has_frontmatter());
        assert_eq!(doc.frontmatter().get_str("phase"), Some("1"));
        assert_eq!(doc.with_body("new\n"), "\u{feff}---\nphase: 1\n---\nnew\n");

        let plain = Document::parse("\u{feff}# Roadmap\n").expect("parse");
        assert!(!plain.has_frontmatter());
        assert_eq!(plain.body(), "# Roadmap\n");
        assert_eq!(plain.to_text(), "\u{feff}# Roadmap\n");
    }

    #[test]
    fn document_without_metadata_is_all_body() {
        let doc = Document::parse("# Roadmap\n| Phase | Status |\n").expect("parse");
        assert!(!doc.has_frontmatter());
        assert!(doc.frontmatter().is_empty());
        assert_eq!(doc.body(), "# Roadmap\n| Phase | Status |\n");
    }

    #[test]
    fn unterminated_block_is_an_error() {
        assert_eq!(
            Document::parse("---\nphase: 1\nno end\n"),
            Err(FrontmatterError::Unterminated)
        );
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let err = Document::parse("---\nphase: 1\nthis is not a field\n---\n").unwrap_err();
        assert_eq!(
            err,
            FrontmatterError::Malformed {
                line: 3,
                reason: "expected `key: value`, found `this is not a field`".to_string(),
            }
        );
    }

    #[test]
    fn orphan_indentation_is_rejected() {
        let err = Frontmatter::parse("phase: 1\n    stray: 2\n").unwrap_err();
        assert!(matches!(err, FrontmatterError::Malformed { line: 2, .. }));
    }

    #[test]
    fn set_and_remove_preserve_order() {
        let mut fm = Frontmatter::parse("a: 1\nb: 2\nc: 3\n").expect("parse");
        fm.set("b", Value::Scalar("20".into()));
        fm.set("d", Value::List(vec![Value::Scalar("x".into())]));
        fm.remove("a");
        assert_eq!(fm.keys().collect::<Vec<_>>(), vec!["b", "c", "d"]);
        assert_eq!(fm.render(), "b: 20\nc: 3\nd: [x]\n");
    }

    #[test]
    fn unindented_block_list_is_accepted() {
        let fm = Frontmatter::parse("depends_on:\n- 01\n- 02\nstatus: planned\n").expect("parse");
        assert_eq!(fm.get_list("depends_on"), vec!["01", "02"]);
        assert_eq!(fm.get_str("status"), Some("planned"));
    }

    #[test]
    fn quoting_survives_round_trip() {
        let mut fm = Frontmatter::default();
        fm.set("title", Value::Scalar("Auth: login, logout".into()));
        fm.set("list", Value::List(vec![Value::Scalar("a, b".into()), Value::Scalar("c".into())]));
        let reparsed = Frontmatter::parse(&fm.render()).expect("reparse");
        assert_eq!(reparsed, fm);
    }
}
