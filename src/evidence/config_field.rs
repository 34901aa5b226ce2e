//! Windowed field lookups in indentation-structured config text.
//!
//! The kubelet config is YAML, but the benchmark only ever asks
//! "is key K under section S set to V". Rather than parsing YAML, each path
//! segment is found with an anchored line match, and the nested key is
//! searched in a bounded window below it. The window closes early at the
//! first line indented at or above its section, so a sibling section's
//! identically-named key never answers for this one.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

/// Maximum number of lines scanned below a section header.
pub const WINDOW_LINES: usize = 10;

/// Three-valued answer to a field comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tri {
    /// The field is set to the expected value.
    Yes,
    /// The field is set to a different value.
    No,
    /// The field is not set.
    Unset,
}

/// Line range `[start, end)` holding the body of a section.
#[derive(Debug, Clone, Copy)]
struct Block {
    start: usize,
    end: usize,
    /// Indentation of the section header; `None` for the document root.
    indent: Option<usize>,
}

/// `true` when every segment of the dotted `top_key` path is present.
pub fn has_field(content: &str, top_key: &str) -> bool {
    let lines: Vec<&str> = content.lines().collect();
    locate_section(&lines, top_key).is_some()
}

/// Scalar value of `nested_key` inside the `top_key` section.
///
/// An empty `top_key` addresses the document root. Returns `None` when the
/// section or key is absent, or when the key only opens a nested mapping.
pub fn field_value(content: &str, top_key: &str, nested_key: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let block = locate_section(&lines, top_key)?;
    let (_, line) = find_key(&lines, block, nested_key)?;
    let value = scalar(line_value(line, nested_key)?);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Compare `nested_key` inside the `top_key` section against `value`.
pub fn field_equals(content: &str, top_key: &str, nested_key: &str, value: &str) -> Tri {
    match field_value(content, top_key, nested_key) {
        Some(actual) if actual == value => Tri::Yes,
        Some(_) => Tri::No,
        None => Tri::Unset,
    }
}

/// Walk the dotted path segment by segment, narrowing the block each time.
fn locate_section(lines: &[&str], path: &str) -> Option<Block> {
    let mut block = Block {
        start: 0,
        end: lines.len(),
        indent: None,
    };
    if path.is_empty() {
        return Some(block);
    }

    for segment in path.split('.') {
        let (index, line) = find_key(lines, block, segment)?;
        let indent = indentation(line);
        let start = index.saturating_add(1);
        let limit = start.saturating_add(WINDOW_LINES).min(block.end);
        let end = (start..limit)
            .find(|&i| is_content(lines[i]) && indentation(lines[i]) <= indent)
            .unwrap_or(limit);
        block = Block {
            start,
            end,
            indent: Some(indent),
        };
    }
    Some(block)
}

/// First line in `block` declaring `key`.
///
/// At the document root only unindented lines qualify (`^key:`); inside a
/// section any deeper indentation does (`^\s*key:`).
fn find_key<'a>(lines: &[&'a str], block: Block, key: &str) -> Option<(usize, &'a str)> {
    let pattern = Regex::new(&format!(r"^(\s*){}\s*:", regex::escape(key))).ok()?;
    (block.start..block.end).find_map(|i| {
        let line = lines[i];
        let caps = pattern.captures(line)?;
        let indent = caps.get(1).map_or(0, |m| m.as_str().len());
        let in_scope = match block.indent {
            None => indent == 0,
            Some(parent) => indent > parent,
        };
        in_scope.then_some((i, line))
    })
}

/// Raw text after `key:` on a declaration line.
fn line_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.trim_start().strip_prefix(key)?;
    rest.trim_start().strip_prefix(':')
}

/// Normalize a scalar: drop trailing comments and surrounding quotes.
fn scalar(raw: &str) -> String {
    let without_comment = match raw.find(" #") {
        Some(pos) => &raw[..pos],
        None => raw,
    };
    let trimmed = without_comment.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| {
            trimmed
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
        })
        .unwrap_or(trimmed);
    unquoted.to_owned()
}

fn indentation(line: &str) -> usize {
    line.len().saturating_sub(line.trim_start().len())
}

/// Blank lines and comments never close a section.
fn is_content(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// A config file read once for a probe. Missing or unreadable files answer
/// every query with [`Tri::Unset`] instead of failing.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: PathBuf,
    content: Option<String>,
}

impl ConfigDocument {
    /// Read `path`, tolerating absence.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => Some(c),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "config file not readable");
                None
            }
        };
        Self {
            path: path.to_path_buf(),
            content,
        }
    }

    /// Wrap in-memory content (for testing).
    pub fn from_content(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
        }
    }

    /// Location this document was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` when the file was read.
    pub fn is_available(&self) -> bool {
        self.content.is_some()
    }

    /// See [`has_field`]. `false` when the file is missing.
    pub fn has_field(&self, top_key: &str) -> bool {
        self.content
            .as_deref()
            .is_some_and(|c| has_field(c, top_key))
    }

    /// See [`field_value`]. `None` when the file is missing.
    pub fn field_value(&self, top_key: &str, nested_key: &str) -> Option<String> {
        field_value(self.content.as_deref()?, top_key, nested_key)
    }

    /// See [`field_equals`]. [`Tri::Unset`] when the file is missing.
    pub fn field_equals(&self, top_key: &str, nested_key: &str, value: &str) -> Tri {
        match self.content.as_deref() {
            Some(c) => field_equals(c, top_key, nested_key, value),
            None => Tri::Unset,
        }
    }
}
