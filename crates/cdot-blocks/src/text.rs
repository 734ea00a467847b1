//! Text normalisation used to match blocks across edits
//!
//! Edits are matched ignoring all whitespace, and block identity is
//! re-resolved ignoring comments as well.

use std::path::Path;

use crate::error::BlockError;

/// Byte-order mark stripped from sources
pub const BOM: char = '\u{feff}';

/// Comment syntax of a language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `// line` and `/* block */`
    CLike,
    /// `# line`
    Hash,
}

/// Read a source file as UTF-8, dropping a leading BOM
///
/// # Errors
/// Returns [`BlockError::Io`] if the file cannot be read or is not UTF-8
pub fn read_source(path: &Path) -> Result<String, BlockError> {
    let text = std::fs::read_to_string(path).map_err(|e| BlockError::io(path, e))?;
    Ok(match text.strip_prefix(BOM) {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

/// Remove every whitespace character
#[must_use]
pub fn remove_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Whether `needle` occurs in `haystack` once whitespace is ignored
#[must_use]
pub fn contains_ignoring_whitespace(haystack: &str, needle: &str) -> bool {
    remove_whitespace(haystack).contains(&remove_whitespace(needle))
}

/// Remove comments, leaving string and char literals intact
#[must_use]
pub fn strip_comments(text: &str, style: CommentStyle) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q || c == '\n' {
                quote = None;
            }
            continue;
        }

        match (style, c) {
            (_, '"') => {
                quote = Some('"');
                out.push(c);
            }
            (CommentStyle::Hash, '\'') => {
                quote = Some('\'');
                out.push(c);
            }
            (CommentStyle::Hash, '#') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            (CommentStyle::CLike, '/') if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            (CommentStyle::CLike, '/') if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Comment-free, whitespace-free form of a piece of code
#[must_use]
pub fn normalize_code(text: &str, style: CommentStyle) -> String {
    remove_whitespace(&strip_comments(text, style))
}

/// Leading whitespace of a line
#[must_use]
pub fn indentation(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}
