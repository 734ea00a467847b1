//! Line-level replacement of a block's text

use cdot_blocks::text::indentation;
use cdot_blocks::SourceBlock;

/// Replace the lines `block` spans with `after`
///
/// When `after` starts without indentation it inherits the indentation of
/// the block's first line. A trailing line break is restored when the
/// replaced lines had one, and line endings follow the file's. An empty
/// `after` removes the lines.
#[must_use]
pub fn splice_block(content: &str, block: &SourceBlock, after: &str) -> String {
    let crlf = content.contains("\r\n");
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let start = block.start.row.min(lines.len());
    let end = (block.end.row + 1).min(lines.len()).max(start);

    let mut out = String::with_capacity(content.len() + after.len());
    for line in &lines[..start] {
        out.push_str(line);
    }

    if !after.is_empty() {
        let first_line = lines.get(start).copied().unwrap_or("");
        if !after.starts_with(char::is_whitespace) {
            out.push_str(indentation(first_line));
        }
        let normalized = after.replace("\r\n", "\n");
        if crlf {
            out.push_str(&normalized.replace('\n', "\r\n"));
        } else {
            out.push_str(&normalized);
        }
        let replaced_ended_line = end > start && lines[end - 1].ends_with('\n');
        if replaced_ended_line && !normalized.ends_with('\n') {
            out.push_str(if crlf { "\r\n" } else { "\n" });
        }
    }

    for line in &lines[end..] {
        out.push_str(line);
    }
    out
}
