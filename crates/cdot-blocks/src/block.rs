//! Block records and edits
//!
//! A block is a syntactic unit (import, class, method, constructor, field)
//! that edits are addressed to. Its id survives edits to its own text.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Stable block identifier, never reused within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of syntactic unit a block stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Import,
    Class,
    Method,
    Constructor,
    Field,
}

impl BlockKind {
    /// All kinds, in declaration order
    pub const ALL: [BlockKind; 5] = [
        BlockKind::Import,
        BlockKind::Class,
        BlockKind::Method,
        BlockKind::Constructor,
        BlockKind::Field,
    ];

    /// Lowercase name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Import => "import",
            BlockKind::Class => "class",
            BlockKind::Method => "method",
            BlockKind::Constructor => "constructor",
            BlockKind::Field => "field",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Zero-based row and byte column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub column: usize,
}

impl Position {
    #[inline]
    #[must_use]
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl From<tree_sitter::Point> for Position {
    fn from(point: tree_sitter::Point) -> Self {
        Self::new(point.row, point.column)
    }
}

/// One block as recorded in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBlock {
    pub id: BlockId,
    pub kind: BlockKind,
    pub file: PathBuf,
    pub start: Position,
    pub end: Position,
    pub start_byte: usize,
    pub end_byte: usize,
    /// Source text, including leading comments
    pub text: String,
}

impl SourceBlock {
    /// Number of lines the block spans
    #[inline]
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.end.row - self.start.row + 1
    }

    /// Whether the block covers the given row
    #[inline]
    #[must_use]
    pub fn contains_row(&self, row: usize) -> bool {
        self.start.row <= row && row <= self.end.row
    }
}

/// Relation carried by an edge of the block graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Parent contains child
    Contains,
    /// Constructor builds the class it belongs to
    Constructs,
}

/// Replace a block's text
///
/// `before` must match the block's current text ignoring whitespace.
/// An empty `after` deletes the block. Empty `before` and `after` together
/// form the no-op sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockEdit {
    pub file: PathBuf,
    pub block_id: BlockId,
    pub before: String,
    pub after: String,
}

impl BlockEdit {
    #[must_use]
    pub fn new(
        file: impl Into<PathBuf>,
        block_id: BlockId,
        before: impl Into<String>,
        after: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            block_id,
            before: before.into(),
            after: after.into(),
        }
    }

    /// Sentinel that changes nothing
    #[must_use]
    pub fn empty(file: impl Into<PathBuf>, block_id: BlockId) -> Self {
        Self::new(file, block_id, "", "")
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    /// Whether applying this edit removes the block
    #[inline]
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        !self.before.is_empty() && self.after.is_empty()
    }

    /// Edit undoing this one
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            file: self.file.clone(),
            block_id: self.block_id,
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }

    /// Unified-style text of the edit, one `-`/`+` line per source line
    #[must_use]
    pub fn to_diff(&self) -> String {
        let mut diff = String::new();
        for line in self.before.lines() {
            diff.push('-');
            diff.push_str(line);
            diff.push('\n');
        }
        for line in self.after.lines() {
            diff.push('+');
            diff.push_str(line);
            diff.push('\n');
        }
        diff
    }
}

/// Compare two paths, falling back to canonical forms when they differ textually
#[must_use]
pub fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
