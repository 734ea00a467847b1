//! Block graph errors

use std::path::PathBuf;

use crate::block::{BlockId, BlockKind};

/// Errors raised while building or updating a [`BlockGraph`](crate::BlockGraph)
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    /// Reading a source file failed
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Grammar could not be loaded into the parser
    #[error("parser initialization failed: {0}")]
    ParserInit(String),

    /// Tree-sitter returned no tree
    #[error("failed to parse {0}")]
    ParseFailed(PathBuf),

    /// File extension has no grammar
    #[error("unsupported language for {0}")]
    UnsupportedLanguage(PathBuf),

    /// Block id is not in the graph
    #[error("unknown block {0}")]
    UnknownBlock(BlockId),

    /// Edit names a file the block does not live in
    #[error("block {block} is not in file {file} (it lives in {actual})")]
    BlockNotInFile {
        /// Edited block
        block: BlockId,
        /// File named by the edit
        file: PathBuf,
        /// File the block actually lives in
        actual: PathBuf,
    },

    /// `before` does not match the block's current text
    #[error("edit on block {block} does not match its current text")]
    StructuralMismatch {
        /// Edited block
        block: BlockId,
    },

    /// `after` cannot be found on disk
    #[error("the files have not been modified: edit on block {block} is not present in {file}")]
    NoOpEdit {
        /// Edited block
        block: BlockId,
        /// File that was expected to contain the edit
        file: PathBuf,
    },

    /// Zero or several syntax nodes match the edited text
    #[error("expected one {kind} block matching the edit in {file}, found {found}")]
    AmbiguousMatch {
        /// Kind being matched
        kind: BlockKind,
        /// File that was re-parsed
        file: PathBuf,
        /// Number of candidates found
        found: usize,
    },

    /// `revert` without a matching `save_state`
    #[error("no saved state to revert to")]
    NoSavedState,
}

impl BlockError {
    /// Wrap an I/O error with the path being accessed
    #[inline]
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error says the edit itself is wrong, as opposed to the environment
    #[must_use]
    pub fn is_edit_rejection(&self) -> bool {
        matches!(
            self,
            Self::BlockNotInFile { .. }
                | Self::StructuralMismatch { .. }
                | Self::NoOpEdit { .. }
                | Self::AmbiguousMatch { .. }
        )
    }
}
