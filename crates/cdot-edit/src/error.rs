//! Edit engine errors

use std::path::PathBuf;

use cdot_blocks::BlockError;

/// Errors raised while applying or reverting edits
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// Reading or writing a file failed
    #[error("failed to access {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The block graph rejected the edit
    #[error("block graph update failed: {0}")]
    Block(#[from] BlockError),

    /// `revert_change` with no open transaction
    #[error("no applied change to revert")]
    NothingToRevert,
}

impl EditError {
    /// Wrap an I/O error with the path being accessed
    #[inline]
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the edit itself was at fault rather than the file system
    #[inline]
    #[must_use]
    pub fn is_edit_rejection(&self) -> bool {
        matches!(self, Self::Block(e) if e.is_edit_rejection())
    }
}
