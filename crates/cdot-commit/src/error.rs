//! Commit replay errors

use std::path::PathBuf;

use cdot_blocks::BlockId;

/// Errors raised while replaying edit sets onto a branch
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// libgit2 refused an operation
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    /// Reading or writing a working tree file failed
    #[error("failed to access {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Replay needs a working tree to resolve conflicts in
    #[error("repository has no working directory")]
    BareRepository,

    /// Uncommitted changes would be lost or mixed into the replay
    #[error("working tree has {count} uncommitted changes")]
    DirtyWorkingTree {
        /// Number of modified entries
        count: usize,
    },

    /// The target branch is already there and may not be replaced
    #[error("branch {0} already exists")]
    BranchExists(String),

    /// An edit names a file outside the repository
    #[error("{0} is not inside the repository")]
    OutsideRepository(PathBuf),

    /// An edit's original text is found neither at the start nor on the target
    #[error("edit of block {block} does not apply to {file}")]
    EditDoesNotApply {
        /// File the edit targets
        file: PathBuf,
        /// Block the edit was made for
        block: BlockId,
    },

    /// The conflict resolver failed on a file
    #[error("conflict resolution failed for {path}: {source:#}")]
    Resolver {
        /// Conflicted file
        path: PathBuf,
        /// Resolver failure
        #[source]
        source: anyhow::Error,
    },

    /// Conflicts are left in the index after resolution
    #[error("unresolved conflicts in {paths:?}")]
    UnresolvedConflict {
        /// Paths still conflicted, relative to the repository root
        paths: Vec<PathBuf>,
    },
}

impl CommitError {
    /// Wrap an I/O error with the path being accessed
    #[inline]
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for commit replay
pub type Result<T> = std::result::Result<T, CommitError>;
