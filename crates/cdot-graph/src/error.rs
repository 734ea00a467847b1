//! Changing graph errors

use std::path::PathBuf;

use crate::node::NodeId;

/// Errors raised by [`ChangingGraph`](crate::ChangingGraph) operations
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Node id is not in the graph
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Operation needs a problem node
    #[error("node {0} is not a problem")]
    NotAProblem(NodeId),

    /// Operation needs a solution node
    #[error("node {0} is not a solution")]
    NotASolution(NodeId),

    /// Operation needs an acyclic graph
    #[error("graph contains a cycle")]
    Cyclic,

    /// Snapshot file access failed
    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        /// File or directory accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Snapshot (de)serialization failed
    #[error("snapshot serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraphError {
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
