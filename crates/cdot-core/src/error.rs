//! Error types for the resolution loop
//!
//! Generation failures and invalid solutions are recorded in the graph and
//! never surface here. What does surface is fatal to the run: analyzer
//! failures, a dirty starting tree, broken graph bookkeeping or I/O.

use std::path::PathBuf;

use cdot_blocks::BlockError;
use cdot_edit::EditError;
use cdot_graph::{GraphError, NodeId};

/// Main orchestrator error type
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The analyzer could not produce errors
    #[error("analyzer failed: {0:#}")]
    Analyzer(anyhow::Error),

    /// The working tree already has errors where it must be clean
    #[error("expected a clean project but the analyzer reports {count} errors")]
    NotClean {
        /// Number of errors reported
        count: usize,
    },

    /// A node was asked for in the wrong state or variant
    #[error("node {node} cannot be {action}: {reason}")]
    InvalidNode {
        /// Node concerned
        node: NodeId,
        /// What was attempted
        action: &'static str,
        /// Why it was refused
        reason: String,
    },

    /// Leaves left over after draining the graph for commits
    #[error("{remaining} nodes remain after draining leaves; merge cycles first")]
    UndrainedGraph {
        /// Nodes left in the graph
        remaining: usize,
    },

    /// Block graph failure
    #[error("block graph error: {0}")]
    Block(#[from] BlockError),

    /// File mutation failure
    #[error("edit error: {0}")]
    Edit(#[from] EditError),

    /// Changing graph failure
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Configuration could not be read or is inconsistent
    #[error("configuration error in {path}: {message}")]
    Config {
        /// Configuration file
        path: PathBuf,
        /// What is wrong
        message: String,
    },

    /// File access failed
    #[error("I/O failed for {path}: {source}")]
    Io {
        /// File or directory accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl OrchestratorError {
    /// Wrap an I/O error with the path being accessed
    #[inline]
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether resuming from the last snapshot can get past this error
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Analyzer(_) | Self::Io { .. } | Self::Edit(_))
    }
}

/// Result alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;
