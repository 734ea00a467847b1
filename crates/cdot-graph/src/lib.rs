//! cdot-graph - Changing graph
//!
//! Records which compile problems were caused by which solutions and which
//! solutions fixed which problems. Provides the duplicate lookups, cycle
//! merging, transitive reduction and snapshot persistence the resolution
//! loop relies on.

#![warn(unreachable_pub)]

pub mod cycles;
pub mod error;
pub mod graph;
pub mod node;
pub mod snapshot;

pub use error::GraphError;
pub use graph::{ChangingGraph, NodeCounts};
pub use node::{
    edit_fingerprint, ChangingNode, CompileError, ErrorPosition, ErrorProblemNode, ErrorSolutionNode,
    Instruction, NodeId, NodePayload, ProblemNode, SolutionNode, Status,
};
pub use snapshot::{GraphSnapshot, SnapshotStore};
