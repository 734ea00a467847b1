//! cdot-blocks - Syntax-block graph
//!
//! Parses source files with tree-sitter into a graph of blocks (imports,
//! classes, methods, constructors, fields) and keeps block identities
//! stable while the files are edited underneath it.
//!
//! # Example
//!
//! ```rust,ignore
//! use cdot_blocks::{BlockGraph, BlockKind};
//!
//! let graph = BlockGraph::build(&["src/Program.cs"])?;
//! for method in graph.get_nodes_by_kind(BlockKind::Method) {
//!     println!("{} {}:{}", method.id, method.file.display(), method.start.row);
//! }
//! ```

#![warn(unreachable_pub)]

pub mod block;
pub mod error;
pub mod graph;
pub mod language;
mod parse;
pub mod text;
mod update;

pub use block::{same_file, BlockEdit, BlockId, BlockKind, Position, Relation, SourceBlock};
pub use error::BlockError;
pub use graph::BlockGraph;
pub use language::Language;
pub use text::{contains_ignoring_whitespace, normalize_code, read_source, CommentStyle};
