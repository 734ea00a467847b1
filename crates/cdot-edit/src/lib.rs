//! cdot-edit - Transactional file mutation
//!
//! Applies [`BlockEdit`](cdot_blocks::BlockEdit)s to files on disk while
//! keeping the [`BlockGraph`](cdot_blocks::BlockGraph) in step, and reverts
//! both together.
//!
//! ```rust,ignore
//! let mut engine = EditEngine::new();
//! engine.apply_change(&mut graph, &edits)?;
//! let broken = EditEngine::with_applied(&mut graph, &candidate, |g| g.has_syntax_errors())??;
//! engine.revert_change(&mut graph)?;
//! ```

#![warn(unreachable_pub)]

pub mod engine;
pub mod error;
pub mod splice;

pub use engine::EditEngine;
pub use error::EditError;
pub use splice::splice_block;
