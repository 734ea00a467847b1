//! cdot-commit - Commit replay
//!
//! Turns the edit sets planned from a changing graph into one commit each on
//! a fresh branch. Sets are picked one after the other so that later sets
//! land on top of earlier ones, with conflicts handed to a resolver.
//!
//! # Example
//!
//! ```rust,ignore
//! use cdot_commit::{commit_edits, CommitConfig, SideResolver};
//!
//! let repo = git2::Repository::open(&root)?;
//! let config = CommitConfig::new("migration", "cdot", "cdot@localhost");
//! let summary = commit_edits(&repo, &edit_sets, &config, &mut SideResolver::Theirs)?;
//! println!("{} commits", summary.commits.len());
//! ```

#![warn(unreachable_pub)]

pub mod conflict;
pub mod error;
pub mod replay;

pub use conflict::{ConflictResolver, SideResolver, CONFLICT_MARKER};
pub use error::{CommitError, Result};
pub use replay::{commit_edits, reset_repo, CommitConfig, ReplaySummary, SCRATCH_BRANCH};
