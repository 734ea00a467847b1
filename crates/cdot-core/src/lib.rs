//! cdot-core - Resolution loop
//!
//! Starting from one error, repeatedly asks for a solution, checks it under
//! a scoped application and records problems and solutions in the changing
//! graph until no error is left. Also holds the run configuration, the
//! analyzer and generator seams, and the graph post-processing used before
//! committing.
//!
//! # Example
//!
//! ```rust,ignore
//! use cdot_core::{Orchestrator, ScriptedAnalyzer, SequenceEditGenerator, ScriptedInstructionGenerator};
//!
//! let blocks = cdot_blocks::BlockGraph::build(&config.source_files()?)?;
//! let mut orchestrator = Orchestrator::new(blocks, analyzer, instructions, edits)
//!     .with_restrictions(config.restrictions.clone())
//!     .with_retry(config.retry.policy());
//! orchestrator.run_from_error(initial)?;
//! ```

#![warn(unreachable_pub)]

pub mod analyzer;
pub mod config;
pub mod diff;
pub mod error;
pub mod generate;
pub mod observer;
pub mod orchestrator;
pub mod plan;
pub mod retry;
pub mod validate;

pub use analyzer::{dedup_by_line, Analyzer, CommandAnalyzer, ScriptedAnalyzer};
pub use config::{
    AnalyzerConfig, CommitSettings, GeneratorConfig, InitialChange, ResumeNode, RestrictionOptions, RetryConfig,
    RunConfig,
};
pub use diff::{edit_from_diff, parse_diff, DiffDirectory, DiffEditGenerator, DiffHunk, DiffSource};
pub use error::{OrchestratorError, Result};
pub use generate::{
    parse_block_answer, AnswerDirectory, EditGenerator, HardCodedEditGenerator, HardCodedInstructionGenerator,
    InstructionGenerator, InstructionRequest, MemoryEntry, ScriptedInstructionGenerator, SequenceEditGenerator,
};
pub use observer::Observer;
pub use orchestrator::Orchestrator;
pub use plan::{optimize_graph, plan_commits};
pub use retry::RetryPolicy;
pub use validate::{consecutive_errors, does_solution_fix_problem, is_error_removed};
