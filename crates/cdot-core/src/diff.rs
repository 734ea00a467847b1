//! Edits from diff-style answers
//!
//! Text generators answer with loose diffs: runs of `-` and `+` lines, with
//! anything else (prose, code fences, `---`/`+++` headers) in between. Each
//! run becomes a replacement applied to the block's current text.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use cdot_blocks::{BlockEdit, BlockGraph, SourceBlock};
use cdot_graph::Instruction;
use tracing::warn;

use crate::generate::EditGenerator;

/// One run of removed and added lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub before: String,
    pub after: String,
}

fn is_change_line(line: &str) -> bool {
    let line = line.trim();
    (line.starts_with('-') && !line.starts_with("---")) || (line.starts_with('+') && !line.starts_with("+++"))
}

/// Split a diff into hunks of consecutive change lines
#[must_use]
pub fn parse_diff(diff: &str) -> Vec<DiffHunk> {
    let mut hunks = Vec::new();
    let mut current: Option<DiffHunk> = None;
    for line in diff.lines() {
        if !is_change_line(line) {
            hunks.extend(current.take());
            continue;
        }
        let hunk = current.get_or_insert_with(|| DiffHunk {
            before: String::new(),
            after: String::new(),
        });
        let line = line.trim_start();
        let (target, content) = match line.split_at(1) {
            ("-", rest) => (&mut hunk.before, rest),
            (_, rest) => (&mut hunk.after, rest),
        };
        if !target.is_empty() {
            target.push('\n');
        }
        target.push_str(content);
    }
    hunks.extend(current);
    hunks
}

/// Build the edit of `block` described by `diff`
///
/// Hunks are applied in order to the block text, with leading whitespace of
/// both sides trimmed so indentation differences do not matter. A diff with
/// no hunk gives the empty edit.
///
/// # Errors
/// Returns an error when a hunk only adds lines, since there is no anchor
/// telling where they go
pub fn edit_from_diff(block: &SourceBlock, diff: &str) -> anyhow::Result<BlockEdit> {
    let hunks = parse_diff(diff);
    if hunks.is_empty() {
        return Ok(BlockEdit::empty(block.file.clone(), block.id));
    }

    let mut after = block.text.clone();
    for hunk in hunks {
        let before = hunk.before.trim_start();
        if before.trim().is_empty() {
            bail!("code was added to block {} without an anchor to place it", block.id);
        }
        if !after.contains(before) {
            warn!(block = %block.id, "diff removes text that is not in the block");
        }
        after = after.replace(before, hunk.after.trim_start());
    }
    Ok(BlockEdit::new(block.file.clone(), block.id, block.text.clone(), after))
}

/// Produces a diff for an instruction, typically by asking a model
pub trait DiffSource {
    /// # Errors
    /// Returns an error when no answer can be obtained
    fn diff_for(&mut self, instruction: &Instruction, block: &SourceBlock) -> anyhow::Result<String>;
}

impl<F> DiffSource for F
where
    F: FnMut(&Instruction, &SourceBlock) -> anyhow::Result<String>,
{
    fn diff_for(&mut self, instruction: &Instruction, block: &SourceBlock) -> anyhow::Result<String> {
        self(instruction, block)
    }
}

/// Diffs stored as `<block id>.diff` files in one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDirectory {
    dir: PathBuf,
}

impl DiffDirectory {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    #[must_use]
    pub fn path_for(&self, block: &SourceBlock) -> PathBuf {
        self.dir.join(format!("{}.diff", block.id.0))
    }
}

impl DiffSource for DiffDirectory {
    fn diff_for(&mut self, _instruction: &Instruction, block: &SourceBlock) -> anyhow::Result<String> {
        let path = self.path_for(block);
        fs::read_to_string(&path).with_context(|| format!("reading diff {}", path.display()))
    }
}

/// Edit generator backed by a [`DiffSource`]
#[derive(Debug, Clone)]
pub struct DiffEditGenerator<S> {
    source: S,
}

impl<S: DiffSource> DiffEditGenerator<S> {
    #[must_use]
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: DiffSource> EditGenerator for DiffEditGenerator<S> {
    fn get_edit(&mut self, instruction: &Instruction, blocks: &BlockGraph) -> anyhow::Result<BlockEdit> {
        let block = blocks
            .get_node(instruction.block_id)
            .ok_or_else(|| anyhow!("instruction targets unknown block {}", instruction.block_id))?;
        let diff = self.source.diff_for(instruction, block)?;
        edit_from_diff(block, &diff)
    }
}
