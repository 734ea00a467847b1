//! Instruction and edit generation
//!
//! Solving a problem takes two steps: an [`InstructionGenerator`] picks the
//! block to change and says what to do with it, then an [`EditGenerator`]
//! turns that instruction into a concrete [`BlockEdit`]. Both are seams for
//! text-generation backends; the implementations here are deterministic.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use cdot_blocks::{BlockEdit, BlockGraph, BlockId, SourceBlock};
use cdot_graph::{ChangingGraph, CompileError, Instruction, NodeId};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Everything known about a problem when asking for an instruction
#[derive(Debug, Clone)]
pub struct InstructionRequest<'a> {
    pub problem: NodeId,
    /// What the whole run is trying to achieve
    pub goal: &'a str,
    pub error: &'a CompileError,
    /// Edits of the solution that caused the problem, empty for roots
    pub cause: &'a [BlockEdit],
    /// Innermost block covering the error line
    pub located: Option<BlockId>,
    /// Blocks of the error's file and of the causing edits, by id
    pub candidates: Vec<&'a SourceBlock>,
    /// Diffs of the attempts already rejected for this problem
    pub failed_attempts: Vec<String>,
}

impl<'a> InstructionRequest<'a> {
    /// Gather the request for `problem`
    ///
    /// # Errors
    /// Returns [`OrchestratorError::InvalidNode`] when `problem` is not a
    /// problem node
    pub fn build(graph: &'a ChangingGraph, blocks: &'a BlockGraph, problem: NodeId, goal: &'a str) -> Result<Self> {
        let node = graph.node(problem)?;
        let error = node.payload.error().ok_or_else(|| OrchestratorError::InvalidNode {
            node: problem,
            action: "solved",
            reason: format!("it is a {}", node.payload.type_name()),
        })?;

        // several causes are possible; the first one is shown
        let cause = graph
            .get_parent_nodes(problem)
            .into_iter()
            .find_map(|p| graph.get_node(p).and_then(|n| n.payload.edits()))
            .unwrap_or(&[]);

        let mut candidates: Vec<&SourceBlock> = blocks.nodes_in_file(&error.file);
        for edit in cause {
            if let Some(block) = blocks.get_node(edit.block_id) {
                if !candidates.iter().any(|c| c.id == block.id) {
                    candidates.push(block);
                }
            }
        }
        candidates.sort_by_key(|b| b.id);

        let failed_attempts = graph
            .get_failed_solution_to_problem(problem)
            .into_iter()
            .filter_map(|id| graph.get_node(id).and_then(|n| n.payload.edits()))
            .enumerate()
            .map(|(i, edits)| {
                let diff: String = edits.iter().map(BlockEdit::to_diff).collect();
                format!("Attempt {i}\n{diff}")
            })
            .collect();

        Ok(Self {
            problem,
            goal,
            error,
            cause,
            located: blocks.block_at(&error.file, error.position.start_row).map(|b| b.id),
            candidates,
            failed_attempts,
        })
    }
}

/// Chooses the block to change and what to do with it
pub trait InstructionGenerator {
    /// # Errors
    /// Returns an error when no instruction can be produced; the problem is
    /// then recorded as unsolvable
    fn get_instruction(&mut self, request: &InstructionRequest<'_>) -> anyhow::Result<Instruction>;
}

impl<F> InstructionGenerator for F
where
    F: FnMut(&InstructionRequest<'_>) -> anyhow::Result<Instruction>,
{
    fn get_instruction(&mut self, request: &InstructionRequest<'_>) -> anyhow::Result<Instruction> {
        self(request)
    }
}

/// Turns an instruction into an edit of its block
pub trait EditGenerator {
    /// # Errors
    /// Returns an error when no edit can be produced
    fn get_edit(&mut self, instruction: &Instruction, blocks: &BlockGraph) -> anyhow::Result<BlockEdit>;

    /// All edits of one solution; a single edit unless overridden
    ///
    /// # Errors
    /// Returns an error when no edit can be produced
    fn get_edits(&mut self, instruction: &Instruction, blocks: &BlockGraph) -> anyhow::Result<Vec<BlockEdit>> {
        Ok(vec![self.get_edit(instruction, blocks)?])
    }
}

impl<F> EditGenerator for F
where
    F: FnMut(&Instruction, &BlockGraph) -> anyhow::Result<BlockEdit>,
{
    fn get_edit(&mut self, instruction: &Instruction, blocks: &BlockGraph) -> anyhow::Result<BlockEdit> {
        self(instruction, blocks)
    }
}

/// Always answers with the same instruction
#[derive(Debug, Clone)]
pub struct HardCodedInstructionGenerator(pub Instruction);

impl InstructionGenerator for HardCodedInstructionGenerator {
    fn get_instruction(&mut self, _request: &InstructionRequest<'_>) -> anyhow::Result<Instruction> {
        Ok(self.0.clone())
    }
}

/// Always answers with the same edits
#[derive(Debug, Clone)]
pub struct HardCodedEditGenerator {
    edits: Vec<BlockEdit>,
}

impl HardCodedEditGenerator {
    #[must_use]
    pub fn new(edit: BlockEdit) -> Self {
        Self { edits: vec![edit] }
    }

    #[must_use]
    pub fn many(edits: Vec<BlockEdit>) -> Self {
        Self { edits }
    }
}

impl EditGenerator for HardCodedEditGenerator {
    fn get_edit(&mut self, instruction: &Instruction, _blocks: &BlockGraph) -> anyhow::Result<BlockEdit> {
        self.edits
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("no edit given for block {}", instruction.block_id))
    }

    fn get_edits(&mut self, instruction: &Instruction, _blocks: &BlockGraph) -> anyhow::Result<Vec<BlockEdit>> {
        if self.edits.is_empty() {
            bail!("no edit given for block {}", instruction.block_id);
        }
        Ok(self.edits.clone())
    }
}

/// Hands out a fixed list of edits in order
#[derive(Debug, Clone, Default)]
pub struct SequenceEditGenerator {
    edits: VecDeque<BlockEdit>,
}

impl SequenceEditGenerator {
    #[must_use]
    pub fn new(edits: impl IntoIterator<Item = BlockEdit>) -> Self {
        Self {
            edits: edits.into_iter().collect(),
        }
    }

    /// Load the edits from a JSON array
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let edits: Vec<BlockEdit> =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::new(edits))
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.edits.len()
    }
}

impl EditGenerator for SequenceEditGenerator {
    fn get_edit(&mut self, instruction: &Instruction, _blocks: &BlockGraph) -> anyhow::Result<BlockEdit> {
        self.edits
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted edit left for block {}", instruction.block_id))
    }
}

/// One remembered answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Block to change; the block at the error line when absent
    #[serde(default)]
    pub block: Option<BlockId>,
    pub directive: String,
}

/// Answers from a memory file keyed by error or by node id
///
/// The error key is the error text with quotes and spaces removed, then the
/// file and the zero-based line, joined by `_`. When the error key is not
/// found the decimal node id is tried.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInstructionGenerator {
    memory: HashMap<String, MemoryEntry>,
}

impl ScriptedInstructionGenerator {
    #[must_use]
    pub fn new(memory: HashMap<String, MemoryEntry>) -> Self {
        Self { memory }
    }

    /// Load the memory from a JSON object
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let memory = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::new(memory))
    }

    /// Memory key of an error
    #[must_use]
    pub fn error_key(error: &CompileError) -> String {
        let text: String = error.text.chars().filter(|c| *c != '\'' && *c != ' ').collect();
        format!("{text}_{}_{}", error.file.display(), error.position.start_row)
    }
}

impl InstructionGenerator for ScriptedInstructionGenerator {
    fn get_instruction(&mut self, request: &InstructionRequest<'_>) -> anyhow::Result<Instruction> {
        let key = Self::error_key(request.error);
        let Some(entry) = self
            .memory
            .get(&key)
            .or_else(|| self.memory.get(&request.problem.to_string()))
        else {
            bail!("no remembered instruction for {key} or node {}", request.problem);
        };
        let block = entry
            .block
            .or(request.located)
            .ok_or_else(|| anyhow!("no block at {}", request.error))?;
        Ok(Instruction::new(block, request.error.file.clone(), entry.directive.clone()))
    }
}

/// Answers stored as `<node id>.txt` files in one directory, in the format
/// read by [`parse_block_answer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerDirectory {
    dir: PathBuf,
}

impl AnswerDirectory {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl InstructionGenerator for AnswerDirectory {
    fn get_instruction(&mut self, request: &InstructionRequest<'_>) -> anyhow::Result<Instruction> {
        let path = self.dir.join(format!("{}.txt", request.problem.0));
        let answer = fs::read_to_string(&path).with_context(|| format!("reading answer {}", path.display()))?;
        parse_block_answer(&answer, &request.error.file)
    }
}

/// Parse a `Block: <id>` answer followed by the directive lines
///
/// Lines after the block line keep only what follows their first `:`.
///
/// # Errors
/// Returns an error when no block line is present or the id is not a number
pub fn parse_block_answer(answer: &str, file: &Path) -> anyhow::Result<Instruction> {
    let lines: Vec<&str> = answer.trim().lines().collect();
    let index = lines
        .iter()
        .position(|l| l.trim().starts_with("Block:"))
        .ok_or_else(|| anyhow!("no 'Block:' line in answer"))?;
    let id = lines[index]
        .trim()
        .trim_start_matches("Block:")
        .trim()
        .parse::<u64>()
        .context("block id is not a number")?;
    let directive = lines[index + 1..]
        .iter()
        .map(|l| l.split_once(':').map_or(l.trim(), |(_, rest)| rest.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Instruction::new(BlockId(id), file, directive.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdot_graph::{ErrorPosition, Status};

    fn error() -> CompileError {
        CompileError::new("'Foo' does not exist", "A.cs", "app", ErrorPosition::new(3, 0, 3, 0))
    }

    #[test]
    fn request_collects_cause_and_failed_attempts() {
        let mut graph = ChangingGraph::new();
        let blocks = BlockGraph::new();
        let root = graph.add_problem_node(error(), Status::Handled);
        let cause_edit = BlockEdit::new("A.cs", BlockId(4), "a", "b");
        let cause = graph.add_solution_node(Instruction::new(BlockId(4), "A.cs", "x"), vec![cause_edit.clone()], Status::Handled);
        let problem = graph.add_problem_node(error().shifted(1), Status::Pending);
        graph.add_edge(root, cause).unwrap();
        graph.add_edge(cause, problem).unwrap();
        let failed = graph.add_solution_node(
            Instruction::new(BlockId(4), "A.cs", "y"),
            vec![BlockEdit::new("A.cs", BlockId(4), "b", "c")],
            Status::Failed,
        );
        graph.add_edge(problem, failed).unwrap();

        let request = InstructionRequest::build(&graph, &blocks, problem, "goal").unwrap();
        assert_eq!(request.cause, &[cause_edit][..]);
        assert_eq!(request.failed_attempts, vec!["Attempt 0\n-b\n+c\n".to_string()]);
        assert!(request.located.is_none());

        let err = InstructionRequest::build(&graph, &blocks, cause, "goal").unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidNode { .. }));
    }

    #[test]
    fn scripted_memory_prefers_error_key_then_node_id() {
        let mut memory = HashMap::new();
        memory.insert(
            "Foodoesnotexist_A.cs_3".to_string(),
            MemoryEntry {
                block: Some(BlockId(2)),
                directive: "rename".into(),
            },
        );
        memory.insert(
            "1".to_string(),
            MemoryEntry {
                block: None,
                directive: "by id".into(),
            },
        );
        let mut generator = ScriptedInstructionGenerator::new(memory);

        let e = error();
        let other = e.shifted(1);
        let mut request = InstructionRequest {
            problem: NodeId(0),
            goal: "",
            error: &e,
            cause: &[],
            located: Some(BlockId(9)),
            candidates: Vec::new(),
            failed_attempts: Vec::new(),
        };
        let by_error = generator.get_instruction(&request).unwrap();
        assert_eq!(by_error.block_id, BlockId(2));
        assert_eq!(by_error.directive, "rename");

        request.error = &other;
        request.problem = NodeId(1);
        let by_id = generator.get_instruction(&request).unwrap();
        assert_eq!(by_id.block_id, BlockId(9));
        assert_eq!(by_id.directive, "by id");

        request.problem = NodeId(2);
        assert!(generator.get_instruction(&request).is_err());
    }

    #[test]
    fn sequence_generator_runs_out() {
        let edit = BlockEdit::new("A.cs", BlockId(1), "a", "b");
        let mut generator = SequenceEditGenerator::new([edit.clone()]);
        let instruction = Instruction::new(BlockId(1), "A.cs", "x");
        let blocks = BlockGraph::new();
        assert_eq!(generator.get_edit(&instruction, &blocks).unwrap(), edit);
        assert!(generator.get_edit(&instruction, &blocks).is_err());
        assert_eq!(generator.remaining(), 0);
    }

    #[test]
    fn block_answer_is_parsed() {
        let answer = "Thinking...\nBlock: 12\nStep 1: rename Foo to Bar\nthen rebuild\n";
        let instruction = parse_block_answer(answer, Path::new("A.cs")).unwrap();
        assert_eq!(instruction.block_id, BlockId(12));
        assert_eq!(instruction.directive, "rename Foo to Bar\nthen rebuild");
        assert!(parse_block_answer("no block here", Path::new("A.cs")).is_err());
    }

    #[test]
    fn answer_directory_reads_the_node_answer() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0.txt"), "Block: 7\nChange: drop Foo\n").unwrap();
        let mut graph = ChangingGraph::new();
        let blocks = BlockGraph::new();
        let root = graph.add_problem_node(error(), Status::Pending);
        let other = graph.add_problem_node(error().shifted(2), Status::Pending);
        let mut generator = AnswerDirectory::new(dir.path());

        let request = InstructionRequest::build(&graph, &blocks, root, "").unwrap();
        let instruction = generator.get_instruction(&request).unwrap();
        assert_eq!(instruction.block_id, BlockId(7));
        assert_eq!(instruction.directive, "drop Foo");
        assert_eq!(instruction.file, PathBuf::from("A.cs"));

        let request = InstructionRequest::build(&graph, &blocks, other, "").unwrap();
        assert!(generator.get_instruction(&request).is_err());
    }
}
