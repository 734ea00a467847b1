//! Node payloads of the changing graph

use std::fmt;
use std::path::PathBuf;

use cdot_blocks::{BlockEdit, BlockId};
use serde::{Deserialize, Serialize};

/// Node identifier, assigned in insertion order and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Handled,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Pending => "pending",
            Status::Handled => "handled",
            Status::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where an error was reported: rows and columns, zero-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ErrorPosition {
    pub start_row: usize,
    pub start_column: usize,
    pub end_row: usize,
    pub end_column: usize,
}

impl ErrorPosition {
    #[must_use]
    pub fn new(start_row: usize, start_column: usize, end_row: usize, end_column: usize) -> Self {
        Self {
            start_row,
            start_column,
            end_row,
            end_column,
        }
    }

    /// Same span moved down by `rows`
    #[must_use]
    pub fn shifted(&self, rows: usize) -> Self {
        Self {
            start_row: self.start_row + rows,
            end_row: self.end_row + rows,
            ..*self
        }
    }
}

/// An error reported by the analyzer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompileError {
    pub text: String,
    pub file: PathBuf,
    pub project: String,
    pub position: ErrorPosition,
}

impl CompileError {
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        file: impl Into<PathBuf>,
        project: impl Into<String>,
        position: ErrorPosition,
    ) -> Self {
        Self {
            text: text.into(),
            file: file.into(),
            project: project.into(),
            position,
        }
    }

    /// Same error reported `rows` lines further down
    #[must_use]
    pub fn shifted(&self, rows: usize) -> Self {
        Self {
            position: self.position.shifted(rows),
            ..self.clone()
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file.display(),
            self.position.start_row,
            self.position.start_column,
            self.text
        )
    }
}

/// What to change in which block, in words
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    pub block_id: BlockId,
    pub file: PathBuf,
    pub directive: String,
}

impl Instruction {
    #[must_use]
    pub fn new(block_id: BlockId, file: impl Into<PathBuf>, directive: impl Into<String>) -> Self {
        Self {
            block_id,
            file: file.into(),
            directive: directive.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemNode {
    pub error: CompileError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionNode {
    pub instruction: Instruction,
    pub edits: Vec<BlockEdit>,
}

/// A problem no solution could be generated for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorProblemNode {
    pub error: CompileError,
    pub error_text: String,
    pub suspected_instruction: Option<Instruction>,
    pub suspected_edits: Option<Vec<BlockEdit>>,
}

/// A solution that broke while being applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSolutionNode {
    pub instruction: Instruction,
    pub edits: Vec<BlockEdit>,
    pub error_text: String,
}

/// Node variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum NodePayload {
    Problem(ProblemNode),
    Solution(SolutionNode),
    ErrorProblem(ErrorProblemNode),
    ErrorSolution(ErrorSolutionNode),
}

impl NodePayload {
    #[must_use]
    pub fn problem(error: CompileError) -> Self {
        Self::Problem(ProblemNode { error })
    }

    #[must_use]
    pub fn solution(instruction: Instruction, edits: Vec<BlockEdit>) -> Self {
        Self::Solution(SolutionNode { instruction, edits })
    }

    /// Error carried by problem variants
    #[must_use]
    pub fn error(&self) -> Option<&CompileError> {
        match self {
            Self::Problem(p) => Some(&p.error),
            Self::ErrorProblem(p) => Some(&p.error),
            _ => None,
        }
    }

    /// Edits carried by solution variants
    #[must_use]
    pub fn edits(&self) -> Option<&[BlockEdit]> {
        match self {
            Self::Solution(s) => Some(&s.edits),
            Self::ErrorSolution(s) => Some(&s.edits),
            _ => None,
        }
    }

    /// Instruction carried by solution variants
    #[must_use]
    pub fn instruction(&self) -> Option<&Instruction> {
        match self {
            Self::Solution(s) => Some(&s.instruction),
            Self::ErrorSolution(s) => Some(&s.instruction),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_problem(&self) -> bool {
        matches!(self, Self::Problem(_) | Self::ErrorProblem(_))
    }

    #[inline]
    #[must_use]
    pub fn is_solution(&self) -> bool {
        matches!(self, Self::Solution(_) | Self::ErrorSolution(_))
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Problem(_) => "problem",
            Self::Solution(_) => "solution",
            Self::ErrorProblem(_) => "error_problem",
            Self::ErrorSolution(_) => "error_solution",
        }
    }
}

/// A node with its id and status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangingNode {
    pub id: NodeId,
    pub status: Status,
    #[serde(flatten)]
    pub payload: NodePayload,
}

/// Content key used to recognise the same edits proposed twice
#[must_use]
pub fn edit_fingerprint(edits: &[BlockEdit]) -> String {
    let mut hasher = blake3::Hasher::new();
    for edit in edits {
        hasher.update(edit.file.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(edit.to_diff().as_bytes());
        hasher.update(b"\0");
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error() -> CompileError {
        CompileError::new("X does not exist", "A.cs", "app", ErrorPosition::new(3, 4, 3, 9))
    }

    #[test]
    fn shifted_moves_rows_only() {
        let moved = error().shifted(2);
        assert_eq!(moved.position, ErrorPosition::new(5, 4, 5, 9));
        assert_eq!(moved.text, "X does not exist");
    }

    #[test]
    fn payload_serializes_with_tag() {
        let node = ChangingNode {
            id: NodeId(0),
            status: Status::Pending,
            payload: NodePayload::problem(error()),
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["node_type"], "problem");
        assert_eq!(json["status"], "pending");
        let back: ChangingNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn fingerprint_depends_on_content() {
        let a = BlockEdit::new("A.cs", BlockId(1), "int a;", "long a;");
        let b = BlockEdit::new("A.cs", BlockId(1), "int a;", "short a;");
        assert_eq!(edit_fingerprint(&[a.clone()]), edit_fingerprint(&[a.clone()]));
        assert_ne!(edit_fingerprint(&[a]), edit_fingerprint(&[b]));
    }
}
