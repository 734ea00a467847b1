//! Changing graph
//!
//! Nodes live in an ordered arena keyed by [`NodeId`]; adjacency is a
//! `petgraph` graph map over the same ids. Edges run problem to the
//! solutions tried for it, and solution to the problems it caused.

use std::collections::BTreeMap;
use std::path::Path;

use cdot_blocks::{same_file, BlockEdit, BlockId};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use tracing::debug;

use crate::error::GraphError;
use crate::node::{
    edit_fingerprint, ChangingNode, CompileError, ErrorProblemNode, ErrorSolutionNode, Instruction,
    NodeId, NodePayload, ProblemNode, Status,
};

/// Per-variant node counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCounts {
    pub problems: usize,
    pub solutions: usize,
    pub error_problems: usize,
    pub error_solutions: usize,
}

/// Causal graph of problems and solutions
#[derive(Debug, Clone, Default)]
pub struct ChangingGraph {
    pub(crate) nodes: BTreeMap<NodeId, ChangingNode>,
    pub(crate) edges: DiGraphMap<NodeId, ()>,
    pub(crate) next_id: u64,
}

impl ChangingGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its freshly assigned id
    pub fn insert(&mut self, payload: NodePayload, status: Status) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        debug!(node = %id, kind = payload.type_name(), %status, "node added");
        self.nodes.insert(id, ChangingNode { id, status, payload });
        self.edges.add_node(id);
        id
    }

    pub fn add_problem_node(&mut self, error: CompileError, status: Status) -> NodeId {
        self.insert(NodePayload::problem(error), status)
    }

    pub fn add_solution_node(&mut self, instruction: Instruction, edits: Vec<BlockEdit>, status: Status) -> NodeId {
        self.insert(NodePayload::solution(instruction, edits), status)
    }

    #[inline]
    #[must_use]
    pub fn get_node(&self, id: NodeId) -> Option<&ChangingNode> {
        self.nodes.get(&id)
    }

    /// Look up a node, failing when unknown
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownNode`]
    pub fn node(&self, id: NodeId) -> Result<&ChangingNode, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut ChangingNode, GraphError> {
        self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))
    }

    /// All nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &ChangingNode> {
        self.nodes.values()
    }

    /// All edges, sorted
    #[must_use]
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut edges: Vec<_> = self.edges.all_edges().map(|(a, b, _)| (a, b)).collect();
        edges.sort();
        edges
    }

    /// # Errors
    /// Returns [`GraphError::UnknownNode`]
    pub fn mark_node_as(&mut self, id: NodeId, status: Status) -> Result<(), GraphError> {
        self.node_mut(id)?.status = status;
        debug!(node = %id, %status, "node marked");
        Ok(())
    }

    /// # Errors
    /// Returns [`GraphError::UnknownNode`] if either end is missing
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.node(from)?;
        self.node(to)?;
        self.edges.add_edge(from, to, ());
        debug!(%from, %to, "edge added");
        Ok(())
    }

    /// Remove an edge, reporting whether it existed
    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) -> bool {
        self.edges.remove_edge(from, to).is_some()
    }

    #[must_use]
    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.contains_edge(from, to)
    }

    /// Remove a node and its edges
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownNode`]
    pub fn remove_node(&mut self, id: NodeId) -> Result<ChangingNode, GraphError> {
        let node = self.nodes.remove(&id).ok_or(GraphError::UnknownNode(id))?;
        self.edges.remove_node(id);
        debug!(node = %id, "node removed");
        Ok(node)
    }

    /// Nodes without outgoing edges
    #[must_use]
    pub fn get_leaves(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .copied()
            .filter(|id| self.edges.neighbors_directed(*id, Direction::Outgoing).next().is_none())
            .collect()
    }

    /// Nodes without incoming edges
    #[must_use]
    pub fn get_roots(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .copied()
            .filter(|id| self.edges.neighbors_directed(*id, Direction::Incoming).next().is_none())
            .collect()
    }

    #[must_use]
    pub fn get_children(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Outgoing)
    }

    #[must_use]
    pub fn get_parent_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        if !self.edges.contains_node(id) {
            return Vec::new();
        }
        let mut out: Vec<_> = self.edges.neighbors_directed(id, direction).collect();
        out.sort();
        out
    }

    /// Pending problems and solutions in insertion order
    #[must_use]
    pub fn get_all_pending_nodes(&self) -> Vec<NodeId> {
        self.select(|n| {
            n.status == Status::Pending
                && matches!(n.payload, NodePayload::Problem(_) | NodePayload::Solution(_))
        })
    }

    #[must_use]
    pub fn get_all_pending_problem_nodes(&self) -> Vec<NodeId> {
        self.select(|n| n.status == Status::Pending && matches!(n.payload, NodePayload::Problem(_)))
    }

    #[must_use]
    pub fn get_all_handled_solution_nodes(&self) -> Vec<NodeId> {
        self.select(|n| n.status == Status::Handled && matches!(n.payload, NodePayload::Solution(_)))
    }

    /// Failed attempts recorded under a problem
    #[must_use]
    pub fn get_failed_solution_to_problem(&self, problem: NodeId) -> Vec<NodeId> {
        self.get_children(problem)
            .into_iter()
            .filter(|id| {
                self.get_node(*id)
                    .is_some_and(|n| n.payload.is_solution() && n.status == Status::Failed)
            })
            .collect()
    }

    fn select(&self, predicate: impl Fn(&ChangingNode) -> bool) -> Vec<NodeId> {
        self.nodes.values().filter(|n| predicate(n)).map(|n| n.id).collect()
    }

    /// Problem reporting the same text at the same line of the same file
    ///
    /// Problems already marked unsolvable are not matched.
    #[must_use]
    pub fn find_same_problem(&self, file: &Path, line: usize, text: &str) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|n| match &n.payload {
                NodePayload::Problem(p) => {
                    p.error.position.start_row == line && p.error.text == text && same_file(&p.error.file, file)
                }
                _ => false,
            })
            .map(|n| n.id)
    }

    /// Non-failed solution with the same target block and the same edits
    #[must_use]
    pub fn find_same_solution(&self, file: &Path, block_id: BlockId, edits: &[BlockEdit]) -> Option<NodeId> {
        let fingerprint = edit_fingerprint(edits);
        self.nodes
            .values()
            .find(|n| match &n.payload {
                NodePayload::Solution(s) if n.status != Status::Failed => {
                    s.instruction.block_id == block_id
                        && same_file(&s.instruction.file, file)
                        && edit_fingerprint(&s.edits) == fingerprint
                }
                _ => false,
            })
            .map(|n| n.id)
    }

    /// Mark a problem as impossible to solve
    ///
    /// # Errors
    /// Returns [`GraphError::NotAProblem`] for solution nodes
    pub fn error_on_problem_node(
        &mut self,
        id: NodeId,
        error_text: impl Into<String>,
        suspected_instruction: Option<Instruction>,
        suspected_edits: Option<Vec<BlockEdit>>,
    ) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        let error = node.payload.error().cloned().ok_or(GraphError::NotAProblem(id))?;
        node.payload = NodePayload::ErrorProblem(ErrorProblemNode {
            error,
            error_text: error_text.into(),
            suspected_instruction,
            suspected_edits,
        });
        node.status = Status::Failed;
        debug!(node = %id, "problem marked as error");
        Ok(())
    }

    /// Mark a solution as broken
    ///
    /// # Errors
    /// Returns [`GraphError::NotASolution`] for problem nodes
    pub fn error_on_solution_node(&mut self, id: NodeId, error_text: impl Into<String>) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        let NodePayload::Solution(solution) = &node.payload else {
            return Err(GraphError::NotASolution(id));
        };
        node.payload = NodePayload::ErrorSolution(ErrorSolutionNode {
            instruction: solution.instruction.clone(),
            edits: solution.edits.clone(),
            error_text: error_text.into(),
        });
        node.status = Status::Failed;
        Ok(())
    }

    /// Turn a problem (or failed problem) back into a pending problem
    ///
    /// # Errors
    /// Returns [`GraphError::NotAProblem`] for solution nodes
    pub fn update_problem_node(&mut self, id: NodeId, error: Option<CompileError>) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        let current = node.payload.error().cloned().ok_or(GraphError::NotAProblem(id))?;
        node.payload = NodePayload::Problem(ProblemNode {
            error: error.unwrap_or(current),
        });
        node.status = Status::Pending;
        Ok(())
    }

    #[must_use]
    pub fn count_node_types(&self) -> NodeCounts {
        let mut counts = NodeCounts::default();
        for node in self.nodes.values() {
            match node.payload {
                NodePayload::Problem(_) => counts.problems += 1,
                NodePayload::Solution(_) => counts.solutions += 1,
                NodePayload::ErrorProblem(_) => counts.error_problems += 1,
                NodePayload::ErrorSolution(_) => counts.error_solutions += 1,
            }
        }
        counts
    }

    /// Number of edges on the shortest path, if any
    #[must_use]
    pub fn get_shortest_distance(&self, from: NodeId, to: NodeId) -> Option<usize> {
        if !self.edges.contains_node(from) {
            return None;
        }
        petgraph::algo::dijkstra(&self.edges, from, Some(to), |_| 1usize)
            .get(&to)
            .copied()
    }

    /// Nodes exactly `distance` edges away from `root`
    #[must_use]
    pub fn get_nodes_at_distance(&self, root: NodeId, distance: usize) -> Vec<NodeId> {
        if !self.edges.contains_node(root) {
            return Vec::new();
        }
        let mut out: Vec<_> = petgraph::algo::dijkstra(&self.edges, root, None, |_| 1usize)
            .into_iter()
            .filter(|(_, d)| *d == distance)
            .map(|(id, _)| id)
            .collect();
        out.sort();
        out
    }

    /// Depth of the graph counted from its roots, in layers
    #[must_use]
    pub fn get_number_of_layers(&self) -> usize {
        let mut depth: BTreeMap<NodeId, usize> = BTreeMap::new();
        for root in self.get_roots() {
            for (id, d) in petgraph::algo::dijkstra(&self.edges, root, None, |_| 1usize) {
                depth.entry(id).and_modify(|e| *e = (*e).min(d)).or_insert(d);
            }
        }
        depth.values().max().map_or(0, |max| max + 1)
    }

    #[inline]
    #[must_use]
    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn number_of_edges(&self) -> usize {
        self.edges.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ErrorPosition;

    fn error(line: usize) -> CompileError {
        CompileError::new("missing", "A.cs", "app", ErrorPosition::new(line, 0, line, 4))
    }

    fn instruction() -> Instruction {
        Instruction::new(BlockId(1), "A.cs", "rename")
    }

    fn edit(after: &str) -> BlockEdit {
        BlockEdit::new("A.cs", BlockId(1), "int a;", after)
    }

    #[test]
    fn ids_are_monotonic_and_not_reused() {
        let mut g = ChangingGraph::new();
        let a = g.add_problem_node(error(1), Status::Pending);
        let b = g.add_problem_node(error(2), Status::Pending);
        g.remove_node(b).unwrap();
        let c = g.add_problem_node(error(3), Status::Pending);
        assert_eq!((a, c), (NodeId(0), NodeId(2)));
    }

    #[test]
    fn leaves_children_and_parents() {
        let mut g = ChangingGraph::new();
        let p = g.add_problem_node(error(1), Status::Handled);
        let s = g.add_solution_node(instruction(), vec![edit("long a;")], Status::Handled);
        let q = g.add_problem_node(error(5), Status::Pending);
        g.add_edge(p, s).unwrap();
        g.add_edge(s, q).unwrap();

        assert_eq!(g.get_leaves(), vec![q]);
        assert_eq!(g.get_children(p), vec![s]);
        assert_eq!(g.get_parent_nodes(q), vec![s]);
        assert_eq!(g.get_all_pending_nodes(), vec![q]);
        assert_eq!(g.get_shortest_distance(p, q), Some(2));
        assert_eq!(g.get_number_of_layers(), 3);
        assert_eq!(g.get_nodes_at_distance(p, 1), vec![s]);
    }

    #[test]
    fn add_edge_requires_both_nodes() {
        let mut g = ChangingGraph::new();
        let p = g.add_problem_node(error(1), Status::Pending);
        assert!(matches!(g.add_edge(p, NodeId(9)), Err(GraphError::UnknownNode(NodeId(9)))));
    }

    #[test]
    fn duplicate_solutions_ignore_failed() {
        let mut g = ChangingGraph::new();
        let failed = g.add_solution_node(instruction(), vec![edit("long a;")], Status::Failed);
        assert_eq!(g.find_same_solution(Path::new("A.cs"), BlockId(1), &[edit("long a;")]), None);

        let ok = g.add_solution_node(instruction(), vec![edit("long a;")], Status::Handled);
        assert_ne!(failed, ok);
        assert_eq!(g.find_same_solution(Path::new("A.cs"), BlockId(1), &[edit("long a;")]), Some(ok));
        assert_eq!(g.find_same_solution(Path::new("A.cs"), BlockId(2), &[edit("long a;")]), None);
    }

    #[test]
    fn same_problem_matches_file_line_and_text() {
        let mut g = ChangingGraph::new();
        let p = g.add_problem_node(error(4), Status::Pending);
        assert_eq!(g.find_same_problem(Path::new("A.cs"), 4, "missing"), Some(p));
        assert_eq!(g.find_same_problem(Path::new("A.cs"), 5, "missing"), None);
        assert_eq!(g.find_same_problem(Path::new("B.cs"), 4, "missing"), None);

        g.error_on_problem_node(p, "gave up", None, None).unwrap();
        assert_eq!(g.find_same_problem(Path::new("A.cs"), 4, "missing"), None);
    }

    #[test]
    fn error_conversions_and_resume() {
        let mut g = ChangingGraph::new();
        let p = g.add_problem_node(error(1), Status::Pending);
        let s = g.add_solution_node(instruction(), vec![edit("long a;")], Status::Pending);

        g.error_on_problem_node(p, "generation failed", Some(instruction()), None).unwrap();
        let node = g.get_node(p).unwrap();
        assert_eq!(node.status, Status::Failed);
        assert!(matches!(node.payload, NodePayload::ErrorProblem(_)));
        assert!(g.get_all_pending_nodes().contains(&s));

        g.error_on_solution_node(s, "broken").unwrap();
        assert!(matches!(g.get_node(s).unwrap().payload, NodePayload::ErrorSolution(_)));
        assert!(matches!(g.error_on_solution_node(p, "x"), Err(GraphError::NotASolution(_))));

        g.update_problem_node(p, None).unwrap();
        let node = g.get_node(p).unwrap();
        assert_eq!(node.status, Status::Pending);
        assert_eq!(node.payload.error(), Some(&error(1)));

        let counts = g.count_node_types();
        assert_eq!((counts.problems, counts.error_solutions), (1, 1));
    }

    #[test]
    fn failed_solutions_of_problem() {
        let mut g = ChangingGraph::new();
        let p = g.add_problem_node(error(1), Status::Pending);
        let f = g.add_solution_node(instruction(), vec![edit("x;")], Status::Failed);
        let ok = g.add_solution_node(instruction(), vec![edit("y;")], Status::Handled);
        g.add_edge(p, f).unwrap();
        g.add_edge(p, ok).unwrap();
        assert_eq!(g.get_failed_solution_to_problem(p), vec![f]);
    }
}
