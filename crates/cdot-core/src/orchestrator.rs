//! The resolution loop
//!
//! Pending problems are taken in insertion order. For each one a solution is
//! generated, tried under a scoped application, and either recorded as
//! failed (then tried again) or applied for good. Applying a solution closes
//! the problems whose errors disappeared and opens one problem per new
//! error, caused by that solution. The loop ends when nothing is pending.

use std::path::PathBuf;

use cdot_blocks::{BlockEdit, BlockGraph};
use cdot_edit::EditEngine;
use cdot_graph::{ChangingGraph, CompileError, Instruction, NodeId, NodePayload, Status};
use tracing::{debug, info, warn};

use crate::analyzer::{dedup_by_line, Analyzer};
use crate::config::RestrictionOptions;
use crate::error::{OrchestratorError, Result};
use crate::generate::{
    EditGenerator, HardCodedEditGenerator, HardCodedInstructionGenerator, InstructionGenerator, InstructionRequest,
};
use crate::observer::Observer;
use crate::plan::optimize_graph;
use crate::retry::RetryPolicy;
use crate::validate::does_solution_fix_problem;

/// Drives problems to solutions
pub struct Orchestrator {
    session: Session,
    instructions: Box<dyn InstructionGenerator>,
    edits: Box<dyn EditGenerator>,
}

/// Everything but the generators, so a handler can borrow both at once
struct Session {
    graph: ChangingGraph,
    blocks: BlockGraph,
    engine: EditEngine,
    analyzer: Box<dyn Analyzer>,
    observer: Observer,
    restrictions: RestrictionOptions,
    retry: RetryPolicy,
    goal: String,
    revert_on_finish: bool,
}

/// Outcome of asking the generators
enum Proposal {
    Ready(Instruction, Vec<BlockEdit>),
    Unsolvable {
        reason: String,
        instruction: Option<Instruction>,
    },
}

/// Outcome of trying a candidate under a scoped application
enum Verdict {
    Valid,
    Invalid,
    /// The block graph refused the edits
    Rejected(String),
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        blocks: BlockGraph,
        analyzer: Box<dyn Analyzer>,
        instructions: Box<dyn InstructionGenerator>,
        edits: Box<dyn EditGenerator>,
    ) -> Self {
        Self {
            session: Session {
                graph: ChangingGraph::new(),
                blocks,
                engine: EditEngine::new(),
                analyzer,
                observer: Observer::detached(),
                restrictions: RestrictionOptions::default(),
                retry: RetryPolicy::default(),
                goal: String::new(),
                revert_on_finish: true,
            },
            instructions,
            edits,
        }
    }

    /// Continue from an existing graph
    #[must_use]
    pub fn with_graph(mut self, graph: ChangingGraph) -> Self {
        self.session.graph = graph;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.session.observer = observer;
        self
    }

    #[must_use]
    pub fn with_restrictions(mut self, restrictions: RestrictionOptions) -> Self {
        self.session.restrictions = restrictions;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.session.retry = retry;
        self
    }

    #[must_use]
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.session.goal = goal.into();
        self
    }

    /// Keep the applied solutions on disk when the run ends
    #[must_use]
    pub fn with_revert_on_finish(mut self, revert: bool) -> Self {
        self.session.revert_on_finish = revert;
        self
    }

    #[inline]
    #[must_use]
    pub fn graph(&self) -> &ChangingGraph {
        &self.session.graph
    }

    #[inline]
    #[must_use]
    pub fn blocks(&self) -> &BlockGraph {
        &self.session.blocks
    }

    #[inline]
    #[must_use]
    pub fn observer(&self) -> &Observer {
        &self.session.observer
    }

    /// Whether solutions are currently applied to the working tree
    #[inline]
    #[must_use]
    pub fn has_applied_changes(&self) -> bool {
        self.session.engine.can_revert()
    }

    #[must_use]
    pub fn into_graph(self) -> ChangingGraph {
        self.session.graph
    }

    /// Start from one known error on a clean project
    ///
    /// # Errors
    /// Returns [`OrchestratorError::NotClean`] when the analyzer already
    /// reports errors, or any fatal error of the loop
    pub fn run_from_error(&mut self, initial: CompileError) -> Result<()> {
        let existing = self.session.compile_errors(&[])?;
        if !existing.is_empty() {
            return Err(OrchestratorError::NotClean { count: existing.len() });
        }
        let root = self.session.graph.add_problem_node(initial, Status::Pending);
        self.session.observer.log(format!("Seeded root problem {root}"));
        self.drain()?;
        self.finish()
    }

    /// Start from every error the analyzer currently reports
    ///
    /// # Errors
    /// Returns any fatal error of the loop
    pub fn run_from_analyzer(&mut self) -> Result<()> {
        let errors = self.session.compile_errors(&[])?;
        for error in errors {
            let known = self
                .session
                .graph
                .find_same_problem(&error.file, error.position.start_row, &error.text);
            if known.is_none() {
                self.session.graph.add_problem_node(error, Status::Pending);
            }
        }
        let seeded = self.session.graph.get_all_pending_nodes().len();
        self.session.observer.log(format!("Seeded {seeded} problems from the analyzer"));
        self.drain()?;
        self.finish()
    }

    /// Restart one problem, optionally with a new error, instruction or edits
    ///
    /// The working tree must be clean. The node's children are removed, the
    /// handled solutions of the graph are re-applied, then the node is solved
    /// again, using the given instruction and edits in place of the
    /// generators, and the loop continues.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::InvalidNode`] for solution nodes,
    /// [`OrchestratorError::NotClean`] for a dirty tree, or any fatal error
    /// of the loop
    pub fn resume_problem_node(
        &mut self,
        node: NodeId,
        error: Option<CompileError>,
        instruction: Option<Instruction>,
        edits: Option<Vec<BlockEdit>>,
    ) -> Result<()> {
        let current = self.session.graph.node(node)?;
        if !current.payload.is_problem() {
            return Err(OrchestratorError::InvalidNode {
                node,
                action: "resumed",
                reason: format!("it is a {}", current.payload.type_name()),
            });
        }

        let existing = self.session.compile_errors(&[])?;
        if !existing.is_empty() {
            return Err(OrchestratorError::NotClean { count: existing.len() });
        }

        self.session.graph.update_problem_node(node, error)?;
        for child in self.session.graph.get_children(node) {
            self.session.graph.remove_node(child)?;
        }
        self.session.apply_graph_changes()?;
        self.session.observer.log(format!("Starting modification: resuming node {node}"));

        if instruction.is_some() || edits.is_some() {
            let mut fixed_instruction = instruction.map(HardCodedInstructionGenerator);
            let mut fixed_edits = edits.map(HardCodedEditGenerator::many);
            let instructions: &mut dyn InstructionGenerator = match &mut fixed_instruction {
                Some(fixed) => fixed,
                None => &mut *self.instructions,
            };
            let edit_source: &mut dyn EditGenerator = match &mut fixed_edits {
                Some(fixed) => fixed,
                None => &mut *self.edits,
            };
            self.session.handle_problem(node, instructions, edit_source)?;
            self.session.observer.save_graph_state(&self.session.graph)?;
        }

        self.drain()?;
        self.finish()
    }

    /// Handle pending nodes until none is left
    ///
    /// # Errors
    /// Returns the first fatal error
    pub fn drain(&mut self) -> Result<()> {
        loop {
            let pending = self.session.graph.get_all_pending_nodes();
            let Some(&next) = pending.first() else {
                break;
            };
            info!(node = %next, pending = pending.len(), "handling node");
            self.handle_node(next)?;
        }
        Ok(())
    }

    /// Handle one pending node and save the graph
    ///
    /// # Errors
    /// Returns [`OrchestratorError::InvalidNode`] for anything but a problem
    pub fn handle_node(&mut self, node: NodeId) -> Result<()> {
        let current = self.session.graph.node(node)?;
        if !matches!(current.payload, NodePayload::Problem(_)) {
            return Err(OrchestratorError::InvalidNode {
                node,
                action: "handled",
                reason: format!("only problems are handled, this is a {}", current.payload.type_name()),
            });
        }
        self.session.observer.log(format!("Handling problem node {node}"));
        self.session
            .handle_problem(node, &mut *self.instructions, &mut *self.edits)?;
        self.session.observer.save_graph_state(&self.session.graph)?;
        Ok(())
    }

    /// Merge the cycles of the graph and drop its redundant edges
    ///
    /// # Errors
    /// Returns a graph error when a cycle survives merging, or a snapshot
    /// I/O error
    pub fn optimize(&mut self) -> Result<()> {
        optimize_graph(&mut self.session.graph, &mut self.session.observer)
    }

    /// Re-apply every handled solution to the working tree
    ///
    /// # Errors
    /// Returns an edit error when a solution no longer applies
    pub fn apply_graph_changes(&mut self) -> Result<()> {
        self.session.apply_graph_changes()
    }

    /// Put the working tree back as it was, when configured to
    ///
    /// # Errors
    /// Returns an edit error when files cannot be restored
    pub fn finish(&mut self) -> Result<()> {
        if self.session.revert_on_finish && self.session.engine.can_revert() {
            self.session.engine.revert_change(&mut self.session.blocks)?;
            debug!("working tree restored");
        }
        self.session.observer.log("Finished");
        Ok(())
    }
}

impl Session {
    /// Analyzer errors, one per line, within the restrictions
    fn compile_errors(&mut self, scope: &[PathBuf]) -> Result<Vec<CompileError>> {
        let errors = self
            .analyzer
            .get_compile_errors(scope)
            .map_err(OrchestratorError::Analyzer)?;
        Ok(self.restrictions.filter(dedup_by_line(errors)))
    }

    fn apply_graph_changes(&mut self) -> Result<()> {
        for id in self.graph.get_all_handled_solution_nodes() {
            let Some(edits) = self.graph.get_node(id).and_then(|n| n.payload.edits()) else {
                continue;
            };
            self.observer.log_value(&format!("applying edits of {id}"), &edits);
            self.engine.apply_change(&mut self.blocks, edits)?;
        }
        Ok(())
    }

    fn handle_problem(
        &mut self,
        problem: NodeId,
        instructions: &mut dyn InstructionGenerator,
        edits: &mut dyn EditGenerator,
    ) -> Result<()> {
        let error = self
            .graph
            .node(problem)?
            .payload
            .error()
            .cloned()
            .ok_or_else(|| OrchestratorError::InvalidNode {
                node: problem,
                action: "solved",
                reason: "it carries no error".to_string(),
            })?;

        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            let (instruction, candidate) = match self.propose(problem, instructions, edits)? {
                Proposal::Ready(instruction, candidate) => (instruction, candidate),
                Proposal::Unsolvable { reason, instruction } => {
                    self.observer.log(format!("Encountered error {reason}"));
                    self.graph.error_on_problem_node(problem, reason, instruction, None)?;
                    return Ok(());
                }
            };

            if let Some(existing) = self
                .graph
                .find_same_solution(&instruction.file, instruction.block_id, &candidate)
            {
                // the existing solution is already applied, so the current errors tell
                let current = self.compile_errors(&[])?;
                if does_solution_fix_problem(&self.graph, problem, &error, &current) {
                    self.observer
                        .log(format!("Solution already exists as node {existing}, connecting {problem} to it"));
                    self.graph.add_edge(problem, existing)?;
                    self.graph.mark_node_as(problem, Status::Handled)?;
                    return Ok(());
                }
                let failed = self.graph.add_solution_node(instruction, candidate, Status::Failed);
                self.graph.add_edge(problem, failed)?;
                self.observer.log(format!(
                    "Solution already exists as node {existing} but leaves the error, added failed node {failed}"
                ));
            } else {
                match self.check(problem, &error, &candidate)? {
                    Verdict::Valid => {
                        self.observer.log("Is solution valid : true");
                        return self.accept(problem, instruction, candidate);
                    }
                    Verdict::Invalid => {
                        self.observer.log("Is solution valid : false");
                        let failed = self.graph.add_solution_node(instruction, candidate, Status::Failed);
                        self.graph.add_edge(problem, failed)?;
                        self.observer
                            .log(format!("Added failed node {failed}, trying to handle {problem} again"));
                    }
                    Verdict::Rejected(reason) => {
                        self.observer.log(format!("Edits were rejected: {reason}"));
                        let failed = self.graph.add_solution_node(instruction, candidate, Status::Failed);
                        self.graph.error_on_solution_node(failed, reason)?;
                        self.graph.add_edge(problem, failed)?;
                    }
                }
            }

            if !self.retry.allows_another(attempts) {
                warn!(node = %problem, attempts, "retry budget exhausted");
                self.graph.error_on_problem_node(
                    problem,
                    format!("no valid solution after {attempts} attempts"),
                    None,
                    None,
                )?;
                return Ok(());
            }
            self.retry.pause();
        }
    }

    fn propose(
        &mut self,
        problem: NodeId,
        instructions: &mut dyn InstructionGenerator,
        edits: &mut dyn EditGenerator,
    ) -> Result<Proposal> {
        let request = InstructionRequest::build(&self.graph, &self.blocks, problem, &self.goal)?;
        let instruction = match instructions.get_instruction(&request) {
            Ok(instruction) => instruction,
            Err(err) => {
                return Ok(Proposal::Unsolvable {
                    reason: format!("{err:#}"),
                    instruction: None,
                })
            }
        };
        self.observer.log_value("used instruction :", &instruction);

        match edits.get_edits(&instruction, &self.blocks) {
            Ok(candidate) => {
                self.observer.log_value("got edit :", &candidate);
                Ok(Proposal::Ready(instruction, candidate))
            }
            Err(err) => Ok(Proposal::Unsolvable {
                reason: format!("{err:#}"),
                instruction: Some(instruction),
            }),
        }
    }

    /// Apply the candidate in a scope and ask the analyzer about it
    fn check(&mut self, problem: NodeId, error: &CompileError, candidate: &[BlockEdit]) -> Result<Verdict> {
        let scope: Vec<PathBuf> = candidate.iter().map(|e| e.file.clone()).collect();
        let analyzer = &mut self.analyzer;
        let outcome = EditEngine::with_applied(&mut self.blocks, candidate, |blocks| -> anyhow::Result<Option<Vec<CompileError>>> {
            if analyzer.has_syntax_errors(blocks)? {
                return Ok(None);
            }
            Ok(Some(analyzer.get_compile_errors(&scope)?))
        });

        let errors = match outcome {
            Ok(result) => result.map_err(OrchestratorError::Analyzer)?,
            Err(err) if err.is_edit_rejection() => return Ok(Verdict::Rejected(err.to_string())),
            Err(err) => return Err(err.into()),
        };
        let Some(errors) = errors else {
            self.observer.log("Is solution syntactically valid : false");
            return Ok(Verdict::Invalid);
        };

        let errors = self.restrictions.filter(dedup_by_line(errors));
        let fixed = does_solution_fix_problem(&self.graph, problem, error, &errors);
        self.observer.log(format!("Does solution fix problem : {fixed}"));
        Ok(if fixed { Verdict::Valid } else { Verdict::Invalid })
    }

    /// Apply a valid solution for good and update the problem set
    fn accept(&mut self, problem: NodeId, instruction: Instruction, candidate: Vec<BlockEdit>) -> Result<()> {
        self.engine.apply_change(&mut self.blocks, &candidate)?;
        let solution = self.graph.add_solution_node(instruction, candidate, Status::Handled);
        self.graph.add_edge(problem, solution)?;

        let current = self.compile_errors(&[])?;
        let pending = self.graph.get_all_pending_problem_nodes();
        let mut known = Vec::with_capacity(pending.len());
        for id in pending {
            let Some(error) = self.graph.get_node(id).and_then(|n| n.payload.error()).cloned() else {
                continue;
            };
            if id != problem && !current.contains(&error) {
                self.graph.add_edge(id, solution)?;
                self.graph.mark_node_as(id, Status::Handled)?;
                self.observer
                    .log(format!("Solved problem {id}, connecting it to {solution}"));
            }
            known.push(error);
        }

        for error in current {
            if known.contains(&error) {
                continue;
            }
            let new_problem = self.graph.add_problem_node(error, Status::Pending);
            self.graph.add_edge(solution, new_problem)?;
            self.observer.log(format!("New problem -> Added new node {new_problem}"));
        }

        self.graph.mark_node_as(problem, Status::Handled)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{MockAnalyzer, ScriptedAnalyzer};
    use cdot_blocks::BlockId;
    use cdot_graph::ErrorPosition;
    use std::fs;

    const SOURCE: &str = "using System;\n\nclass Shop\n{\n    int Count() { return Old(); }\n}\n";

    fn project() -> (tempfile::TempDir, PathBuf, BlockGraph) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Shop.cs");
        fs::write(&file, SOURCE).unwrap();
        let blocks = BlockGraph::build(&[&file]).unwrap();
        (dir, file, blocks)
    }

    fn error(file: &PathBuf, row: usize) -> CompileError {
        CompileError::new("Old does not exist", file, "shop", ErrorPosition::new(row, 4, row, 10))
    }

    fn method_edit(blocks: &BlockGraph, file: &PathBuf, after: &str) -> BlockEdit {
        let method = blocks.get_nodes_by_kind(cdot_blocks::BlockKind::Method)[0];
        BlockEdit::new(file, method.id, method.text.clone(), after)
    }

    #[test]
    fn dirty_project_is_refused() {
        let (_dir, file, blocks) = project();
        let mut analyzer = MockAnalyzer::new();
        let reported = error(&file, 4);
        analyzer
            .expect_get_compile_errors()
            .returning(move |_| Ok(vec![reported.clone()]));
        let edit = method_edit(&blocks, &file, "int Count() { return 0; }");
        let mut orchestrator = Orchestrator::new(
            blocks,
            Box::new(analyzer),
            Box::new(HardCodedInstructionGenerator(Instruction::new(edit.block_id, &file, "x"))),
            Box::new(HardCodedEditGenerator::new(edit)),
        );
        let err = orchestrator.run_from_error(error(&file, 4)).unwrap_err();
        assert!(matches!(err, OrchestratorError::NotClean { count: 1 }));
        assert_eq!(orchestrator.graph().number_of_nodes(), 0);
    }

    #[test]
    fn generation_failure_marks_problem_unsolvable() {
        let (_dir, file, blocks) = project();
        let failing = |_: &InstructionRequest<'_>| -> anyhow::Result<Instruction> { anyhow::bail!("model unavailable") };
        let mut orchestrator = Orchestrator::new(
            blocks,
            Box::new(ScriptedAnalyzer::new(vec![vec![]])),
            Box::new(failing),
            Box::new(HardCodedEditGenerator::many(Vec::new())),
        );
        orchestrator.run_from_error(error(&file, 4)).unwrap();

        let root = orchestrator.graph().get_node(NodeId(0)).unwrap();
        assert_eq!(root.status, Status::Failed);
        match &root.payload {
            NodePayload::ErrorProblem(p) => assert_eq!(p.error_text, "model unavailable"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn rejected_edits_become_error_solutions_until_budget_runs_out() {
        let (_dir, file, blocks) = project();
        let method = blocks.get_nodes_by_kind(cdot_blocks::BlockKind::Method)[0].id;
        let bogus = BlockEdit::new(&file, method, "this text is not in the block", "int Count() { return 1; }");
        let mut orchestrator = Orchestrator::new(
            blocks,
            Box::new(ScriptedAnalyzer::new(vec![vec![]])),
            Box::new(HardCodedInstructionGenerator(Instruction::new(method, &file, "x"))),
            Box::new(HardCodedEditGenerator::new(bogus)),
        )
        .with_retry(RetryPolicy::bounded(2));
        orchestrator.run_from_error(error(&file, 4)).unwrap();

        let counts = orchestrator.graph().count_node_types();
        assert_eq!(counts.error_solutions, 2);
        assert_eq!(counts.error_problems, 1);
        assert_eq!(fs::read_to_string(&file).unwrap(), SOURCE);
    }

    fn duplicate_setup(script: Vec<Vec<CompileError>>) -> (tempfile::TempDir, PathBuf, Orchestrator, NodeId, NodeId) {
        let (dir, file, blocks) = project();
        let edit = method_edit(&blocks, &file, "int Count() { return 0; }");
        let instruction = Instruction::new(edit.block_id, &file, "drop Old");
        let mut orchestrator = Orchestrator::new(
            blocks,
            Box::new(ScriptedAnalyzer::new(script)),
            Box::new(HardCodedInstructionGenerator(instruction.clone())),
            Box::new(HardCodedEditGenerator::new(edit)),
        )
        .with_retry(RetryPolicy::bounded(2));
        let existing = orchestrator.session.graph.add_solution_node(
            instruction,
            vec![method_edit(&orchestrator.session.blocks, &file, "int Count() { return 0; }")],
            Status::Handled,
        );
        let problem = orchestrator.session.graph.add_problem_node(error(&file, 4), Status::Pending);
        (dir, file, orchestrator, existing, problem)
    }

    #[test]
    fn duplicate_solution_is_reused_when_the_error_is_gone() {
        let (_dir, _file, mut orchestrator, existing, problem) = duplicate_setup(vec![vec![]]);
        orchestrator.drain().unwrap();

        assert!(orchestrator.graph().has_edge(problem, existing));
        assert_eq!(orchestrator.graph().get_node(problem).unwrap().status, Status::Handled);
        assert_eq!(orchestrator.graph().number_of_nodes(), 2);
    }

    #[test]
    fn duplicate_solution_leaving_the_error_is_a_failed_attempt() {
        let (_dir, file, mut orchestrator, existing, problem) = duplicate_setup(vec![vec![error(&file, 4)]]);
        orchestrator.drain().unwrap();

        let graph = orchestrator.graph();
        assert!(!graph.has_edge(problem, existing));
        assert_eq!(graph.get_failed_solution_to_problem(problem).len(), 2);
        let node = graph.get_node(problem).unwrap();
        assert_eq!(node.status, Status::Failed);
        assert!(matches!(node.payload, NodePayload::ErrorProblem(_)));
        assert!(graph.get_cycles().is_empty());
    }

    #[test]
    fn optimize_merges_cycles_so_the_graph_drains() {
        let (_dir, file, blocks) = project();
        let edit = method_edit(&blocks, &file, "int Count() { return 0; }");
        let instruction = Instruction::new(edit.block_id, &file, "drop Old");
        let mut graph = ChangingGraph::new();
        let root = graph.add_problem_node(error(&file, 4), Status::Handled);
        let first = graph.add_solution_node(instruction.clone(), vec![edit.clone()], Status::Handled);
        let caused = graph.add_problem_node(error(&file, 5), Status::Handled);
        let second = graph.add_solution_node(instruction, vec![edit], Status::Handled);
        for (from, to) in [(root, first), (first, caused), (caused, second), (second, first)] {
            graph.add_edge(from, to).unwrap();
        }
        let mut orchestrator = Orchestrator::new(
            blocks,
            Box::new(ScriptedAnalyzer::default()),
            Box::new(HardCodedInstructionGenerator(Instruction::new(BlockId(0), &file, "x"))),
            Box::new(HardCodedEditGenerator::many(Vec::new())),
        )
        .with_graph(graph);

        orchestrator.optimize().unwrap();

        let mut graph = orchestrator.into_graph();
        assert!(graph.get_cycles().is_empty());
        let sets = crate::plan::plan_commits(&mut graph, &mut Observer::detached()).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 2);
    }

    #[test]
    fn resume_rejects_solution_nodes() {
        let (_dir, file, blocks) = project();
        let edit = method_edit(&blocks, &file, "int Count() { return 0; }");
        let mut orchestrator = Orchestrator::new(
            blocks,
            Box::new(ScriptedAnalyzer::new(vec![vec![]])),
            Box::new(HardCodedInstructionGenerator(Instruction::new(BlockId(0), &file, "x"))),
            Box::new(HardCodedEditGenerator::new(edit.clone())),
        );
        let solution = orchestrator.session.graph.add_solution_node(
            Instruction::new(edit.block_id, &file, "x"),
            vec![edit],
            Status::Handled,
        );
        let err = orchestrator.resume_problem_node(solution, None, None, None).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidNode { .. }));
    }
}
