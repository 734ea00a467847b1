//! Deciding whether a candidate solution removed its error

use cdot_graph::{ChangingGraph, CompileError, NodeId, NodePayload};

/// The error followed by its copies on the next lines, as long as they are
/// reported in `errors`
///
/// The first element is always `error` itself.
#[must_use]
pub fn consecutive_errors(error: &CompileError, errors: &[CompileError]) -> Vec<CompileError> {
    let mut run = vec![error.clone()];
    let mut offset = 1;
    loop {
        let next = error.shifted(offset);
        if !errors.contains(&next) {
            return run;
        }
        run.push(next);
        offset += 1;
    }
}

/// Whether `error` is gone from `current`, given the solution that caused it
///
/// Identical errors on consecutive lines slide up when the line of the first
/// one is deleted, so the same error stays reported at the same place. In
/// that case the error counts as removed when the run of consecutive copies
/// got exactly one shorter than it was among the causing solution's
/// problems.
#[must_use]
pub fn is_error_removed(error: &CompileError, current: &[CompileError], graph: &ChangingGraph, cause: NodeId) -> bool {
    if !current.contains(error) {
        return true;
    }

    let siblings: Vec<CompileError> = graph
        .get_children(cause)
        .into_iter()
        .filter_map(|id| match graph.get_node(id).map(|n| &n.payload) {
            Some(NodePayload::Problem(p)) => Some(p.error.clone()),
            _ => None,
        })
        .collect();

    let before = consecutive_errors(error, &siblings).len();
    let now = consecutive_errors(error, current).len();
    before == now + 1
}

/// Whether the problem's error is removed in `current`
///
/// A root problem needs its error to be absent. A caused problem needs the
/// error to be removed with respect to every solution that caused it.
#[must_use]
pub fn does_solution_fix_problem(graph: &ChangingGraph, problem: NodeId, error: &CompileError, current: &[CompileError]) -> bool {
    let causes = graph.get_parent_nodes(problem);
    if causes.is_empty() {
        return !current.contains(error);
    }
    causes
        .into_iter()
        .all(|cause| is_error_removed(error, current, graph, cause))
}
