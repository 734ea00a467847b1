//! Post-processing of a finished graph

use cdot_blocks::BlockEdit;
use cdot_graph::{ChangingGraph, NodePayload, Status};

use crate::error::{OrchestratorError, Result};
use crate::observer::Observer;

/// Merge cycles, drop implied edges and save the result
///
/// # Errors
/// Returns a graph error when a cycle survives merging, or an I/O error from
/// the snapshot
pub fn optimize_graph(graph: &mut ChangingGraph, observer: &mut Observer) -> Result<()> {
    observer.log("Optimizing: merge cycles");
    let merged = graph.merge_cycles();
    observer.log(format!("Merged {} cycles", merged.len()));

    observer.log("Optimizing: removing redundant edges");
    let removed = graph.remove_redundant_edges()?;
    observer.log(format!("Removed {removed} redundant edges"));

    observer.save_graph_state(graph)?;
    Ok(())
}

/// Drain the graph leaf by leaf into the edit sets to commit
///
/// The last leaf is taken each time. Handled solutions contribute their
/// edits in that order; every other node is just removed. The graph is
/// empty afterwards.
///
/// # Errors
/// Returns [`OrchestratorError::UndrainedGraph`] when nodes remain that are
/// never leaves, which happens when cycles were not merged
pub fn plan_commits(graph: &mut ChangingGraph, observer: &mut Observer) -> Result<Vec<Vec<BlockEdit>>> {
    observer.log("Starting to commit");
    let mut edit_sets = Vec::new();

    while let Some(leaf) = graph.get_leaves().pop() {
        let node = graph.remove_node(leaf)?;
        match node.payload {
            NodePayload::Solution(solution) if node.status == Status::Handled => {
                observer.log(format!("adding solution {leaf} to commits to apply"));
                edit_sets.push(solution.edits);
            }
            NodePayload::Solution(_) => {
                observer.log(format!("Removing node {leaf} because of status {}", node.status));
            }
            _ => observer.log(format!("Removed from graph node {leaf}")),
        }
    }

    let remaining = graph.number_of_nodes();
    if remaining > 0 {
        return Err(OrchestratorError::UndrainedGraph { remaining });
    }
    observer.log(format!("Got {} edit sets to commit", edit_sets.len()));
    Ok(edit_sets)
}
