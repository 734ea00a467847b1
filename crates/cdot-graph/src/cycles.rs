//! Cycle merging and transitive reduction

use petgraph::algo::{has_path_connecting, is_cyclic_directed, tarjan_scc};
use petgraph::Direction;
use tracing::{debug, info, warn};

use crate::error::GraphError;
use crate::graph::ChangingGraph;
use crate::node::{NodeId, NodePayload, Status};

impl ChangingGraph {
    /// Strongly connected components with more than one node, each sorted
    #[must_use]
    pub fn get_cycles(&self) -> Vec<Vec<NodeId>> {
        let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&self.edges)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|mut scc| {
                scc.sort();
                scc
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Collapse every cycle into one handled solution
    ///
    /// The merged solution takes the first member solution's instruction and
    /// the concatenation of all member edits in id order. Edges entering or
    /// leaving the cycle are moved onto it; the members are removed.
    /// Returns the ids of the merged solutions.
    pub fn merge_cycles(&mut self) -> Vec<NodeId> {
        let cycles = self.get_cycles();
        if !cycles.is_empty() {
            info!(cycles = cycles.len(), "merging cycles");
        }

        let mut merged = Vec::with_capacity(cycles.len());
        for cycle in cycles {
            let solutions: Vec<_> = cycle
                .iter()
                .filter_map(|id| match self.get_node(*id).map(|n| &n.payload) {
                    Some(NodePayload::Solution(s)) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            let Some(first) = solutions.first() else {
                warn!(?cycle, "cycle without solutions left as is");
                continue;
            };

            let edits = solutions.iter().flat_map(|s| s.edits.iter().cloned()).collect();
            let merged_id = self.add_solution_node(first.instruction.clone(), edits, Status::Handled);

            let mut inbound = Vec::new();
            let mut outbound = Vec::new();
            for member in &cycle {
                inbound.extend(
                    self.edges
                        .neighbors_directed(*member, Direction::Incoming)
                        .filter(|u| !cycle.contains(u)),
                );
                outbound.extend(
                    self.edges
                        .neighbors_directed(*member, Direction::Outgoing)
                        .filter(|v| !cycle.contains(v)),
                );
            }
            for u in inbound {
                self.edges.add_edge(u, merged_id, ());
            }
            for v in outbound {
                self.edges.add_edge(merged_id, v, ());
            }
            for member in &cycle {
                self.nodes.remove(member);
                self.edges.remove_node(*member);
            }

            debug!(?cycle, merged = %merged_id, "cycle merged");
            merged.push(merged_id);
        }
        merged
    }

    /// Drop edges implied by a longer path (transitive reduction)
    ///
    /// Returns the number of edges removed.
    ///
    /// # Errors
    /// Returns [`GraphError::Cyclic`] when cycles remain
    pub fn remove_redundant_edges(&mut self) -> Result<usize, GraphError> {
        if is_cyclic_directed(&self.edges) {
            return Err(GraphError::Cyclic);
        }

        let redundant: Vec<(NodeId, NodeId)> = self
            .edges
            .all_edges()
            .filter(|(u, v, _)| {
                self.edges
                    .neighbors_directed(*u, Direction::Outgoing)
                    .any(|w| w != *v && has_path_connecting(&self.edges, w, *v, None))
            })
            .map(|(u, v, _)| (u, v))
            .collect();

        for (u, v) in &redundant {
            self.edges.remove_edge(*u, *v);
        }
        debug!(removed = redundant.len(), "redundant edges removed");
        Ok(redundant.len())
    }
}
