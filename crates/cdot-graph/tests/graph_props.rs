use std::path::Path;

use cdot_blocks::{BlockEdit, BlockId};
use cdot_graph::{ChangingGraph, CompileError, ErrorPosition, Instruction, NodeId, Status};
use proptest::prelude::*;

fn problem(g: &mut ChangingGraph, line: usize) -> NodeId {
    g.add_problem_node(
        CompileError::new("missing symbol", "A.cs", "app", ErrorPosition::new(line, 0, line, 0)),
        Status::Handled,
    )
}

fn solution(g: &mut ChangingGraph, block: u64, after: &str) -> NodeId {
    g.add_solution_node(
        Instruction::new(BlockId(block), "A.cs", "change"),
        vec![BlockEdit::new("A.cs", BlockId(block), "old", after)],
        Status::Handled,
    )
}

#[test]
fn three_node_cycle_merges_into_one() {
    let mut g = ChangingGraph::new();
    let s1 = solution(&mut g, 1, "first");
    let p = problem(&mut g, 4);
    let s2 = solution(&mut g, 2, "second");
    g.add_edge(s1, p).unwrap();
    g.add_edge(p, s2).unwrap();
    g.add_edge(s2, s1).unwrap();

    let before = g.number_of_nodes();
    let merged = g.merge_cycles();
    assert_eq!(g.number_of_nodes(), before - 2);

    let node = g.get_node(merged[0]).unwrap();
    assert_eq!(node.status, Status::Handled);
    let afters: Vec<_> = node.payload.edits().unwrap().iter().map(|e| e.after.clone()).collect();
    assert_eq!(afters, vec!["first".to_string(), "second".to_string()]);
    assert_eq!(node.payload.instruction().unwrap().block_id, BlockId(1));
}

proptest! {
    #[test]
    fn prop_lookup_never_finds_two_live_duplicates(
        proposals in proptest::collection::vec((0..3u64, 0..3usize, any::<bool>()), 1..30)
    ) {
        let afters = ["a", "b", "c"];
        let mut g = ChangingGraph::new();
        for (block, after, fails) in proposals {
            let edits = vec![BlockEdit::new("A.cs", BlockId(block), "old", afters[after])];
            if g.find_same_solution(Path::new("A.cs"), BlockId(block), &edits).is_some() {
                continue;
            }
            let status = if fails { Status::Failed } else { Status::Handled };
            g.add_solution_node(Instruction::new(BlockId(block), "A.cs", "change"), edits, status);
        }

        let live: Vec<_> = g
            .nodes()
            .filter(|n| n.status != Status::Failed)
            .filter_map(|n| n.payload.edits().map(|e| (e[0].block_id, e[0].after.clone())))
            .collect();
        let mut deduped = live.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(live.len(), deduped.len());
    }

    #[test]
    fn prop_reduction_keeps_reachability(
        edges in proptest::collection::vec((0..8usize, 0..8usize), 0..30)
    ) {
        let mut g = ChangingGraph::new();
        let ids: Vec<NodeId> = (0..8).map(|i| problem(&mut g, i)).collect();
        for (a, b) in edges {
            // only forward edges, so the graph stays acyclic
            if a < b {
                g.add_edge(ids[a], ids[b]).unwrap();
            }
        }
        let reach = |g: &ChangingGraph| -> Vec<(usize, usize)> {
            let mut pairs = Vec::new();
            for a in 0..8 {
                for b in 0..8 {
                    if a != b && g.get_shortest_distance(ids[a], ids[b]).is_some() {
                        pairs.push((a, b));
                    }
                }
            }
            pairs
        };

        let before = reach(&g);
        g.remove_redundant_edges().unwrap();
        prop_assert_eq!(reach(&g), before);
    }
}
