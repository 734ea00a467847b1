use std::fs;
use std::path::PathBuf;

use cdot_blocks::{BlockEdit, BlockGraph, BlockKind};
use cdot_edit::EditEngine;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const ORDERS: &str = "using System;\n\npublic class Orders\n{\n    public int Count;\n\n    public void Add()\n    {\n        Count++;\n    }\n\n    public void Reset()\n    {\n        Count = 0;\n    }\n}\n";
const ITEMS: &str = "public class Items\n{\n    public string Name;\n}\n";

fn project() -> (tempfile::TempDir, PathBuf, PathBuf, BlockGraph) {
    let dir = tempfile::tempdir().unwrap();
    let orders = dir.path().join("Orders.cs");
    let items = dir.path().join("Items.cs");
    fs::write(&orders, ORDERS).unwrap();
    fs::write(&items, ITEMS).unwrap();
    let graph = BlockGraph::build(&[orders.clone(), items.clone()]).unwrap();
    (dir, orders, items, graph)
}

#[test]
fn multi_file_change_reverts_both_files() {
    let (_dir, orders, items, mut graph) = project();
    let snapshot = graph.clone();
    let count = graph
        .nodes_in_file(&orders)
        .into_iter()
        .find(|b| b.kind == BlockKind::Field)
        .unwrap()
        .clone();
    let name = graph
        .nodes_in_file(&items)
        .into_iter()
        .find(|b| b.kind == BlockKind::Field)
        .unwrap()
        .clone();

    let mut engine = EditEngine::new();
    engine
        .apply_change(
            &mut graph,
            &[
                BlockEdit::new(&orders, count.id, count.text.clone(), "public long Count;"),
                BlockEdit::new(&items, name.id, name.text.clone(), "public string Title;"),
            ],
        )
        .unwrap();
    assert_eq!(engine.touched_files().len(), 2);
    assert_eq!(graph.get_node(name.id).unwrap().text, "public string Title;");

    engine.revert_change(&mut graph).unwrap();
    assert_eq!(fs::read_to_string(&orders).unwrap(), ORDERS);
    assert_eq!(fs::read_to_string(&items).unwrap(), ITEMS);
    assert_eq!(graph, snapshot);
}

#[test]
fn scoped_application_nests_inside_transaction() {
    let (_dir, orders, _items, mut graph) = project();
    let mut engine = EditEngine::new();
    let count = graph.get_nodes_by_kind(BlockKind::Field)[0].clone();
    engine
        .apply_change(
            &mut graph,
            &[BlockEdit::new(&orders, count.id, count.text.clone(), "public long Count;")],
        )
        .unwrap();
    let applied = fs::read_to_string(&orders).unwrap();
    let after_permanent = graph.clone();

    let reset = graph
        .get_nodes_by_kind(BlockKind::Method)
        .into_iter()
        .find(|b| b.text.contains("Reset"))
        .unwrap()
        .clone();
    let count_inside = EditEngine::with_applied(
        &mut graph,
        &[BlockEdit::new(&orders, reset.id, reset.text.clone(), "")],
        |g| g.node_count(),
    )
    .unwrap();
    assert_eq!(count_inside, after_permanent.node_count() - 1);
    assert_eq!(fs::read_to_string(&orders).unwrap(), applied);
    assert_eq!(graph, after_permanent);

    engine.revert_change(&mut graph).unwrap();
    assert_eq!(fs::read_to_string(&orders).unwrap(), ORDERS);
}

#[test]
fn method_rewrite_shifts_following_method() {
    let (_dir, orders, _items, mut graph) = project();
    let methods = graph.get_nodes_by_kind(BlockKind::Method);
    let add = methods[0].clone();
    let reset = methods[1].clone();

    let after = "public void Add()\n    {\n        Count++;\n        Count++;\n    }";
    let mut engine = EditEngine::new();
    engine
        .apply_change(&mut graph, &[BlockEdit::new(&orders, add.id, add.text.clone(), after)])
        .unwrap();

    assert_eq!(graph.get_node(reset.id).unwrap().start.row, reset.start.row + 1);
    assert!(fs::read_to_string(&orders)
        .unwrap()
        .contains("    public void Add()\n    {\n        Count++;\n        Count++;\n    }\n"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_apply_revert_is_byte_identical(name in "[A-Z][a-z]{1,8}") {
        let (_dir, orders, _items, mut graph) = project();
        let count = graph.get_nodes_by_kind(BlockKind::Field)[0].clone();
        let after = format!("public int {name};");
        let mut engine = EditEngine::new();

        engine
            .apply_change(&mut graph, &[BlockEdit::new(&orders, count.id, count.text.clone(), after)])
            .unwrap();
        engine.revert_change(&mut graph).unwrap();

        prop_assert_eq!(fs::read_to_string(&orders).unwrap(), ORDERS);
        prop_assert_eq!(graph.saved_states(), 0);
    }
}
