use std::fs;
use std::path::PathBuf;

use cdot_blocks::{BlockEdit, BlockGraph, BlockKind, Relation};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const FIXTURE: &str = r#"using System;
using System.Text.Json.Serialization;

namespace Shop
{
    public class Cart
    {
        [JsonIgnore]
        public string? DistinctId { get; set; }

        public int Size { get; set; }

        public Cart()
        {
            Size = 0;
        }

        // empties the cart
        public void Clear()
        {
            Size = 0;
        }
    }
}
"#;

fn fixture() -> (tempfile::TempDir, PathBuf, BlockGraph) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Cart.cs");
    fs::write(&path, FIXTURE).unwrap();
    let graph = BlockGraph::build(&[path.clone()]).unwrap();
    (dir, path, graph)
}

#[test]
fn property_text_includes_attributes() {
    let (_dir, _path, graph) = fixture();
    let fields = graph.get_nodes_by_kind(BlockKind::Field);
    assert_eq!(
        fields[0].text,
        "[JsonIgnore]\n        public string? DistinctId { get; set; }"
    );
}

#[test]
fn method_text_includes_leading_comment() {
    let (_dir, _path, graph) = fixture();
    let clear = graph.get_nodes_by_kind(BlockKind::Method)[0];
    assert!(clear.text.starts_with("// empties the cart\n"));
    assert_eq!(clear.start.row, 17);
}

#[test]
fn import_insertion_shifts_everything_below() {
    let (_dir, path, mut graph) = fixture();
    let import = graph.get_nodes_by_kind(BlockKind::Import)[0].clone();
    let ids_before: Vec<_> = graph.nodes().map(|b| (b.id, b.start.row)).collect();

    let after = "// this shifts everything\nusing System;";
    let content = fs::read_to_string(&path).unwrap();
    fs::write(&path, content.replacen("using System;\n", "// this shifts everything\nusing System;\n", 1)).unwrap();

    graph
        .update_from_edits(&[BlockEdit::new(&path, import.id, import.text.clone(), after)])
        .unwrap();

    let edited = graph.get_node(import.id).unwrap();
    assert_eq!(edited.text, after);
    assert_eq!(edited.start.row, 0);

    for (id, row) in ids_before.into_iter().filter(|(id, _)| *id != import.id) {
        assert_eq!(graph.get_node(id).unwrap().start.row, row + 1);
    }
}

#[test]
fn class_edit_recreates_members() {
    let (_dir, path, mut graph) = fixture();
    let class = graph.get_nodes_by_kind(BlockKind::Class)[0].clone();
    let old_members = graph.children(class.id);

    let after = class.text.replace("Size = 0;", "Size = 1;");
    let content = fs::read_to_string(&path).unwrap();
    fs::write(&path, content.replace(&class.text, &after)).unwrap();

    graph
        .update_from_edits(&[BlockEdit::new(&path, class.id, class.text.clone(), after.clone())])
        .unwrap();

    assert_eq!(graph.get_node(class.id).unwrap().text, after);
    let new_members = graph.children(class.id);
    assert_eq!(new_members.len(), old_members.len());
    assert!(new_members.iter().all(|id| !old_members.contains(id)));

    let ctor = graph.get_nodes_by_kind(BlockKind::Constructor)[0].id;
    assert!(graph.relations().contains(&(ctor, class.id, Relation::Constructs)));
}

#[test]
fn spacing_differences_still_match() {
    let (_dir, path, mut graph) = fixture();
    let size = graph.get_nodes_by_kind(BlockKind::Field)[1].clone();

    let content = fs::read_to_string(&path).unwrap();
    fs::write(&path, content.replacen("public int Size { get; set; }", "public long Size { get; set; }", 1)).unwrap();

    graph
        .update_from_edits(&[BlockEdit::new(
            &path,
            size.id,
            "public   int Size {get;set;}",
            "public long Size\n{ get; set; }",
        )])
        .unwrap();

    assert_eq!(graph.get_node(size.id).unwrap().text, "public long Size { get; set; }");
}

#[test]
fn revert_after_update_restores_graph() {
    let (_dir, path, mut graph) = fixture();
    let snapshot = graph.clone();
    let size = graph.get_nodes_by_kind(BlockKind::Field)[1].clone();

    graph.save_state();
    let content = fs::read_to_string(&path).unwrap();
    fs::write(&path, content.replacen("public int Size", "public int Count", 1)).unwrap();
    graph
        .update_from_edits(&[BlockEdit::new(&path, size.id, size.text.clone(), "public int Count { get; set; }")])
        .unwrap();
    assert_ne!(graph, snapshot);

    graph.revert().unwrap();
    assert_eq!(graph, snapshot);
}

proptest! {
    #[test]
    fn prop_empty_update_keeps_graph(extra_fields in 0..6usize) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Gen.cs");
        let mut source = String::from("public class Gen\n{\n");
        for i in 0..extra_fields {
            source.push_str(&format!("    public int F{i};\n"));
        }
        source.push_str("}\n");
        fs::write(&path, &source).unwrap();

        let mut graph = BlockGraph::build(&[path.clone()]).unwrap();
        let before = graph.clone();
        graph.update_from_edits(&[]).unwrap();
        prop_assert_eq!(graph.node_count(), extra_fields + 1);
        prop_assert!(graph == before);
    }
}
