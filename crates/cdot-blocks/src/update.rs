//! Incremental update after an edit has been written to disk
//!
//! The edited block keeps its id, as do its ancestors and every other block
//! of the file that can be found again. Blocks nested inside the edited one
//! are re-derived with fresh ids.

use tracing::{debug, warn};

use crate::block::{same_file, BlockEdit, BlockId, BlockKind, SourceBlock};
use crate::error::BlockError;
use crate::graph::{BlockGraph, GraphState};
use crate::language::Language;
use crate::parse::{parse_source, ParsedFile};
use crate::text::{contains_ignoring_whitespace, normalize_code, read_source, CommentStyle};

impl BlockGraph {
    /// Bring the graph in line with edits already written to disk
    ///
    /// Edits are processed in order, each against the file as it is on disk.
    /// Empty edits are skipped. On failure the graph is left untouched.
    ///
    /// # Errors
    /// Returns a [`BlockError`] when an edit does not fit its block, its
    /// result cannot be found on disk, or no unique block matches it
    pub fn update_from_edits(&mut self, edits: &[BlockEdit]) -> Result<(), BlockError> {
        let mut state = self.state.clone();
        let mut next_id = self.next_id;

        for edit in edits.iter().filter(|e| !e.is_empty()) {
            apply_edit(&mut state, &mut next_id, edit)?;
        }

        self.state = state;
        self.next_id = next_id;
        Ok(())
    }
}

fn apply_edit(state: &mut GraphState, next_id: &mut u64, edit: &BlockEdit) -> Result<(), BlockError> {
    let block = state
        .blocks
        .get(&edit.block_id)
        .cloned()
        .ok_or(BlockError::UnknownBlock(edit.block_id))?;

    if !same_file(&block.file, &edit.file) {
        return Err(BlockError::BlockNotInFile {
            block: block.id,
            file: edit.file.clone(),
            actual: block.file.clone(),
        });
    }
    if !contains_ignoring_whitespace(&block.text, &edit.before) {
        return Err(BlockError::StructuralMismatch { block: block.id });
    }

    let source = read_source(&block.file)?;
    if !edit.after.is_empty() && !contains_ignoring_whitespace(&source, &edit.after) {
        return Err(BlockError::NoOpEdit {
            block: block.id,
            file: block.file.clone(),
        });
    }

    let language =
        Language::from_path(&block.file).ok_or_else(|| BlockError::UnsupportedLanguage(block.file.clone()))?;
    let parsed = parse_source(&block.file, &source, language)?;
    let style = language.comment_style();

    let old_lines = state
        .files
        .get(&block.file)
        .map_or(parsed.line_count, |entry| entry.line_count);
    #[allow(clippy::cast_possible_wrap)]
    let delta = parsed.line_count as isize - old_lines as isize;

    let mut matcher = Matcher::new(&parsed, style);

    let edited = if edit.after.is_empty() {
        debug!(block = %block.id, "block deleted");
        None
    } else {
        let target = normalize_code(&edit.after, style);
        let candidates = matcher.candidates(block.kind, &target);
        if candidates.len() != 1 {
            return Err(BlockError::AmbiguousMatch {
                kind: block.kind,
                file: block.file.clone(),
                found: candidates.len(),
            });
        }
        matcher.assign(candidates[0], block.id);
        Some(candidates[0])
    };

    resolve_ancestors(state, &mut matcher, &block, edit, edited);

    let mut skip = state.descendants(block.id);
    skip.push(block.id);
    skip.extend(state.ancestors(block.id));

    for other in state.blocks_in_file(&block.file) {
        if skip.contains(&other.id) {
            continue;
        }
        let expected_row = if other.end.row < block.start.row {
            other.start.row
        } else {
            other.start.row.saturating_add_signed(delta)
        };
        let target = normalize_code(&other.text, style);
        let found = matcher
            .candidates(other.kind, &target)
            .into_iter()
            .min_by_key(|i| parsed.blocks[*i].start.row.abs_diff(expected_row));
        match found {
            Some(index) => matcher.assign(index, other.id),
            None => debug!(block = %other.id, "block no longer present after edit"),
        }
    }

    let assignment = matcher.into_assignment();
    state.replace_file(&parsed, &assignment, next_id);
    Ok(())
}

/// Ancestors keep their ids: first by substituting the edit into their
/// cached text, then by walking the enclosing syntax nodes
fn resolve_ancestors(
    state: &GraphState,
    matcher: &mut Matcher<'_>,
    block: &SourceBlock,
    edit: &BlockEdit,
    edited: Option<usize>,
) {
    let parsed = matcher.parsed;
    let chain: Vec<usize> = match edited {
        Some(index) => {
            let mut chain = Vec::new();
            let mut current = parsed.blocks[index].parent;
            while let Some(parent) = current {
                chain.push(parent);
                current = parsed.blocks[parent].parent;
            }
            chain
        }
        None => {
            let mut enclosing: Vec<usize> = (0..parsed.blocks.len())
                .filter(|i| {
                    let raw = &parsed.blocks[*i];
                    raw.start_byte < block.start_byte && block.start_byte < raw.end_byte
                })
                .collect();
            enclosing.sort_by_key(|i| parsed.blocks[*i].end_byte - parsed.blocks[*i].start_byte);
            enclosing
        }
    };
    let mut cursor = 0;

    for ancestor_id in state.ancestors(block.id) {
        let Some(ancestor) = state.blocks.get(&ancestor_id) else {
            continue;
        };

        let literal = (!edit.before.is_empty() && ancestor.text.contains(&edit.before))
            .then(|| ancestor.text.replacen(&edit.before, &edit.after, 1))
            .and_then(|substituted| {
                let target = normalize_code(&substituted, matcher.style);
                let candidates = matcher.candidates(ancestor.kind, &target);
                (candidates.len() == 1).then(|| candidates[0])
            });

        let resolved = literal.or_else(|| {
            let offset = chain[cursor..]
                .iter()
                .position(|i| parsed.blocks[*i].kind == ancestor.kind && !matcher.is_assigned(*i))?;
            Some(chain[cursor + offset])
        });

        match resolved {
            Some(index) => {
                if let Some(position) = chain.iter().position(|i| *i == index) {
                    cursor = position + 1;
                }
                matcher.assign(index, ancestor_id);
            }
            None => warn!(block = %ancestor_id, "could not locate enclosing block after edit"),
        }
    }
}

/// Tracks which parsed blocks already carry an old id
struct Matcher<'p> {
    parsed: &'p ParsedFile,
    style: CommentStyle,
    normalized: Vec<String>,
    assignment: Vec<Option<BlockId>>,
}

impl<'p> Matcher<'p> {
    fn new(parsed: &'p ParsedFile, style: CommentStyle) -> Self {
        Self {
            parsed,
            style,
            normalized: parsed
                .blocks
                .iter()
                .map(|raw| normalize_code(&raw.text, style))
                .collect(),
            assignment: vec![None; parsed.blocks.len()],
        }
    }

    /// Unassigned blocks of `kind` whose normalised text equals `target`
    fn candidates(&self, kind: BlockKind, target: &str) -> Vec<usize> {
        self.parsed
            .blocks
            .iter()
            .enumerate()
            .filter(|(i, raw)| {
                raw.kind == kind && self.assignment[*i].is_none() && self.normalized[*i] == target
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn is_assigned(&self, index: usize) -> bool {
        self.assignment[index].is_some()
    }

    fn assign(&mut self, index: usize, id: BlockId) {
        self.assignment[index] = Some(id);
    }

    fn into_assignment(self) -> Vec<Option<BlockId>> {
        self.assignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::{Path, PathBuf};

    const SOURCE: &str = "using System;\n\nnamespace Demo\n{\n    public class Foo\n    {\n        public int Size { get; set; }\n\n        public void Run()\n        {\n            var x = 1;\n        }\n\n        public void Stop() { }\n    }\n}\n";

    fn setup() -> (tempfile::TempDir, PathBuf, BlockGraph) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Foo.cs");
        fs::write(&path, SOURCE).unwrap();
        let graph = BlockGraph::build(&[path.clone()]).unwrap();
        (dir, path, graph)
    }

    fn by_kind(graph: &BlockGraph, kind: BlockKind) -> SourceBlock {
        graph.get_nodes_by_kind(kind)[0].clone()
    }

    fn rewrite(path: &Path, from: &str, to: &str) {
        let content = fs::read_to_string(path).unwrap();
        fs::write(path, content.replacen(from, to, 1)).unwrap();
    }

    #[test]
    fn empty_update_is_identity() {
        let (_dir, _path, mut graph) = setup();
        let before = graph.clone();
        graph.update_from_edits(&[]).unwrap();
        assert_eq!(graph, before);
    }

    #[test]
    fn edited_block_and_class_keep_ids() {
        let (_dir, path, mut graph) = setup();
        let field = by_kind(&graph, BlockKind::Field);
        let class = by_kind(&graph, BlockKind::Class);

        let after = "public int Count { get; set; }";
        rewrite(&path, &field.text, after);
        graph
            .update_from_edits(&[BlockEdit::new(&path, field.id, field.text.clone(), after)])
            .unwrap();

        assert_eq!(graph.get_node(field.id).unwrap().text, after);
        assert!(graph.get_node(class.id).unwrap().text.contains("Count"));
        assert_eq!(graph.parent(field.id), Some(class.id));
    }

    #[test]
    fn later_blocks_shift_and_keep_ids() {
        let (_dir, path, mut graph) = setup();
        let run = graph
            .get_nodes_by_kind(BlockKind::Method)
            .into_iter()
            .find(|b| b.text.contains("Run"))
            .unwrap()
            .clone();
        let stop = graph
            .get_nodes_by_kind(BlockKind::Method)
            .into_iter()
            .find(|b| b.text.contains("Stop"))
            .unwrap()
            .clone();

        let after = "public void Run()\n        {\n            var x = 1;\n            var y = 2;\n        }";
        rewrite(&path, &run.text, after);
        graph
            .update_from_edits(&[BlockEdit::new(&path, run.id, run.text.clone(), after)])
            .unwrap();

        let moved = graph.get_node(stop.id).unwrap();
        assert_eq!(moved.start.row, stop.start.row + 1);
        assert_eq!(moved.text, stop.text);
        assert_eq!(graph.node_count(), 5);
    }

    #[test]
    fn empty_after_deletes_block() {
        let (_dir, path, mut graph) = setup();
        let field = by_kind(&graph, BlockKind::Field);
        rewrite(&path, &format!("        {}\n", field.text), "");

        graph
            .update_from_edits(&[BlockEdit::new(&path, field.id, field.text.clone(), "")])
            .unwrap();

        assert!(graph.get_node(field.id).is_none());
        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn unchanged_file_is_rejected() {
        let (_dir, path, mut graph) = setup();
        let field = by_kind(&graph, BlockKind::Field);
        let err = graph
            .update_from_edits(&[BlockEdit::new(&path, field.id, field.text.clone(), "public int Other;")])
            .unwrap_err();
        assert!(matches!(err, BlockError::NoOpEdit { .. }));
    }

    #[test]
    fn wrong_file_is_rejected() {
        let (dir, _path, mut graph) = setup();
        let field = by_kind(&graph, BlockKind::Field);
        let err = graph
            .update_from_edits(&[BlockEdit::new(
                dir.path().join("Other.cs"),
                field.id,
                field.text.clone(),
                "public int Other;",
            )])
            .unwrap_err();
        assert!(matches!(err, BlockError::BlockNotInFile { .. }));
    }

    #[test]
    fn failed_update_leaves_graph_untouched() {
        let (_dir, path, mut graph) = setup();
        let field = by_kind(&graph, BlockKind::Field);
        let before = graph.clone();
        let err = graph
            .update_from_edits(&[BlockEdit::new(&path, field.id, "int NotThere;", "int X;")])
            .unwrap_err();
        assert!(matches!(err, BlockError::StructuralMismatch { .. }));
        assert_eq!(graph, before);
    }
}
