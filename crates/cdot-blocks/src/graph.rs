//! Block graph
//!
//! Holds every block of every tracked file together with containment and
//! constructor edges. State lives in persistent maps so a snapshot is a
//! pointer copy and `revert` restores ids, ranges, text and edges exactly.

use std::path::{Path, PathBuf};

use im::{OrdMap, OrdSet};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::block::{same_file, BlockId, BlockKind, Relation, SourceBlock};
use crate::error::BlockError;
use crate::language::Language;
use crate::parse::{parse_file, parse_source, ParsedFile};
use crate::text::read_source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileEntry {
    pub(crate) language: Language,
    pub(crate) line_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct GraphState {
    pub(crate) blocks: OrdMap<BlockId, SourceBlock>,
    pub(crate) parents: OrdMap<BlockId, BlockId>,
    pub(crate) children: OrdMap<BlockId, OrdSet<BlockId>>,
    pub(crate) files: OrdMap<PathBuf, FileEntry>,
}

impl GraphState {
    pub(crate) fn ancestors(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parents.get(&current) {
            out.push(*parent);
            current = *parent;
        }
        out
    }

    pub(crate) fn descendants(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(children) = self.children.get(&current) {
                for child in children {
                    out.push(*child);
                    stack.push(*child);
                }
            }
        }
        out.sort();
        out
    }

    /// Blocks of a file ordered by position
    pub(crate) fn blocks_in_file(&self, file: &Path) -> Vec<&SourceBlock> {
        let mut blocks: Vec<_> = self.blocks.values().filter(|b| b.file == file).collect();
        blocks.sort_by_key(|b| (b.start_byte, b.id));
        blocks
    }

    /// Replace every block of `parsed.path` with the parsed blocks
    ///
    /// `assignment[i]` carries the id kept for `parsed.blocks[i]`; `None`
    /// allocates a fresh one.
    pub(crate) fn replace_file(
        &mut self,
        parsed: &ParsedFile,
        assignment: &[Option<BlockId>],
        next_id: &mut u64,
    ) {
        let stale: Vec<BlockId> = self
            .blocks
            .values()
            .filter(|b| b.file == parsed.path)
            .map(|b| b.id)
            .collect();
        for id in stale {
            self.blocks.remove(&id);
            self.parents.remove(&id);
            self.children.remove(&id);
        }

        let ids: Vec<BlockId> = assignment
            .iter()
            .map(|kept| {
                kept.unwrap_or_else(|| {
                    let id = BlockId(*next_id);
                    *next_id += 1;
                    id
                })
            })
            .collect();

        for (raw, id) in parsed.blocks.iter().zip(&ids) {
            self.blocks.insert(
                *id,
                SourceBlock {
                    id: *id,
                    kind: raw.kind,
                    file: parsed.path.clone(),
                    start: raw.start,
                    end: raw.end,
                    start_byte: raw.start_byte,
                    end_byte: raw.end_byte,
                    text: raw.text.clone(),
                },
            );
            if let Some(parent) = raw.parent {
                let parent_id = ids[parent];
                self.parents.insert(*id, parent_id);
                let mut siblings = self.children.get(&parent_id).cloned().unwrap_or_default();
                siblings.insert(*id);
                self.children.insert(parent_id, siblings);
            }
        }

        self.files.insert(
            parsed.path.clone(),
            FileEntry {
                language: parsed.language,
                line_count: parsed.line_count,
            },
        );
    }
}

/// Graph of syntax blocks across a set of files
#[derive(Debug, Clone, Default)]
pub struct BlockGraph {
    pub(crate) state: GraphState,
    history: Vec<GraphState>,
    pub(crate) next_id: u64,
}

impl BlockGraph {
    /// Empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every supported file and number its blocks
    ///
    /// Files are parsed in parallel; ids are handed out in input order so the
    /// same inputs always produce the same ids. Unsupported extensions are
    /// skipped.
    ///
    /// # Errors
    /// Returns the first read or parse failure
    pub fn build<P: AsRef<Path> + Sync>(paths: &[P]) -> Result<Self, BlockError> {
        let supported: Vec<&Path> = paths
            .iter()
            .map(AsRef::as_ref)
            .filter(|path| {
                let known = Language::from_path(path).is_some();
                if !known {
                    debug!(path = %path.display(), "skipping file with unsupported extension");
                }
                known
            })
            .collect();

        let parsed: Vec<ParsedFile> = supported
            .par_iter()
            .map(|path| parse_file(path))
            .collect::<Result<_, _>>()?;

        let mut graph = Self::new();
        for file in &parsed {
            graph.insert_parsed(file);
        }
        info!(
            files = parsed.len(),
            blocks = graph.node_count(),
            "built block graph"
        );
        Ok(graph)
    }

    /// Parse one more file into the graph
    ///
    /// # Errors
    /// Returns [`BlockError::UnsupportedLanguage`] or a read/parse failure
    pub fn add_file(&mut self, path: &Path) -> Result<(), BlockError> {
        let parsed = parse_file(path)?;
        self.insert_parsed(&parsed);
        Ok(())
    }

    fn insert_parsed(&mut self, parsed: &ParsedFile) {
        let assignment = vec![None; parsed.blocks.len()];
        self.state.replace_file(parsed, &assignment, &mut self.next_id);
    }

    /// Look up a block
    #[inline]
    #[must_use]
    pub fn get_node(&self, id: BlockId) -> Option<&SourceBlock> {
        self.state.blocks.get(&id)
    }

    /// Look up a block, failing when unknown
    ///
    /// # Errors
    /// Returns [`BlockError::UnknownBlock`]
    pub fn node(&self, id: BlockId) -> Result<&SourceBlock, BlockError> {
        self.get_node(id).ok_or(BlockError::UnknownBlock(id))
    }

    /// All blocks in id order
    pub fn nodes(&self) -> impl Iterator<Item = &SourceBlock> {
        self.state.blocks.values()
    }

    /// Blocks of one kind in id order
    #[must_use]
    pub fn get_nodes_by_kind(&self, kind: BlockKind) -> Vec<&SourceBlock> {
        self.nodes().filter(|b| b.kind == kind).collect()
    }

    /// Blocks of one file ordered by position
    #[must_use]
    pub fn nodes_in_file(&self, file: &Path) -> Vec<&SourceBlock> {
        match self.tracked_path(file) {
            Some(tracked) => self.state.blocks_in_file(tracked),
            None => Vec::new(),
        }
    }

    /// Innermost block covering a row of a file
    #[must_use]
    pub fn block_at(&self, file: &Path, row: usize) -> Option<&SourceBlock> {
        self.nodes_in_file(file)
            .into_iter()
            .filter(|b| b.contains_row(row))
            .min_by_key(|b| b.end_byte - b.start_byte)
    }

    /// Tracked files
    #[must_use]
    pub fn files(&self) -> Vec<&Path> {
        self.state.files.keys().map(PathBuf::as_path).collect()
    }

    /// Stored form of `file`, if tracked
    fn tracked_path(&self, file: &Path) -> Option<&Path> {
        self.state
            .files
            .keys()
            .find(|tracked| same_file(tracked, file))
            .map(PathBuf::as_path)
    }

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.blocks.len()
    }

    /// Enclosing block
    #[inline]
    #[must_use]
    pub fn parent(&self, id: BlockId) -> Option<BlockId> {
        self.state.parents.get(&id).copied()
    }

    /// Directly contained blocks in id order
    #[must_use]
    pub fn children(&self, id: BlockId) -> Vec<BlockId> {
        self.state
            .children
            .get(&id)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Enclosing blocks, nearest first
    #[must_use]
    pub fn ancestors(&self, id: BlockId) -> Vec<BlockId> {
        self.state.ancestors(id)
    }

    /// Transitively contained blocks in id order
    #[must_use]
    pub fn descendants(&self, id: BlockId) -> Vec<BlockId> {
        self.state.descendants(id)
    }

    /// Class a constructor builds
    #[must_use]
    pub fn constructed_class(&self, id: BlockId) -> Option<BlockId> {
        let block = self.get_node(id)?;
        if block.kind != BlockKind::Constructor {
            return None;
        }
        self.parent(id)
            .filter(|parent| self.get_node(*parent).is_some_and(|p| p.kind == BlockKind::Class))
    }

    /// Every edge with its relation: containment runs parent to child,
    /// construction runs constructor to class
    #[must_use]
    pub fn relations(&self) -> Vec<(BlockId, BlockId, Relation)> {
        let mut edges: Vec<_> = self
            .state
            .parents
            .iter()
            .map(|(child, parent)| (*parent, *child, Relation::Contains))
            .collect();
        edges.extend(
            self.nodes()
                .filter_map(|b| self.constructed_class(b.id).map(|class| (b.id, class, Relation::Constructs))),
        );
        edges.sort();
        edges
    }

    /// Push a snapshot of the current state
    pub fn save_state(&mut self) {
        self.history.push(self.state.clone());
    }

    /// Restore and drop the latest snapshot
    ///
    /// # Errors
    /// Returns [`BlockError::NoSavedState`] when nothing was saved
    pub fn revert(&mut self) -> Result<(), BlockError> {
        self.state = self.history.pop().ok_or(BlockError::NoSavedState)?;
        Ok(())
    }

    /// Drop the latest snapshot, keeping the current state
    ///
    /// # Errors
    /// Returns [`BlockError::NoSavedState`] when nothing was saved
    pub fn discard_state(&mut self) -> Result<(), BlockError> {
        self.history.pop().map(|_| ()).ok_or(BlockError::NoSavedState)
    }

    /// Number of snapshots on the stack
    #[inline]
    #[must_use]
    pub fn saved_states(&self) -> usize {
        self.history.len()
    }

    /// Whether any tracked file currently fails to parse cleanly
    ///
    /// # Errors
    /// Returns a read or parse failure
    pub fn has_syntax_errors(&self) -> Result<bool, BlockError> {
        let files: Vec<&Path> = self.files();
        self.has_syntax_errors_in(&files)
    }

    /// Whether any of the given files currently fails to parse cleanly
    ///
    /// # Errors
    /// Returns a read or parse failure
    pub fn has_syntax_errors_in(&self, files: &[&Path]) -> Result<bool, BlockError> {
        for file in files {
            let language = Language::from_path(file)
                .ok_or_else(|| BlockError::UnsupportedLanguage(file.to_path_buf()))?;
            let source = read_source(file)?;
            if parse_source(file, &source, language)?.has_error {
                debug!(file = %file.display(), "syntax error detected");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl PartialEq for BlockGraph {
    /// Graphs are equal when their current blocks and edges are
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
    }
}
