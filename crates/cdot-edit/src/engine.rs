//! Apply/revert transactions over files and the block graph
//!
//! A transaction remembers the bytes of every file it touched the first time
//! it touched it, and holds one block graph snapshot. Reverting writes those
//! bytes back and pops the snapshot, so files and graph return together.

use std::fs;
use std::path::{Path, PathBuf};

use cdot_blocks::text::BOM;
use cdot_blocks::{read_source, BlockEdit, BlockGraph};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::EditError;
use crate::splice::splice_block;

/// Original contents of touched files, first touch wins
#[derive(Debug, Default)]
struct Originals {
    files: IndexMap<PathBuf, Vec<u8>>,
}

impl Originals {
    fn record(&mut self, path: &Path) -> Result<&[u8], EditError> {
        if !self.files.contains_key(path) {
            let bytes = fs::read(path).map_err(|e| EditError::io(path, e))?;
            self.files.insert(path.to_path_buf(), bytes);
        }
        Ok(self.files.get(path).map_or(&[][..], Vec::as_slice))
    }

    fn restore(&self) -> Result<(), EditError> {
        for (path, bytes) in &self.files {
            fs::write(path, bytes).map_err(|e| EditError::io(path, e))?;
        }
        Ok(())
    }

    fn absorb(&mut self, newer: Originals) {
        for (path, bytes) in newer.files {
            self.files.entry(path).or_insert(bytes);
        }
    }
}

/// Write each edit and update the graph after it
fn write_edits(graph: &mut BlockGraph, edits: &[BlockEdit], originals: &mut Originals) -> Result<(), EditError> {
    for edit in edits.iter().filter(|e| !e.is_empty()) {
        let block = graph.node(edit.block_id)?.clone();
        let had_bom = {
            let original = originals.record(&block.file)?;
            original.starts_with(BOM.to_string().as_bytes())
        };

        let content = read_source(&block.file)?;
        let mut updated = splice_block(&content, &block, &edit.after);
        if had_bom {
            updated.insert(0, BOM);
        }
        fs::write(&block.file, updated).map_err(|e| EditError::io(&block.file, e))?;
        debug!(block = %block.id, file = %block.file.display(), "edit written");

        graph.update_from_edits(std::slice::from_ref(edit))?;
    }
    Ok(())
}

/// Apply edits behind a fresh graph snapshot
///
/// On failure the files and graph are rolled back and the snapshot is gone;
/// on success the snapshot stays on the stack for the caller.
fn apply_tracked(graph: &mut BlockGraph, edits: &[BlockEdit]) -> Result<Originals, EditError> {
    graph.save_state();
    let mut originals = Originals::default();
    match write_edits(graph, edits, &mut originals) {
        Ok(()) => Ok(originals),
        Err(err) => {
            if let Err(restore) = originals.restore() {
                warn!(error = %restore, "failed to restore files after rejected edit");
            }
            graph.revert()?;
            Err(err)
        }
    }
}

/// Applies block edits and reverts them byte-for-byte
#[derive(Debug, Default)]
pub struct EditEngine {
    transaction: Option<Originals>,
}

impl EditEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply edits inside the engine's transaction, opening it if needed
    ///
    /// Empty input is a no-op. If any edit fails, the edits of this call are
    /// rolled back; edits applied by earlier calls stay.
    ///
    /// # Errors
    /// Returns an I/O error or the block graph's rejection of an edit
    pub fn apply_change(&mut self, graph: &mut BlockGraph, edits: &[BlockEdit]) -> Result<(), EditError> {
        if edits.iter().all(BlockEdit::is_empty) {
            return Ok(());
        }

        let opening = self.transaction.is_none();
        if opening {
            graph.save_state();
        }

        match apply_tracked(graph, edits) {
            Ok(originals) => {
                graph.discard_state()?;
                self.transaction.get_or_insert_with(Originals::default).absorb(originals);
                debug!(edits = edits.len(), "change applied");
                Ok(())
            }
            Err(err) => {
                if opening {
                    graph.discard_state()?;
                }
                Err(err)
            }
        }
    }

    /// Restore every touched file and the graph to the transaction's start
    ///
    /// # Errors
    /// Returns [`EditError::NothingToRevert`] without an open transaction, or
    /// an I/O error while writing files back
    pub fn revert_change(&mut self, graph: &mut BlockGraph) -> Result<(), EditError> {
        let originals = self.transaction.take().ok_or(EditError::NothingToRevert)?;
        originals.restore()?;
        graph.revert()?;
        debug!(files = originals.files.len(), "change reverted");
        Ok(())
    }

    /// Whether a transaction is open
    #[inline]
    #[must_use]
    pub fn can_revert(&self) -> bool {
        self.transaction.is_some()
    }

    /// Files touched by the open transaction
    #[must_use]
    pub fn touched_files(&self) -> Vec<&Path> {
        self.transaction
            .as_ref()
            .map(|t| t.files.keys().map(PathBuf::as_path).collect())
            .unwrap_or_default()
    }

    /// Apply edits, run `f` against the updated graph, then revert
    ///
    /// The revert happens on every exit path, including a panic inside `f`.
    /// Nests inside an open transaction.
    ///
    /// # Errors
    /// Returns an error when the edits cannot be applied or the files cannot
    /// be written back
    pub fn with_applied<T, F>(graph: &mut BlockGraph, edits: &[BlockEdit], f: F) -> Result<T, EditError>
    where
        F: FnOnce(&BlockGraph) -> T,
    {
        let originals = apply_tracked(graph, edits)?;
        let guard = ScopeGuard {
            graph,
            originals,
            finished: false,
        };
        let value = f(&*guard.graph);
        guard.finish()?;
        Ok(value)
    }
}

/// Reverts a scoped application when dropped
struct ScopeGuard<'g> {
    graph: &'g mut BlockGraph,
    originals: Originals,
    finished: bool,
}

impl ScopeGuard<'_> {
    fn finish(mut self) -> Result<(), EditError> {
        self.finished = true;
        let restored = self.originals.restore();
        let reverted = self.graph.revert().map_err(EditError::from);
        restored.and(reverted)
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.originals.restore() {
            warn!(error = %err, "failed to restore files after scoped application");
        }
        if let Err(err) = self.graph.revert() {
            warn!(error = %err, "failed to revert block graph after scoped application");
        }
    }
}
