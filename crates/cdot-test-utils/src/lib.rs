//! Testing utilities for the cdot workspace
//!
//! Shared fixtures, temporary projects and error builders.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use cdot_blocks::{BlockEdit, BlockGraph, BlockKind, SourceBlock};
use cdot_graph::{CompileError, ErrorPosition};
use tempfile::TempDir;

/// A small C# class with imports, a property, a constructor and a method
pub const CART_CS: &str = r#"using System;
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

/// Text of the `DistinctId` property in [`CART_CS`]
pub const DISTINCT_ID_PROPERTY: &str = "[JsonIgnore]\n        public string? DistinctId { get; set; }";

/// The same property renamed
pub const RENAMED_PROPERTY: &str = "[JsonIgnore]\n        public string? NewVariableName { get; set; }";

/// Row of the `DistinctId` declaration in [`CART_CS`]
pub const DISTINCT_ID_ROW: usize = 8;

/// [`CART_CS`] after the property rename
#[must_use]
pub fn cart_renamed() -> String {
    CART_CS.replace("DistinctId", "NewVariableName")
}

/// A throwaway project directory
pub struct TempProject {
    dir: TempDir,
}

impl TempProject {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Project holding `Cart.cs`
    #[must_use]
    pub fn with_cart() -> Self {
        let project = Self::new();
        project.write("Cart.cs", CART_CS);
        project
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a file, creating parent directories
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    #[must_use]
    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).unwrap()
    }

    /// Block graph over the named files
    #[must_use]
    pub fn block_graph(&self, names: &[&str]) -> BlockGraph {
        let paths: Vec<PathBuf> = names.iter().map(|n| self.path(n)).collect();
        BlockGraph::build(&paths).unwrap()
    }
}

impl Default for TempProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Error reported on one whole line
#[must_use]
pub fn line_error(text: &str, file: impl Into<PathBuf>, project: &str, row: usize) -> CompileError {
    CompileError::new(text, file, project, ErrorPosition::new(row, 0, row, 0))
}

/// First block of `kind` whose text contains `needle`
#[must_use]
pub fn find_block<'g>(graph: &'g BlockGraph, kind: BlockKind, needle: &str) -> &'g SourceBlock {
    graph
        .get_nodes_by_kind(kind)
        .into_iter()
        .find(|b| b.text.contains(needle))
        .unwrap_or_else(|| panic!("no {kind:?} block containing {needle:?}"))
}

/// Edit replacing the whole text of `block`
#[must_use]
pub fn rewrite(block: &SourceBlock, after: &str) -> BlockEdit {
    BlockEdit::new(block.file.clone(), block.id, block.text.clone(), after)
}
