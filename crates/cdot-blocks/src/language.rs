//! Languages and their block matchers
//!
//! Each language maps tree-sitter node kinds onto [`BlockKind`]s.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::block::BlockKind;
use crate::text::CommentStyle;

/// Programming language support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    CSharp,
    Python,
    Rust,
    TypeScript,
    Go,
}

impl Language {
    /// Get file extensions for this language
    #[inline]
    #[must_use]
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::CSharp => &["cs"],
            Language::Python => &["py"],
            Language::Rust => &["rs"],
            Language::TypeScript => &["ts", "tsx"],
            Language::Go => &["go"],
        }
    }

    /// Detect language from file extension
    #[inline]
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.') {
            "cs" => Some(Language::CSharp),
            "py" => Some(Language::Python),
            "rs" => Some(Language::Rust),
            "ts" | "tsx" => Some(Language::TypeScript),
            "go" => Some(Language::Go),
            _ => None,
        }
    }

    /// Detect language from a path's extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get tree-sitter language
    #[must_use]
    pub fn tree_sitter_language(&self) -> tree_sitter::Language {
        match self {
            Language::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }

    /// Comment syntax used when normalising text
    #[inline]
    #[must_use]
    pub fn comment_style(&self) -> CommentStyle {
        match self {
            Language::Python => CommentStyle::Hash,
            _ => CommentStyle::CLike,
        }
    }

    /// Whether a syntax node kind is a comment
    #[inline]
    #[must_use]
    pub fn is_comment(&self, node_kind: &str) -> bool {
        node_kind == "comment" || node_kind.ends_with("_comment")
    }

    /// Classify a syntax node, or `None` when it is not a block
    #[must_use]
    pub fn classify(&self, node: &tree_sitter::Node<'_>, source: &[u8]) -> Option<BlockKind> {
        let kind = node.kind();
        match self {
            Language::CSharp => match kind {
                "using_directive" => Some(BlockKind::Import),
                "class_declaration"
                | "interface_declaration"
                | "struct_declaration"
                | "record_declaration"
                | "enum_declaration" => Some(BlockKind::Class),
                "method_declaration" => Some(BlockKind::Method),
                "constructor_declaration" => Some(BlockKind::Constructor),
                "field_declaration" | "property_declaration" => Some(BlockKind::Field),
                _ => None,
            },
            Language::Python => match kind {
                "import_statement" | "import_from_statement" => Some(BlockKind::Import),
                "class_definition" => Some(BlockKind::Class),
                "function_definition" => Some(callable_kind(node, source, "__init__")),
                _ => None,
            },
            Language::Rust => match kind {
                "use_declaration" => Some(BlockKind::Import),
                "struct_item" | "enum_item" | "trait_item" | "impl_item" => Some(BlockKind::Class),
                "function_item" => Some(callable_kind(node, source, "new")),
                "field_declaration" => Some(BlockKind::Field),
                _ => None,
            },
            Language::TypeScript => match kind {
                "import_statement" => Some(BlockKind::Import),
                "class_declaration" | "abstract_class_declaration" | "interface_declaration" => {
                    Some(BlockKind::Class)
                }
                "method_definition" => Some(callable_kind(node, source, "constructor")),
                "function_declaration" => Some(BlockKind::Method),
                "public_field_definition" => Some(BlockKind::Field),
                _ => None,
            },
            Language::Go => match kind {
                "import_declaration" => Some(BlockKind::Import),
                "type_declaration" => Some(BlockKind::Class),
                "function_declaration" | "method_declaration" => Some(BlockKind::Method),
                "field_declaration" => Some(BlockKind::Field),
                _ => None,
            },
        }
    }
}

fn callable_kind(node: &tree_sitter::Node<'_>, source: &[u8], constructor_name: &str) -> BlockKind {
    let is_constructor = node
        .child_by_field_name("name")
        .and_then(|name| name.utf8_text(source).ok())
        .is_some_and(|name| name == constructor_name);
    if is_constructor {
        BlockKind::Constructor
    } else {
        BlockKind::Method
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Language::CSharp => "C#",
            Language::Python => "Python",
            Language::Rust => "Rust",
            Language::TypeScript => "TypeScript",
            Language::Go => "Go",
        };
        write!(f, "{name}")
    }
}
