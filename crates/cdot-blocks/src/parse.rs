//! Source parsing into unnumbered blocks

use std::path::{Path, PathBuf};

use crate::block::{BlockKind, Position};
use crate::error::BlockError;
use crate::language::Language;
use crate::text::read_source;

/// Block extracted from a syntax tree, before an id is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawBlock {
    pub(crate) kind: BlockKind,
    pub(crate) start: Position,
    pub(crate) end: Position,
    pub(crate) start_byte: usize,
    pub(crate) end_byte: usize,
    pub(crate) text: String,
    /// Index of the nearest enclosing block in the same file
    pub(crate) parent: Option<usize>,
}

/// All blocks of one file in pre-order
#[derive(Debug, Clone)]
pub(crate) struct ParsedFile {
    pub(crate) path: PathBuf,
    pub(crate) language: Language,
    pub(crate) blocks: Vec<RawBlock>,
    pub(crate) line_count: usize,
    pub(crate) has_error: bool,
}

impl ParsedFile {
    /// Whether `ancestor` encloses `index`
    pub(crate) fn is_ancestor(&self, ancestor: usize, mut index: usize) -> bool {
        while let Some(parent) = self.blocks[index].parent {
            if parent == ancestor {
                return true;
            }
            index = parent;
        }
        false
    }
}

pub(crate) fn parse_tree(source: &str, language: Language, path: &Path) -> Result<tree_sitter::Tree, BlockError> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&language.tree_sitter_language())
        .map_err(|e| BlockError::ParserInit(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| BlockError::ParseFailed(path.to_path_buf()))
}

/// Read and parse one file
pub(crate) fn parse_file(path: &Path) -> Result<ParsedFile, BlockError> {
    let language =
        Language::from_path(path).ok_or_else(|| BlockError::UnsupportedLanguage(path.to_path_buf()))?;
    let source = read_source(path)?;
    parse_source(path, &source, language)
}

pub(crate) fn parse_source(path: &Path, source: &str, language: Language) -> Result<ParsedFile, BlockError> {
    let tree = parse_tree(source, language, path)?;
    let root = tree.root_node();

    let mut blocks = Vec::new();
    collect(root, source, language, None, &mut blocks);

    Ok(ParsedFile {
        path: path.to_path_buf(),
        language,
        blocks,
        line_count: source.lines().count(),
        has_error: root.has_error(),
    })
}

fn collect(
    node: tree_sitter::Node<'_>,
    source: &str,
    language: Language,
    parent: Option<usize>,
    out: &mut Vec<RawBlock>,
) {
    let mut parent = parent;
    if let Some(kind) = language.classify(&node, source.as_bytes()) {
        let head = leading_comment_start(node, language);
        let start_byte = head.start_byte();
        let end_byte = node.end_byte();
        out.push(RawBlock {
            kind,
            start: head.start_position().into(),
            end: node.end_position().into(),
            start_byte,
            end_byte,
            text: source[start_byte..end_byte].to_string(),
            parent,
        });
        parent = Some(out.len() - 1);
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect(child, source, language, parent, out);
    }
}

/// First node of the run of comments directly above `node`, or `node` itself
fn leading_comment_start<'t>(node: tree_sitter::Node<'t>, language: Language) -> tree_sitter::Node<'t> {
    let mut head = node;
    while let Some(previous) = head.prev_sibling() {
        let adjacent = previous.end_position().row + 1 >= head.start_position().row;
        if !language.is_comment(previous.kind()) || !adjacent {
            break;
        }
        // a trailing comment on the previous statement's line belongs to that statement
        let shares_line = previous
            .prev_sibling()
            .is_some_and(|before| before.end_position().row == previous.start_position().row);
        if shares_line {
            break;
        }
        head = previous;
    }
    head
}
