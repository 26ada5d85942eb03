//! Source → syntax tree → raw entity extraction.
//!
//! Each supported language has a tree-sitter walker producing
//! [`RawEntity`] records with 1-based lines. Scope marks where a binding
//! was declared; uses (calls, type references) carry module scope so the
//! local-scope filter only removes bindings.

pub mod detect;
mod ecmascript;
mod python;
mod rust;

use crate::entity::RawEntity;
use crate::error::{Result, WeaveError};
use detect::{detect_language, is_tsx, Language};
use std::path::Path;

/// Turns a source file into raw entities.
pub trait EntityExtractor: Send + Sync {
    /// Extract entities from `source`, the content of `path`.
    fn extract(&self, path: &Path, source: &str) -> Result<Vec<RawEntity>>;
}

/// [`EntityExtractor`] built on tree-sitter grammars.
///
/// A parser is created per call, so one extractor can be shared across
/// worker threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSitterExtractor;

impl EntityExtractor for TreeSitterExtractor {
    fn extract(&self, path: &Path, source: &str) -> Result<Vec<RawEntity>> {
        let language = detect_language(path).ok_or_else(|| WeaveError::Parse {
            file: path.to_path_buf(),
            message: "Unsupported file extension".to_string(),
        })?;

        let entities = match language {
            Language::Rust => {
                let tree = parse(path, source, &tree_sitter_rust::language(), "Rust")?;
                rust::extract(&tree, source.as_bytes())
            }
            Language::Python => {
                let tree = parse(path, source, &tree_sitter_python::language(), "Python")?;
                python::extract(&tree, source.as_bytes())
            }
            Language::JavaScript => {
                let tree = parse(path, source, &tree_sitter_javascript::language(), "JavaScript")?;
                ecmascript::extract(&tree, source.as_bytes())
            }
            Language::TypeScript if is_tsx(path) => {
                let tree = parse(path, source, &tree_sitter_typescript::language_tsx(), "TSX")?;
                ecmascript::extract(&tree, source.as_bytes())
            }
            Language::TypeScript => {
                let tree = parse(path, source, &tree_sitter_typescript::language_typescript(), "TypeScript")?;
                ecmascript::extract(&tree, source.as_bytes())
            }
        };

        log::debug!("{}: extracted {} entities", path.display(), entities.len());
        Ok(entities)
    }
}

fn parse(path: &Path, source: &str, language: &tree_sitter::Language, label: &str) -> Result<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser.set_language(language).map_err(|e| WeaveError::Parse {
        file: path.to_path_buf(),
        message: format!("Failed to set {} language: {:?}", label, e),
    })?;

    let tree = parser.parse(source, None).ok_or_else(|| WeaveError::Parse {
        file: path.to_path_buf(),
        message: "Parse failed - no tree returned".to_string(),
    })?;
    if tree.root_node().has_error() {
        log::debug!("{}: syntax errors, extracting what parsed", path.display());
    }
    Ok(tree)
}

/// Source text of a node; empty on invalid UTF-8.
pub(crate) fn text<'a>(node: tree_sitter::Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// 1-based start line of a node.
pub(crate) fn line(node: tree_sitter::Node) -> usize {
    node.start_position().row + 1
}

/// Text of the named field, if present.
pub(crate) fn field_text<'a>(node: tree_sitter::Node, field: &str, source: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name(field).map(|child| text(child, source))
}

/// Whether `node` is the `name` field of its parent, i.e. a declaration
/// rather than a use.
pub(crate) fn is_declared_name(node: tree_sitter::Node) -> bool {
    node.parent()
        .and_then(|parent| parent.child_by_field_name("name"))
        .is_some_and(|name| name.id() == node.id())
}

/// Visit each child of `node`.
pub(crate) fn for_each_child(node: tree_sitter::Node, mut visit: impl FnMut(tree_sitter::Node)) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit(child);
    }
}
