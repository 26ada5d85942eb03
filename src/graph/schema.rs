//! Graph schema definitions for code knowledge nodes and edges.
//!
//! This module defines the node kinds, stable id derivation, property keys
//! and edge types used to store repository knowledge in the graph.

use serde::{Deserialize, Serialize};

/// Kind of a persisted graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A source file.
    File,
    /// A line-ranged slice of a file.
    Chunk,
    /// An extracted entity (import, export, class, function, call, ...).
    Entity,
    /// The repository root.
    Workspace,
    /// An external or builtin package.
    Package,
}

impl NodeKind {
    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Chunk => "chunk",
            NodeKind::Entity => "entity",
            NodeKind::Workspace => "workspace",
            NodeKind::Package => "package",
        }
    }

    /// Parse a stored kind string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "file" => Some(NodeKind::File),
            "chunk" => Some(NodeKind::Chunk),
            "entity" => Some(NodeKind::Entity),
            "workspace" => Some(NodeKind::Workspace),
            "package" => Some(NodeKind::Package),
            _ => None,
        }
    }
}

/// Id of the workspace node for a repository.
pub fn workspace_id(repo_id: &str) -> String {
    format!("workspace:{}", repo_id)
}

/// Id of a file node. Keyed by the repository-relative path.
pub fn file_id(path: &str) -> String {
    format!("file:{}", path)
}

/// Id of a chunk node, derived from its owning file and content hash.
pub fn chunk_id(path: &str, hash: &str) -> String {
    format!("chunk:{}#{}", path, hash)
}

/// Id of an entity node.
///
/// The same `(file, type, name, source)` always maps to the same id, so
/// reprocessing a file upserts instead of duplicating.
pub fn entity_id(path: &str, entity_type: &str, name: &str, source: Option<&str>) -> String {
    match source {
        Some(source) => format!("entity:{}#{}:{}@{}", path, entity_type, name, source),
        None => format!("entity:{}#{}:{}", path, entity_type, name),
    }
}

/// Id of a package node.
pub fn package_id(name: &str) -> String {
    format!("{}{}", PACKAGE_PREFIX, name)
}

/// Id of a placeholder node for a call target no file has declared yet.
pub fn symbol_id(name: &str) -> String {
    format!("{}{}", SYMBOL_PREFIX, name)
}

/// Prefix shared by all package node ids.
pub const PACKAGE_PREFIX: &str = "package:";

/// Prefix shared by all call-target placeholder ids.
pub const SYMBOL_PREFIX: &str = "symbol:";

/// Property marking a file node that only an import created.
pub const PROP_PLACEHOLDER: &str = "placeholder";

/// Entity type of declared functions, the only call targets.
pub const ENTITY_FUNCTION: &str = "function";

/// Property key for the owning file path.
pub const PROP_FILE_PATH: &str = "file_path";

/// Property key for the source language.
pub const PROP_LANGUAGE: &str = "language";

/// Property key for file size in bytes.
pub const PROP_SIZE_BYTES: &str = "size_bytes";

/// Property key for an entity's name.
pub const PROP_NAME: &str = "name";

/// Property key for an entity's type.
pub const PROP_ENTITY_TYPE: &str = "entity_type";

/// Property key for confidence scores on nodes and edges.
pub const PROP_CONFIDENCE: &str = "confidence";

/// Property key for the chunk an entity was declared in.
pub const PROP_CHUNK_ID: &str = "chunk_id";

/// Edge type for containment (workspace contains file, file contains chunk).
pub const EDGE_CONTAINS: &str = "contains";

/// Edge type for chunk (or file) defines entity.
pub const EDGE_DEFINES: &str = "defines";

/// Edge type for import relationships.
pub const EDGE_IMPORTS: &str = "imports";

/// Edge type for export relationships.
pub const EDGE_EXPORTS: &str = "exports";

/// Edge type for calls relationships (caller calls callee).
pub const EDGE_CALLS: &str = "calls";

/// Edge type linking an entity to the same entity owned by another file.
pub const EDGE_REFERENCES: &str = "references";

/// Edge type linking consecutive chunks of one file.
pub const EDGE_PRECEDES: &str = "precedes";

/// Edge type linking chunks whose entities reference each other.
pub const EDGE_CHUNK_REFERENCES: &str = "chunk_references";

/// Edge types that connect chunk nodes to chunk nodes.
pub const CHUNK_EDGE_TYPES: &[&str] = &[EDGE_PRECEDES, EDGE_CHUNK_REFERENCES];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_is_stable() {
        let a = entity_id("src/a.ts", "import", "Router", Some("express"));
        let b = entity_id("src/a.ts", "import", "Router", Some("express"));
        assert_eq!(a, b);
        assert_eq!(a, "entity:src/a.ts#import:Router@express");
    }

    #[test]
    fn test_entity_id_without_source() {
        assert_eq!(
            entity_id("lib.rs", "function", "main", None),
            "entity:lib.rs#function:main"
        );
    }

    #[test]
    fn test_node_kind_round_trips_through_str() {
        for kind in [
            NodeKind::File,
            NodeKind::Chunk,
            NodeKind::Entity,
            NodeKind::Workspace,
            NodeKind::Package,
        ] {
            assert_eq!(NodeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NodeKind::parse("symbol"), None);
    }
}
