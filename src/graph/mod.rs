//! Graph storage layer.
//!
//! This module provides a typed interface to the code knowledge graph:
//! file, chunk, entity, workspace and package nodes joined by typed,
//! directed edges. Storage is swappable behind [`GraphStore`]; the
//! SQLite and in-memory backends implement the same contract.

pub mod file_index;
pub mod memory;
pub mod schema;
pub mod sqlite;
mod traverse;

pub use file_index::{FileIndex, FileIndexEntry, HashStatus};
pub use memory::MemoryGraphStore;
pub use schema::NodeKind;
pub use sqlite::SqliteGraphStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{Result, WeaveError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// A persisted graph vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable id (see [`schema`] for derivation).
    pub id: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Human-readable label.
    pub label: String,
    /// Free-form JSON object of properties.
    pub properties: Value,
}

impl GraphNode {
    /// Create a node with an empty property object.
    pub fn new(id: impl Into<String>, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            properties: json!({}),
        }
    }

    /// Replace the property object.
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    /// Owning file path, when stored.
    pub fn file_path(&self) -> Option<&str> {
        self.properties
            .get(schema::PROP_FILE_PATH)
            .and_then(|v| v.as_str())
    }

    /// String property by key.
    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    /// Confidence property; nodes without one count as certain.
    pub fn confidence(&self) -> f64 {
        self.properties
            .get(schema::PROP_CONFIDENCE)
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0)
    }

    /// Placeholder for a call target no file declares.
    pub fn symbol(name: &str) -> Self {
        Self::new(schema::symbol_id(name), NodeKind::Entity, name).with_properties(json!({
            "name": name,
            "entity_type": "symbol",
        }))
    }

    /// Whether the node only stands in for an unresolved reference: a
    /// `symbol:` call target or a file known only from an import.
    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(schema::SYMBOL_PREFIX)
            || self
                .properties
                .get(schema::PROP_PLACEHOLDER)
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}

/// A persisted directed, typed relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node id.
    pub from_id: String,
    /// Target node id.
    pub to_id: String,
    /// Relationship type; part of the uniqueness key.
    pub edge_type: String,
    /// Free-form JSON object of properties.
    pub properties: Value,
}

impl GraphEdge {
    /// Create an edge with an empty property object.
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>, edge_type: &str) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            edge_type: edge_type.to_string(),
            properties: json!({}),
        }
    }

    /// Set the confidence property.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        if let Some(map) = self.properties.as_object_mut() {
            map.insert(schema::PROP_CONFIDENCE.to_string(), json!(confidence));
        }
        self
    }

    /// Uniqueness key `(from, to, type)`.
    pub fn key(&self) -> (String, String, String) {
        (
            self.from_id.clone(),
            self.to_id.clone(),
            self.edge_type.clone(),
        )
    }

    /// Confidence property; edges without one count as certain.
    pub fn confidence(&self) -> f64 {
        self.properties
            .get(schema::PROP_CONFIDENCE)
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0)
    }
}

/// Chunk metadata handed to [`GraphStore::upsert_chunk_nodes`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Stable chunk id.
    pub id: String,
    /// Owning file path.
    pub file_path: String,
    /// Chunk type (e.g. "block").
    pub chunk_type: String,
    /// First line (1-based).
    pub start_line: usize,
    /// Last line (1-based, inclusive).
    pub end_line: usize,
    /// Symbol declared in the chunk, if any.
    pub symbol_name: Option<String>,
    /// Content hash.
    pub content_hash: String,
}

impl ChunkRecord {
    /// Label from the symbol name, else `"<type> L<start>-<end>"`.
    pub fn label(&self) -> String {
        match &self.symbol_name {
            Some(name) => name.clone(),
            None => format!("{} L{}-{}", self.chunk_type, self.start_line, self.end_line),
        }
    }

    fn to_node(&self) -> GraphNode {
        GraphNode::new(&self.id, NodeKind::Chunk, self.label()).with_properties(json!({
            "file_path": self.file_path,
            "chunk_type": self.chunk_type,
            "start_line": self.start_line,
            "end_line": self.end_line,
            "symbol_name": self.symbol_name,
            "content_hash": self.content_hash,
        }))
    }
}

/// Result of a bounded subgraph query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Subgraph {
    /// Collected nodes in discovery order.
    pub nodes: Vec<GraphNode>,
    /// Edges between collected nodes, unique by `(from, to, type)`.
    pub edges: Vec<GraphEdge>,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    /// Total node count.
    pub node_count: usize,
    /// Total edge count.
    pub edge_count: usize,
    /// Node count per kind.
    pub nodes_by_kind: BTreeMap<String, usize>,
    /// Edge count per type.
    pub edges_by_type: BTreeMap<String, usize>,
    /// Ids stored more than once. Must always be empty.
    pub duplicate_ids: Vec<String>,
}

/// Full in-memory copy of the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphSnapshot {
    /// Nodes keyed by id.
    pub nodes: BTreeMap<String, GraphNode>,
    /// Edges ordered by `(from, to, type)`.
    pub edges: Vec<GraphEdge>,
}

/// Durable, idempotent storage of nodes and typed directed edges.
///
/// Backends implement the primitive reads and writes; the traversal and
/// file-level operations are provided on top of them so every backend
/// answers queries the same way. Writes must be serialized by the caller.
pub trait GraphStore: FileIndex + Send {
    /// Backend name for diagnostics.
    fn backend_name(&self) -> &'static str;

    /// Create the schema. Idempotent.
    fn initialize(&mut self) -> Result<()>;

    /// Whether [`GraphStore::initialize`] has run.
    fn is_initialized(&self) -> bool;

    /// Insert or replace nodes by id (last write wins).
    fn upsert_nodes(&mut self, nodes: &[GraphNode]) -> Result<usize>;

    /// Insert edges, refreshing properties of existing `(from, to, type)`
    /// triples instead of duplicating them.
    ///
    /// A missing `package:` endpoint is created on the fly; any other
    /// missing endpoint fails the whole batch with `NodeNotFound` before
    /// anything is written.
    fn upsert_relationships(&mut self, edges: &[GraphEdge]) -> Result<usize>;

    /// Remove edges by `(from, to, type)`. Unknown triples are ignored.
    /// Returns edges removed.
    fn delete_relationships(&mut self, edges: &[GraphEdge]) -> Result<usize>;

    /// Node by id.
    fn get_node(&self, id: &str) -> Result<Option<GraphNode>>;

    /// All nodes of a kind, ordered by id.
    fn nodes_of_kind(&self, kind: NodeKind) -> Result<Vec<GraphNode>>;

    /// Ids of nodes whose stored file path equals `path`, ordered by id.
    fn node_ids_for_file(&self, path: &str, kind: Option<NodeKind>) -> Result<Vec<String>>;

    /// Edges with either endpoint in `ids`, ordered by `(from, to, type)`.
    fn edges_touching(&self, ids: &[String]) -> Result<Vec<GraphEdge>>;

    /// Entity nodes with the given name and entity type, ordered by id.
    fn find_entities(&self, name: &str, entity_type: &str) -> Result<Vec<GraphNode>>;

    /// Delete nodes and every edge referencing them. Returns nodes deleted.
    fn delete_nodes(&mut self, ids: &[String]) -> Result<usize>;

    /// Ids stored more than once.
    fn duplicate_ids(&self) -> Result<Vec<String>>;

    /// Node counts per kind and edge counts per type.
    fn counts(&self) -> Result<(BTreeMap<String, usize>, BTreeMap<String, usize>)>;

    /// Full copy of the graph.
    fn snapshot(&self) -> Result<GraphSnapshot>;

    /// Fail with `NotInitialized` unless the schema exists.
    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(WeaveError::NotInitialized {
                backend: self.backend_name().to_string(),
            })
        }
    }

    /// Upsert the node for a file, keyed by path. Returns the node id.
    fn upsert_file_node(&mut self, path: &str, language: &str, size_bytes: u64) -> Result<String> {
        let id = schema::file_id(path);
        let node = GraphNode::new(&id, NodeKind::File, path).with_properties(json!({
            "file_path": path,
            "language": language,
            "size_bytes": size_bytes,
        }));
        self.upsert_nodes(&[node])?;
        Ok(id)
    }

    /// Batch upsert chunk nodes.
    fn upsert_chunk_nodes(&mut self, chunks: &[ChunkRecord]) -> Result<usize> {
        let nodes: Vec<GraphNode> = chunks.iter().map(ChunkRecord::to_node).collect();
        self.upsert_nodes(&nodes)
    }

    /// Breadth-first expansion from `seeds` (all file nodes when none),
    /// following edges in both directions, up to `depth` hops and at most
    /// `max_nodes` nodes.
    fn get_subgraph(&self, seeds: Option<&[String]>, depth: usize, max_nodes: usize) -> Result<Subgraph> {
        self.ensure_initialized()?;
        if max_nodes == 0 {
            return Err(WeaveError::invalid("max_nodes must be at least 1"));
        }

        let roots: Vec<String> = match seeds {
            Some(seeds) if !seeds.is_empty() => seeds.to_vec(),
            _ => self
                .nodes_of_kind(NodeKind::File)?
                .into_iter()
                .map(|n| n.id)
                .collect(),
        };

        traverse::bounded_bfs(self, &roots, depth, max_nodes, |_| true, |_| true)
    }

    /// Chunks reachable from `ids` over chunk-to-chunk edges within `depth`
    /// hops, excluding the input chunks themselves.
    fn get_related_chunks(&self, ids: &[String], depth: usize) -> Result<Vec<GraphNode>> {
        self.ensure_initialized()?;
        let subgraph = traverse::bounded_bfs(
            self,
            ids,
            depth,
            usize::MAX,
            |node| node.kind == NodeKind::Chunk,
            |edge| schema::CHUNK_EDGE_TYPES.contains(&edge.edge_type.as_str()),
        )?;

        let inputs: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(subgraph
            .nodes
            .into_iter()
            .filter(|n| !inputs.contains(n.id.as_str()))
            .collect())
    }

    /// Delete a file node with every node stored under its path, cascading
    /// to all edges that reference them. Returns nodes deleted.
    fn delete_file_subtree(&mut self, path: &str) -> Result<usize> {
        self.ensure_initialized()?;
        let mut ids = self.node_ids_for_file(path, None)?;
        let file_node = schema::file_id(path);
        if !ids.contains(&file_node) {
            ids.push(file_node);
        }
        let deleted = self.detach_nodes(&ids)?;
        log::debug!("Deleted {} nodes under {}", deleted, path);
        Ok(deleted)
    }

    /// Delete nodes like [`GraphStore::delete_nodes`], keeping the rest of
    /// the graph consistent. Calls into a deleted function move to another
    /// declaration of the same name, else to a `symbol:` placeholder.
    /// Placeholders the deleted nodes were the last to point at are removed. Returns nodes deleted, pruned
    /// placeholders included.
    fn detach_nodes(&mut self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let doomed: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let touching = self.edges_touching(ids)?;

        let released: Vec<String> = touching
            .iter()
            .filter(|e| doomed.contains(e.from_id.as_str()) && !doomed.contains(e.to_id.as_str()))
            .map(|e| e.to_id.clone())
            .collect();

        let mut symbols = BTreeMap::new();
        let mut redirected = Vec::new();
        for edge in &touching {
            if edge.edge_type != schema::EDGE_CALLS
                || doomed.contains(edge.from_id.as_str())
                || !doomed.contains(edge.to_id.as_str())
            {
                continue;
            }
            let Some(callee) = self.get_node(&edge.to_id)? else {
                continue;
            };
            if callee.str_prop(schema::PROP_ENTITY_TYPE) != Some(schema::ENTITY_FUNCTION) {
                continue;
            }
            let Some(name) = callee.str_prop(schema::PROP_NAME) else {
                continue;
            };
            let survivor = self
                .find_entities(name, schema::ENTITY_FUNCTION)?
                .into_iter()
                .find(|n| !doomed.contains(n.id.as_str()));
            let mut edge = edge.clone();
            match survivor {
                Some(node) => edge.to_id = node.id,
                None => {
                    let symbol = GraphNode::symbol(name);
                    edge.to_id = symbol.id.clone();
                    symbols.insert(symbol.id.clone(), symbol);
                }
            }
            redirected.push(edge);
        }

        let mut deleted = self.delete_nodes(ids)?;
        if !redirected.is_empty() {
            let symbols: Vec<GraphNode> = symbols.into_values().collect();
            self.upsert_nodes(&symbols)?;
            self.upsert_relationships(&redirected)?;
        }
        deleted += self.prune_placeholders(&released)?;
        Ok(deleted)
    }

    /// Delete the placeholders among `candidates` that no edge touches any
    /// more. Returns nodes deleted.
    fn prune_placeholders(&mut self, candidates: &[String]) -> Result<usize> {
        let mut orphans = Vec::new();
        let unique: BTreeSet<&String> = candidates.iter().collect();
        for id in unique {
            let Some(node) = self.get_node(id)? else {
                continue;
            };
            if node.is_placeholder() && self.edges_touching(std::slice::from_ref(id))?.is_empty() {
                orphans.push(node.id);
            }
        }
        if orphans.is_empty() {
            return Ok(0);
        }
        log::debug!("Pruning {} orphaned placeholders", orphans.len());
        self.delete_nodes(&orphans)
    }

    /// Node and edge counts plus the duplicate-id audit.
    fn get_stats(&self) -> Result<GraphStats> {
        self.ensure_initialized()?;
        let (nodes_by_kind, edges_by_type) = self.counts()?;
        Ok(GraphStats {
            node_count: nodes_by_kind.values().sum(),
            edge_count: edges_by_type.values().sum(),
            nodes_by_kind,
            edges_by_type,
            duplicate_ids: self.duplicate_ids()?,
        })
    }

    /// Fail with `DuplicateIdIntegrityViolation` if the audit finds anything.
    fn verify_integrity(&self) -> Result<()> {
        let ids = self.duplicate_ids()?;
        if ids.is_empty() {
            Ok(())
        } else {
            Err(WeaveError::DuplicateIdIntegrityViolation { ids })
        }
    }
}

/// Package nodes to create so that `edges` can be written.
///
/// Fails with `NodeNotFound` for any other missing endpoint.
pub(crate) fn missing_package_nodes(
    edges: &[GraphEdge],
    exists: impl Fn(&str) -> Result<bool>,
) -> Result<Vec<GraphNode>> {
    let mut packages = BTreeSet::new();
    for edge in edges {
        for endpoint in [&edge.from_id, &edge.to_id] {
            if packages.contains(endpoint.as_str()) || exists(endpoint)? {
                continue;
            }
            if endpoint.starts_with(schema::PACKAGE_PREFIX) {
                packages.insert(endpoint.as_str());
            } else {
                return Err(WeaveError::NodeNotFound(endpoint.clone()));
            }
        }
    }

    Ok(packages
        .into_iter()
        .map(|id| {
            let name = &id[schema::PACKAGE_PREFIX.len()..];
            GraphNode::new(id, NodeKind::Package, name).with_properties(json!({
                "name": name,
                "materialized": "lazy",
            }))
        })
        .collect())
}

/// Open and initialize the backend selected by `config`.
///
/// Relative SQLite paths resolve against `root`.
pub fn open_store(config: &StoreConfig, root: &Path) -> Result<Box<dyn GraphStore>> {
    let mut store: Box<dyn GraphStore> = match config.backend {
        StoreBackend::Memory => Box::new(MemoryGraphStore::new()),
        StoreBackend::Sqlite => {
            let path = if config.path.is_absolute() {
                config.path.clone()
            } else {
                root.join(&config.path)
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| WeaveError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            Box::new(SqliteGraphStore::open(&path)?)
        }
    };
    store.initialize()?;
    Ok(store)
}
