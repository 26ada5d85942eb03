//! Graph writes for one processed file.
//!
//! Runs on the calling thread with the store lock held. Every write is an
//! upsert keyed by a stable id, so replaying a file converges on the same
//! graph.

use super::discover::SourceFile;
use crate::change::ChangeResult;
use crate::chunk::Chunk;
use crate::entity::EntityType;
use crate::error::Result;
use crate::filter::{Category, EnrichedEntity, PipelineResult, RelationKind};
use crate::graph::{schema, ChunkRecord, GraphEdge, GraphNode, GraphStore, NodeKind};
use crate::manifest::PackageInfo;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Extensions tried when resolving an extensionless internal import.
const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "rs"];

/// Files that stand for their directory.
const INDEX_FILES: &[&str] = &[
    "index.ts",
    "index.tsx",
    "index.js",
    "index.jsx",
    "__init__.py",
    "mod.rs",
    "lib.rs",
];

/// Output of the parallel phase for a changed file.
#[derive(Debug)]
pub(super) struct FileUpdate {
    pub file: SourceFile,
    pub change: ChangeResult,
    pub pipeline: PipelineResult,
}

/// What one file write produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct WriteCounts {
    pub entities: usize,
    pub edges: usize,
}

/// Node id for an enriched entity of `path`.
pub(crate) fn entity_node_id(path: &str, entity: &EnrichedEntity) -> String {
    let raw = entity.raw();
    schema::entity_id(path, raw.entity_type.as_str(), &raw.name, raw.source.as_deref())
}

fn chunk_for(chunks: &[Chunk], line: usize) -> Option<&Chunk> {
    chunks.iter().find(|c| c.contains_line(line))
}

fn entity_node(path: &str, id: &str, entity: &EnrichedEntity, chunk: Option<&Chunk>) -> GraphNode {
    let raw = entity.raw();
    GraphNode::new(id, NodeKind::Entity, &raw.name).with_properties(json!({
        "file_path": path,
        "name": raw.name,
        "entity_type": raw.entity_type.as_str(),
        "confidence": entity.confidence,
        "chunk_id": chunk.map(|c| c.id.as_str()),
        "category": entity.category(),
        "normalized_name": entity.entity.normalized_name,
        "source": raw.source,
        "specifiers": raw.specifiers,
        "line": raw.line,
        "occurrences": entity.entity.entity.occurrences,
        "private": raw.is_private,
        "documentation": entity.documentation,
        "package": entity.entity.package_info,
    }))
}

/// Writes one file's chunks, entities and edges into a store.
pub(super) struct GraphWriter<'a> {
    store: &'a mut dyn GraphStore,
    repo_id: &'a str,
    known_files: &'a HashSet<String>,
}

impl<'a> GraphWriter<'a> {
    pub(super) fn new(store: &'a mut dyn GraphStore, repo_id: &'a str, known_files: &'a HashSet<String>) -> Self {
        Self {
            store,
            repo_id,
            known_files,
        }
    }

    /// Replace everything `update.file` owns in the graph.
    pub(super) fn write(&mut self, update: &FileUpdate) -> Result<WriteCounts> {
        let path = update.file.file_id.as_str();
        let chunks = &update.change.chunks;

        let workspace = schema::workspace_id(self.repo_id);
        self.store.upsert_nodes(&[
            GraphNode::new(&workspace, NodeKind::Workspace, self.repo_id).with_properties(json!({
                "repo_id": self.repo_id,
            })),
        ])?;
        let file_node = self
            .store
            .upsert_file_node(path, update.file.language.as_str(), update.file.size_bytes)?;

        let entities: Vec<(String, &EnrichedEntity)> = update
            .pipeline
            .enriched
            .iter()
            .map(|e| (entity_node_id(path, e), e))
            .collect();

        let mut owned: BTreeSet<String> = chunks.iter().map(|c| c.id.clone()).collect();
        owned.extend(entities.iter().map(|(id, _)| id.clone()));
        let released = self.remove_stale(path, &file_node, &owned)?;

        let mut edges = BTreeMap::new();
        let mut add = |edge: GraphEdge| {
            edges.insert(edge.key(), edge);
        };
        add(GraphEdge::new(&workspace, &file_node, schema::EDGE_CONTAINS));

        let mut records: Vec<ChunkRecord> = Vec::new();
        for chunk in chunks {
            let record = chunk.to_record(path);
            if update.change.added_chunks.contains(&chunk.id) || self.chunk_moved(&record)? {
                records.push(record);
            }
        }
        if !records.is_empty() {
            self.store.upsert_chunk_nodes(&records)?;
        }
        for chunk in chunks {
            add(GraphEdge::new(&file_node, &chunk.id, schema::EDGE_CONTAINS));
        }
        for pair in chunks.windows(2) {
            add(GraphEdge::new(&pair[0].id, &pair[1].id, schema::EDGE_PRECEDES));
        }

        let nodes: Vec<GraphNode> = entities
            .iter()
            .map(|(id, entity)| {
                let chunk = chunk_for(chunks, entity.raw().line);
                let owner = chunk.map(|c| c.id.as_str()).unwrap_or(&file_node);
                add(GraphEdge::new(owner, id, schema::EDGE_DEFINES));
                entity_node(path, id, entity, chunk)
            })
            .collect();
        self.store.upsert_nodes(&nodes)?;

        for (id, entity) in &entities {
            if entity.raw().entity_type == EntityType::Function {
                for edge in self.adopt_symbol_calls(&entity.raw().name, id)? {
                    add(edge);
                }
            }
        }

        for (id, entity) in &entities {
            for relationship in &entity.relationships {
                let target = match relationship.kind {
                    RelationKind::Imports => self.import_target(entity)?,
                    RelationKind::Exports => {
                        add(GraphEdge::new(&file_node, id, schema::EDGE_EXPORTS)
                            .with_confidence(relationship.confidence));
                        continue;
                    }
                    RelationKind::Calls => Some(self.call_target(path, &relationship.target)?),
                    RelationKind::References => self.reference_target(&relationship.target)?,
                };
                let Some(target) = target else {
                    continue;
                };
                if relationship.kind == RelationKind::References {
                    if let Some(edge) = self.chunk_reference(chunks, entity, &target, relationship.confidence)? {
                        add(edge);
                    }
                }
                add(GraphEdge::new(id, target, relationship.kind.as_str()).with_confidence(relationship.confidence));
            }
        }

        let edges: Vec<GraphEdge> = edges.into_values().collect();
        self.store.upsert_relationships(&edges)?;
        self.store.prune_placeholders(&released)?;
        Ok(WriteCounts {
            entities: nodes.len(),
            edges: edges.len(),
        })
    }

    /// Drop chunk and entity nodes of `path` no longer produced, and every
    /// outgoing edge of what the file still owns so it can be rewritten.
    /// Returns the targets of the removed edges.
    fn remove_stale(&mut self, path: &str, file_node: &str, owned: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut stale = Vec::new();
        for kind in [NodeKind::Chunk, NodeKind::Entity] {
            stale.extend(
                self.store
                    .node_ids_for_file(path, Some(kind))?
                    .into_iter()
                    .filter(|id| !owned.contains(id)),
            );
        }
        if !stale.is_empty() {
            log::debug!("{}: removing {} stale nodes", path, stale.len());
            self.store.detach_nodes(&stale)?;
        }

        let mut sources: Vec<String> = owned.iter().cloned().collect();
        sources.push(file_node.to_string());
        let source_set: HashSet<&str> = sources.iter().map(String::as_str).collect();
        let outgoing: Vec<GraphEdge> = self
            .store
            .edges_touching(&sources)?
            .into_iter()
            .filter(|e| source_set.contains(e.from_id.as_str()))
            .collect();
        self.store.delete_relationships(&outgoing)?;
        Ok(outgoing.into_iter().map(|e| e.to_id).collect())
    }

    /// Whether the stored node for `record` is missing or sits at another
    /// place in the file.
    fn chunk_moved(&self, record: &ChunkRecord) -> Result<bool> {
        let Some(node) = self.store.get_node(&record.id)? else {
            return Ok(true);
        };
        let line = |key: &str| node.properties.get(key).and_then(|v| v.as_u64());
        Ok(line("start_line") != Some(record.start_line as u64)
            || line("end_line") != Some(record.end_line as u64)
            || node.str_prop("symbol_name") != record.symbol_name.as_deref())
    }

    /// Point calls that waited on a `symbol:` placeholder at the function
    /// `id` now declaring `name`, and drop the placeholder.
    fn adopt_symbol_calls(&mut self, name: &str, id: &str) -> Result<Vec<GraphEdge>> {
        let symbol = schema::symbol_id(name);
        if self.store.get_node(&symbol)?.is_none() {
            return Ok(Vec::new());
        }
        let adopted: Vec<GraphEdge> = self
            .store
            .edges_touching(std::slice::from_ref(&symbol))?
            .into_iter()
            .filter(|e| e.edge_type == schema::EDGE_CALLS && e.to_id == symbol)
            .map(|mut e| {
                e.to_id = id.to_string();
                e
            })
            .collect();
        log::debug!("{} adopts {} calls from {}", id, adopted.len(), symbol);
        self.store.delete_nodes(&[symbol])?;
        Ok(adopted)
    }

    fn import_target(&mut self, entity: &EnrichedEntity) -> Result<Option<String>> {
        let name = entity.entity.normalized_name.as_str();
        if name.is_empty() {
            return Ok(None);
        }
        let target = match entity.category() {
            Category::External => {
                let info = entity
                    .entity
                    .package_info
                    .clone()
                    .unwrap_or_else(|| PackageInfo::named(name));
                let id = schema::package_id(&info.name);
                self.store.upsert_nodes(&[
                    GraphNode::new(&id, NodeKind::Package, &info.name).with_properties(json!({
                        "name": info.name,
                        "category": Category::External,
                        "version": info.version,
                        "manager": info.manager,
                        "is_dev_dependency": info.is_dev_dependency,
                    })),
                ])?;
                id
            }
            // Builtin package nodes are materialized by the edge write.
            Category::Builtin => schema::package_id(name),
            Category::Internal => {
                let path = self.resolve_internal_file(name);
                let id = schema::file_id(&path);
                if self.store.get_node(&id)?.is_none() {
                    self.store.upsert_nodes(&[
                        GraphNode::new(&id, NodeKind::File, &path).with_properties(json!({
                            "file_path": path,
                            "placeholder": true,
                        })),
                    ])?;
                }
                id
            }
        };
        Ok(Some(target))
    }

    /// Known file an extensionless module path refers to, else the path
    /// itself.
    fn resolve_internal_file(&self, target: &str) -> String {
        let mut bases = vec![target.to_string()];
        if let Some((stem, ext)) = target.rsplit_once('.') {
            if SOURCE_EXTENSIONS.contains(&ext) && !stem.is_empty() {
                bases.push(stem.to_string());
            }
        }
        // `crate::a::Item` and `from pkg.mod import name` name an item
        // inside a module.
        if let Some((parent, _)) = target.rsplit_once('/') {
            bases.push(parent.to_string());
        }

        for base in &bases {
            let found = std::iter::once(base.clone())
                .chain(SOURCE_EXTENSIONS.iter().map(|ext| format!("{}.{}", base, ext)))
                .chain(INDEX_FILES.iter().map(|index| format!("{}/{}", base, index)))
                .find(|candidate| self.known_files.contains(candidate));
            if let Some(found) = found {
                return found;
            }
        }
        target.to_string()
    }

    /// Declared function named `name`, preferring one in `path`, else a
    /// `symbol:` placeholder.
    fn call_target(&mut self, path: &str, name: &str) -> Result<String> {
        let candidates = self.store.find_entities(name, EntityType::Function.as_str())?;
        let found = candidates
            .iter()
            .find(|n| n.file_path() == Some(path))
            .or_else(|| candidates.first());
        if let Some(node) = found {
            return Ok(node.id.clone());
        }

        let symbol = GraphNode::symbol(name);
        let id = symbol.id.clone();
        if self.store.get_node(&id)?.is_none() {
            self.store.upsert_nodes(&[symbol])?;
        }
        Ok(id)
    }

    /// Discovered nodes may have been removed by an earlier write.
    fn reference_target(&self, id: &str) -> Result<Option<String>> {
        Ok(self.store.get_node(id)?.map(|node| node.id))
    }

    fn chunk_reference(
        &self,
        chunks: &[Chunk],
        entity: &EnrichedEntity,
        target: &str,
        confidence: f64,
    ) -> Result<Option<GraphEdge>> {
        let Some(from) = chunk_for(chunks, entity.raw().line) else {
            return Ok(None);
        };
        let to = self
            .store
            .get_node(target)?
            .and_then(|node| node.str_prop(schema::PROP_CHUNK_ID).map(String::from));
        Ok(to
            .filter(|to| *to != from.id)
            .map(|to| GraphEdge::new(&from.id, to, schema::EDGE_CHUNK_REFERENCES).with_confidence(confidence)))
    }
}
