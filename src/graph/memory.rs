//! In-memory graph backend.
//!
//! Holds nodes, edges and file index entries in ordered maps. Used for
//! tests and throwaway scans; nothing survives the process.

use super::file_index::{FileIndex, FileIndexEntry, HashStatus};
use super::{missing_package_nodes, schema, GraphEdge, GraphNode, GraphSnapshot, GraphStore, NodeKind};
use crate::error::{Result, WeaveError};
use std::collections::{BTreeMap, HashSet};

type EdgeKey = (String, String, String);

/// HashMap-style graph store with the same semantics as the SQLite backend.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    nodes: BTreeMap<String, GraphNode>,
    edges: BTreeMap<EdgeKey, GraphEdge>,
    file_index: BTreeMap<(String, String), FileIndexEntry>,
    initialized: bool,
}

impl MemoryGraphStore {
    /// Create an uninitialized store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStore for MemoryGraphStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn upsert_nodes(&mut self, nodes: &[GraphNode]) -> Result<usize> {
        self.ensure_initialized()?;
        for node in nodes {
            self.nodes.insert(node.id.clone(), node.clone());
        }
        Ok(nodes.len())
    }

    fn upsert_relationships(&mut self, edges: &[GraphEdge]) -> Result<usize> {
        self.ensure_initialized()?;
        let packages = missing_package_nodes(edges, |id| Ok(self.nodes.contains_key(id)))?;
        for package in packages {
            self.nodes.insert(package.id.clone(), package);
        }
        for edge in edges {
            self.edges.insert(edge.key(), edge.clone());
        }
        Ok(edges.len())
    }

    fn delete_relationships(&mut self, edges: &[GraphEdge]) -> Result<usize> {
        self.ensure_initialized()?;
        Ok(edges
            .iter()
            .filter(|edge| self.edges.remove(&edge.key()).is_some())
            .count())
    }

    fn get_node(&self, id: &str) -> Result<Option<GraphNode>> {
        self.ensure_initialized()?;
        Ok(self.nodes.get(id).cloned())
    }

    fn nodes_of_kind(&self, kind: NodeKind) -> Result<Vec<GraphNode>> {
        self.ensure_initialized()?;
        Ok(self
            .nodes
            .values()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect())
    }

    fn node_ids_for_file(&self, path: &str, kind: Option<NodeKind>) -> Result<Vec<String>> {
        self.ensure_initialized()?;
        Ok(self
            .nodes
            .values()
            .filter(|n| n.file_path() == Some(path))
            .filter(|n| kind.map_or(true, |k| n.kind == k))
            .map(|n| n.id.clone())
            .collect())
    }

    fn edges_touching(&self, ids: &[String]) -> Result<Vec<GraphEdge>> {
        self.ensure_initialized()?;
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(self
            .edges
            .values()
            .filter(|e| wanted.contains(e.from_id.as_str()) || wanted.contains(e.to_id.as_str()))
            .cloned()
            .collect())
    }

    fn find_entities(&self, name: &str, entity_type: &str) -> Result<Vec<GraphNode>> {
        self.ensure_initialized()?;
        Ok(self
            .nodes
            .values()
            .filter(|n| n.kind == NodeKind::Entity)
            .filter(|n| n.str_prop(schema::PROP_NAME) == Some(name))
            .filter(|n| n.str_prop(schema::PROP_ENTITY_TYPE) == Some(entity_type))
            .cloned()
            .collect())
    }

    fn delete_nodes(&mut self, ids: &[String]) -> Result<usize> {
        self.ensure_initialized()?;
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.edges
            .retain(|_, e| !doomed.contains(e.from_id.as_str()) && !doomed.contains(e.to_id.as_str()));
        let before = self.nodes.len();
        self.nodes.retain(|id, _| !doomed.contains(id.as_str()));
        Ok(before - self.nodes.len())
    }

    fn duplicate_ids(&self) -> Result<Vec<String>> {
        self.ensure_initialized()?;
        // Keys of an ordered map are unique.
        Ok(Vec::new())
    }

    fn counts(&self) -> Result<(BTreeMap<String, usize>, BTreeMap<String, usize>)> {
        self.ensure_initialized()?;
        let mut nodes = BTreeMap::new();
        for node in self.nodes.values() {
            *nodes.entry(node.kind.as_str().to_string()).or_insert(0) += 1;
        }
        let mut edges = BTreeMap::new();
        for edge in self.edges.values() {
            *edges.entry(edge.edge_type.clone()).or_insert(0) += 1;
        }
        Ok((nodes, edges))
    }

    fn snapshot(&self) -> Result<GraphSnapshot> {
        self.ensure_initialized()?;
        Ok(GraphSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.values().cloned().collect(),
        })
    }
}

impl FileIndex for MemoryGraphStore {
    fn list_entries(&self, repo_id: &str) -> Result<Vec<FileIndexEntry>> {
        self.ensure_initialized()?;
        Ok(self
            .file_index
            .values()
            .filter(|e| e.repo_id == repo_id)
            .cloned()
            .collect())
    }

    fn get_entry(&self, repo_id: &str, file_id: &str) -> Result<Option<FileIndexEntry>> {
        self.ensure_initialized()?;
        Ok(self
            .file_index
            .get(&(repo_id.to_string(), file_id.to_string()))
            .cloned())
    }

    fn upsert_entry(&mut self, entry: &FileIndexEntry) -> Result<()> {
        self.ensure_initialized()?;
        self.file_index.insert(
            (entry.repo_id.clone(), entry.file_id.clone()),
            entry.clone(),
        );
        Ok(())
    }

    fn mark_deleted(&mut self, repo_id: &str, file_id: &str) -> Result<()> {
        self.ensure_initialized()?;
        let entry = self
            .file_index
            .get_mut(&(repo_id.to_string(), file_id.to_string()))
            .ok_or_else(|| WeaveError::FileNotFound(file_id.to_string()))?;
        entry.hash_status = HashStatus::Deleted;
        entry.pending_graph = false;
        entry.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryGraphStore {
        let mut store = MemoryGraphStore::new();
        store.initialize().unwrap();
        store
    }

    #[test]
    fn test_uninitialized_store_rejects_calls() {
        let store = MemoryGraphStore::new();
        match store.get_node("file:a.ts") {
            Err(WeaveError::NotInitialized { backend }) => assert_eq!(backend, "memory"),
            other => panic!("Expected NotInitialized, got {:?}", other),
        }
    }

    #[test]
    fn test_upsert_replaces_label_and_properties() {
        let mut store = store();
        let first = GraphNode::new("file:a.ts", NodeKind::File, "a.ts")
            .with_properties(json!({"file_path": "a.ts", "size_bytes": 1}));
        let second = GraphNode::new("file:a.ts", NodeKind::File, "renamed")
            .with_properties(json!({"file_path": "a.ts", "size_bytes": 2}));

        store.upsert_nodes(&[first]).unwrap();
        store.upsert_nodes(&[second.clone()]).unwrap();

        assert_eq!(store.get_node("file:a.ts").unwrap(), Some(second));
        assert_eq!(store.get_stats().unwrap().node_count, 1);
    }

    #[test]
    fn test_mark_deleted_unknown_entry_fails() {
        let mut store = store();
        assert!(matches!(
            store.mark_deleted("repo", "missing.ts"),
            Err(WeaveError::FileNotFound(_))
        ));
    }
}
