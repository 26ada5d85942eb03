//! SQLite graph backend.
//!
//! Nodes, edges and the file index live in one database. Edges carry a
//! surrogate integer id with a UNIQUE constraint on `(from_id, to_id,
//! edge_type)`; node writes use `ON CONFLICT(id) DO UPDATE` so re-upserting
//! never duplicates a row.

use super::file_index::{now_rfc3339, FileIndex, FileIndexEntry, HashStatus};
use super::{missing_package_nodes, schema, GraphEdge, GraphNode, GraphSnapshot, GraphStore, NodeKind};
use crate::error::{Result, WeaveError};
use rusqlite::{params, params_from_iter, CachedStatement, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

const SCHEMA_SQL: &str = "\
CREATE TABLE IF NOT EXISTS nodes (
  id TEXT NOT NULL PRIMARY KEY,
  kind TEXT NOT NULL,
  label TEXT NOT NULL,
  file_path TEXT,
  entity_name TEXT,
  entity_type TEXT,
  properties TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);
CREATE INDEX IF NOT EXISTS idx_nodes_file_path ON nodes(file_path);
CREATE INDEX IF NOT EXISTS idx_nodes_entity ON nodes(entity_name, entity_type);
CREATE TABLE IF NOT EXISTS edges (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  from_id TEXT NOT NULL,
  to_id TEXT NOT NULL,
  edge_type TEXT NOT NULL,
  properties TEXT NOT NULL DEFAULT '{}',
  UNIQUE(from_id, to_id, edge_type)
);
CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_id);
CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_id);
CREATE TABLE IF NOT EXISTS file_index (
  repo_id TEXT NOT NULL,
  file_id TEXT NOT NULL,
  content_hash TEXT NOT NULL,
  hash_status TEXT NOT NULL,
  pending_graph INTEGER NOT NULL DEFAULT 0,
  chunk_hashes TEXT NOT NULL DEFAULT '[]',
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  PRIMARY KEY (repo_id, file_id)
);";

const UPSERT_NODE_SQL: &str = "\
INSERT INTO nodes (id, kind, label, file_path, entity_name, entity_type, properties)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(id) DO UPDATE SET
  kind = excluded.kind,
  label = excluded.label,
  file_path = excluded.file_path,
  entity_name = excluded.entity_name,
  entity_type = excluded.entity_type,
  properties = excluded.properties";

const UPSERT_EDGE_SQL: &str = "\
INSERT INTO edges (from_id, to_id, edge_type, properties)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(from_id, to_id, edge_type) DO UPDATE SET
  properties = excluded.properties";

const UPSERT_ENTRY_SQL: &str = "\
INSERT INTO file_index (repo_id, file_id, content_hash, hash_status, pending_graph, chunk_hashes, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT(repo_id, file_id) DO UPDATE SET
  content_hash = excluded.content_hash,
  hash_status = excluded.hash_status,
  pending_graph = excluded.pending_graph,
  chunk_hashes = excluded.chunk_hashes,
  updated_at = excluded.updated_at";

const NODE_COLUMNS: &str = "id, kind, label, properties";
const EDGE_COLUMNS: &str = "from_id, to_id, edge_type, properties";
const ENTRY_COLUMNS: &str =
    "repo_id, file_id, content_hash, hash_status, pending_graph, chunk_hashes, created_at, updated_at";

/// Ids per `IN (...)` list; edge queries bind the list twice.
const ID_BATCH: usize = 400;

/// Graph store on a single SQLite connection.
pub struct SqliteGraphStore {
    conn: Connection,
    initialized: bool,
}

impl std::fmt::Debug for SqliteGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteGraphStore")
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl SqliteGraphStore {
    /// Open or create a database file. Call [`GraphStore::initialize`]
    /// before use.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            initialized: false,
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            initialized: false,
        })
    }

    fn select_nodes(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<GraphNode>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, row_to_raw_node)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(raw_node_into(row?)?);
        }
        Ok(nodes)
    }
}

type RawNode = (String, String, String, String);

fn row_to_raw_node(row: &Row<'_>) -> rusqlite::Result<RawNode> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn raw_node_into((id, kind, label, properties): RawNode) -> Result<GraphNode> {
    let kind = NodeKind::parse(&kind)
        .ok_or_else(|| WeaveError::Other(format!("Unknown node kind '{}' for {}", kind, id)))?;
    Ok(GraphNode {
        id,
        kind,
        label,
        properties: serde_json::from_str(&properties)?,
    })
}

fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn edge_from_raw((from_id, to_id, edge_type, properties): (String, String, String, String)) -> Result<GraphEdge> {
    Ok(GraphEdge {
        from_id,
        to_id,
        edge_type,
        properties: serde_json::from_str(&properties)?,
    })
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<(FileIndexEntry, String, String)> {
    let status: String = row.get(3)?;
    let chunk_hashes: String = row.get(5)?;
    let pending: i64 = row.get(4)?;
    Ok((
        FileIndexEntry {
            repo_id: row.get(0)?,
            file_id: row.get(1)?,
            content_hash: row.get(2)?,
            hash_status: HashStatus::Pending,
            pending_graph: pending != 0,
            chunk_hashes: Vec::new(),
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        },
        status,
        chunk_hashes,
    ))
}

fn entry_from_raw((mut entry, status, chunk_hashes): (FileIndexEntry, String, String)) -> Result<FileIndexEntry> {
    entry.hash_status = HashStatus::parse(&status).ok_or_else(|| {
        WeaveError::Other(format!("Unknown hash status '{}' for {}", status, entry.file_id))
    })?;
    entry.chunk_hashes = serde_json::from_str(&chunk_hashes)?;
    Ok(entry)
}

fn execute_node_upsert(stmt: &mut CachedStatement<'_>, node: &GraphNode) -> Result<()> {
    let (entity_name, entity_type) = if node.kind == NodeKind::Entity {
        (
            node.str_prop(schema::PROP_NAME),
            node.str_prop(schema::PROP_ENTITY_TYPE),
        )
    } else {
        (None, None)
    };
    stmt.execute(params![
        node.id,
        node.kind.as_str(),
        node.label,
        node.file_path(),
        entity_name,
        entity_type,
        serde_json::to_string(&node.properties)?,
    ])?;
    Ok(())
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl GraphStore for SqliteGraphStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn initialize(&mut self) -> Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn upsert_nodes(&mut self, nodes: &[GraphNode]) -> Result<usize> {
        self.ensure_initialized()?;
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_NODE_SQL)?;
            for node in nodes {
                execute_node_upsert(&mut stmt, node)?;
            }
        }
        tx.commit()?;
        Ok(nodes.len())
    }

    fn upsert_relationships(&mut self, edges: &[GraphEdge]) -> Result<usize> {
        self.ensure_initialized()?;
        let packages = missing_package_nodes(edges, |id| {
            let found = self
                .conn
                .prepare_cached("SELECT 1 FROM nodes WHERE id = ?1")?
                .query_row(params![id], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })?;

        // Lazy package nodes commit together with the edges that need them.
        let tx = self.conn.transaction()?;
        {
            if !packages.is_empty() {
                log::debug!("Materializing {} package nodes", packages.len());
                let mut stmt = tx.prepare_cached(UPSERT_NODE_SQL)?;
                for node in &packages {
                    execute_node_upsert(&mut stmt, node)?;
                }
            }
            let mut stmt = tx.prepare_cached(UPSERT_EDGE_SQL)?;
            for edge in edges {
                stmt.execute(params![
                    edge.from_id,
                    edge.to_id,
                    edge.edge_type,
                    serde_json::to_string(&edge.properties)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(edges.len())
    }

    fn delete_relationships(&mut self, edges: &[GraphEdge]) -> Result<usize> {
        self.ensure_initialized()?;
        let tx = self.conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt =
                tx.prepare_cached("DELETE FROM edges WHERE from_id = ?1 AND to_id = ?2 AND edge_type = ?3")?;
            for edge in edges {
                deleted += stmt.execute(params![edge.from_id, edge.to_id, edge.edge_type])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn get_node(&self, id: &str) -> Result<Option<GraphNode>> {
        self.ensure_initialized()?;
        let sql = format!("SELECT {} FROM nodes WHERE id = ?1", NODE_COLUMNS);
        let raw = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![id], row_to_raw_node)
            .optional()?;
        raw.map(raw_node_into).transpose()
    }

    fn nodes_of_kind(&self, kind: NodeKind) -> Result<Vec<GraphNode>> {
        self.ensure_initialized()?;
        let sql = format!("SELECT {} FROM nodes WHERE kind = ?1 ORDER BY id", NODE_COLUMNS);
        self.select_nodes(&sql, params![kind.as_str()])
    }

    fn node_ids_for_file(&self, path: &str, kind: Option<NodeKind>) -> Result<Vec<String>> {
        self.ensure_initialized()?;
        let mut stmt = self.conn.prepare_cached(
            "SELECT id FROM nodes WHERE file_path = ?1 AND (?2 IS NULL OR kind = ?2) ORDER BY id",
        )?;
        let rows = stmt.query_map(params![path, kind.map(|k| k.as_str())], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    fn edges_touching(&self, ids: &[String]) -> Result<Vec<GraphEdge>> {
        self.ensure_initialized()?;
        let mut found = BTreeMap::new();
        for batch in ids.chunks(ID_BATCH) {
            let marks = placeholders(batch.len());
            let sql = format!(
                "SELECT {} FROM edges WHERE from_id IN ({}) OR to_id IN ({})",
                EDGE_COLUMNS, marks, marks
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(batch.iter().chain(batch.iter())), row_to_edge)?;
            for row in rows {
                let edge = edge_from_raw(row?)?;
                found.insert(edge.key(), edge);
            }
        }
        Ok(found.into_values().collect())
    }

    fn find_entities(&self, name: &str, entity_type: &str) -> Result<Vec<GraphNode>> {
        self.ensure_initialized()?;
        let sql = format!(
            "SELECT {} FROM nodes WHERE kind = 'entity' AND entity_name = ?1 AND entity_type = ?2 ORDER BY id",
            NODE_COLUMNS
        );
        self.select_nodes(&sql, params![name, entity_type])
    }

    fn delete_nodes(&mut self, ids: &[String]) -> Result<usize> {
        self.ensure_initialized()?;
        let tx = self.conn.transaction()?;
        let mut deleted = 0;
        for batch in ids.chunks(ID_BATCH) {
            let marks = placeholders(batch.len());
            tx.execute(
                &format!(
                    "DELETE FROM edges WHERE from_id IN ({}) OR to_id IN ({})",
                    marks, marks
                ),
                params_from_iter(batch.iter().chain(batch.iter())),
            )?;
            deleted += tx.execute(
                &format!("DELETE FROM nodes WHERE id IN ({})", marks),
                params_from_iter(batch.iter()),
            )?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn duplicate_ids(&self) -> Result<Vec<String>> {
        self.ensure_initialized()?;
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM nodes GROUP BY id HAVING COUNT(*) > 1 ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    fn counts(&self) -> Result<(BTreeMap<String, usize>, BTreeMap<String, usize>)> {
        self.ensure_initialized()?;
        let mut nodes = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare_cached("SELECT kind, COUNT(*) FROM nodes GROUP BY kind")?;
        for row in stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))? {
            let (kind, count) = row?;
            nodes.insert(kind, count as usize);
        }

        let mut edges = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare_cached("SELECT edge_type, COUNT(*) FROM edges GROUP BY edge_type")?;
        for row in stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))? {
            let (edge_type, count) = row?;
            edges.insert(edge_type, count as usize);
        }
        Ok((nodes, edges))
    }

    fn snapshot(&self) -> Result<GraphSnapshot> {
        self.ensure_initialized()?;
        let sql = format!("SELECT {} FROM nodes ORDER BY id", NODE_COLUMNS);
        let nodes = self
            .select_nodes(&sql, [])?
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();

        let sql = format!(
            "SELECT {} FROM edges ORDER BY from_id, to_id, edge_type",
            EDGE_COLUMNS
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut edges = Vec::new();
        for row in stmt.query_map([], row_to_edge)? {
            edges.push(edge_from_raw(row?)?);
        }
        Ok(GraphSnapshot { nodes, edges })
    }
}

impl FileIndex for SqliteGraphStore {
    fn list_entries(&self, repo_id: &str) -> Result<Vec<FileIndexEntry>> {
        self.ensure_initialized()?;
        let sql = format!(
            "SELECT {} FROM file_index WHERE repo_id = ?1 ORDER BY file_id",
            ENTRY_COLUMNS
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut entries = Vec::new();
        for row in stmt.query_map(params![repo_id], row_to_entry)? {
            entries.push(entry_from_raw(row?)?);
        }
        Ok(entries)
    }

    fn get_entry(&self, repo_id: &str, file_id: &str) -> Result<Option<FileIndexEntry>> {
        self.ensure_initialized()?;
        let sql = format!(
            "SELECT {} FROM file_index WHERE repo_id = ?1 AND file_id = ?2",
            ENTRY_COLUMNS
        );
        let raw = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![repo_id, file_id], row_to_entry)
            .optional()?;
        raw.map(entry_from_raw).transpose()
    }

    fn upsert_entry(&mut self, entry: &FileIndexEntry) -> Result<()> {
        self.ensure_initialized()?;
        self.conn.prepare_cached(UPSERT_ENTRY_SQL)?.execute(params![
            entry.repo_id,
            entry.file_id,
            entry.content_hash,
            entry.hash_status.as_str(),
            entry.pending_graph as i64,
            serde_json::to_string(&entry.chunk_hashes)?,
            entry.created_at,
            entry.updated_at,
        ])?;
        Ok(())
    }

    fn mark_deleted(&mut self, repo_id: &str, file_id: &str) -> Result<()> {
        self.ensure_initialized()?;
        let changed = self.conn.execute(
            "UPDATE file_index SET hash_status = ?3, pending_graph = 0, updated_at = ?4 \
             WHERE repo_id = ?1 AND file_id = ?2",
            params![repo_id, file_id, HashStatus::Deleted.as_str(), now_rfc3339()],
        )?;
        if changed == 0 {
            return Err(WeaveError::FileNotFound(file_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_open_requires_initialize() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        assert!(matches!(
            store.nodes_of_kind(NodeKind::File),
            Err(WeaveError::NotInitialized { .. })
        ));
    }

    #[test]
    fn test_data_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("graph.db");

        {
            let mut store = SqliteGraphStore::open(&db_path).unwrap();
            store.initialize().unwrap();
            store.upsert_file_node("src/a.ts", "typescript", 42).unwrap();
            let mut entry = FileIndexEntry::new("repo", "src/a.ts", "abc");
            entry.chunk_hashes = vec!["h1".to_string(), "h2".to_string()];
            store.upsert_entry(&entry).unwrap();
        }

        let mut store = SqliteGraphStore::open(&db_path).unwrap();
        store.initialize().unwrap();
        let node = store.get_node("file:src/a.ts").unwrap().unwrap();
        assert_eq!(node.kind, NodeKind::File);
        assert_eq!(node.properties["size_bytes"], json!(42));

        let entry = store.get_entry("repo", "src/a.ts").unwrap().unwrap();
        assert_eq!(entry.chunk_hashes, vec!["h1", "h2"]);
        assert_eq!(entry.hash_status, HashStatus::Pending);
    }

    #[test]
    fn test_edge_uniqueness_survives_property_change() {
        let mut store = SqliteGraphStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        store.upsert_file_node("a.ts", "typescript", 1).unwrap();
        store.upsert_file_node("b.ts", "typescript", 1).unwrap();

        let edge = GraphEdge::new("file:a.ts", "file:b.ts", schema::EDGE_IMPORTS);
        store.upsert_relationships(&[edge.clone().with_confidence(0.5)]).unwrap();
        store.upsert_relationships(&[edge.with_confidence(0.9)]).unwrap();

        let edges = store.edges_touching(&["file:a.ts".to_string()]).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].confidence(), 0.9);
    }

    #[test]
    fn test_delete_relationships_removes_only_named_triples() {
        let mut store = SqliteGraphStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        store.upsert_file_node("a.ts", "typescript", 1).unwrap();
        store.upsert_file_node("b.ts", "typescript", 1).unwrap();

        let imports = GraphEdge::new("file:a.ts", "file:b.ts", schema::EDGE_IMPORTS);
        let refs = GraphEdge::new("file:a.ts", "file:b.ts", schema::EDGE_REFERENCES);
        store.upsert_relationships(&[imports.clone(), refs]).unwrap();

        assert_eq!(store.delete_relationships(&[imports.clone()]).unwrap(), 1);
        assert_eq!(store.delete_relationships(&[imports]).unwrap(), 0);
        let left = store.edges_touching(&["file:b.ts".to_string()]).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].edge_type, schema::EDGE_REFERENCES);
    }

    #[test]
    fn test_failed_edge_write_leaves_no_package_node() {
        let mut store = SqliteGraphStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        store.upsert_file_node("a.ts", "typescript", 1).unwrap();
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_edge BEFORE INSERT ON edges \
                 WHEN NEW.edge_type = 'rejected' \
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let edge = GraphEdge::new("file:a.ts", "package:left-pad", "rejected");
        assert!(store.upsert_relationships(&[edge]).is_err());
        assert!(store.get_node("package:left-pad").unwrap().is_none());

        let edge = GraphEdge::new("file:a.ts", "package:left-pad", schema::EDGE_IMPORTS);
        store.upsert_relationships(&[edge]).unwrap();
        assert!(store.get_node("package:left-pad").unwrap().is_some());
    }
}
