//! Batch reindexing.
//!
//! The [`Indexer`] discovers source files, decides per file whether
//! anything changed, runs extraction and the entity pipeline for changed
//! files on a bounded worker pool, and then writes results into the graph
//! store one file at a time.

pub mod discover;
mod write;

use crate::change::{ChangeDetector, ChangeStatus};
use crate::chunk::{attach_symbols, ChunkDocumentation, Chunker, LineChunker};
use crate::config::{ScanConfig, WeaveConfig};
use crate::discovery::StoreDiscovery;
use crate::error::{Result, WeaveError};
use crate::filter::EntityPipeline;
use crate::graph::{open_store, FileIndex, FileIndexEntry, GraphStore, HashStatus};
use crate::ingest::{EntityExtractor, TreeSitterExtractor};
use crate::manifest::{FsManifestReader, ManifestCache, ManifestReader, PackageResolver};
use discover::{discover_files, SourceFile};
use parking_lot::{Mutex, MutexGuard};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};
use write::{FileUpdate, GraphWriter};

/// A file that could not be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    /// Root-relative file id.
    pub file: String,
    /// Error text.
    pub message: String,
}

/// Outcome of one [`Indexer::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Unique id of this run.
    pub run_id: String,
    /// Repository id the file index is keyed by.
    pub repo_id: String,
    /// Supported files discovered.
    pub files_seen: usize,
    /// Files indexed for the first time.
    pub new_files: usize,
    /// Files whose content changed.
    pub modified_files: usize,
    /// Files skipped because their fingerprint matched.
    pub unchanged_files: usize,
    /// Previously indexed files that no longer exist.
    pub deleted_files: usize,
    /// Files that failed to read, parse or write.
    pub failed_files: usize,
    /// Chunks new since the prior pass.
    pub chunks_added: usize,
    /// Prior chunks that disappeared.
    pub chunks_removed: usize,
    /// Entity nodes written.
    pub entities_written: usize,
    /// Edges written.
    pub edges_written: usize,
    /// Per-file failures.
    pub errors: Vec<FileError>,
    /// Wall time of the scan.
    pub elapsed_ms: u128,
}

impl ScanReport {
    fn record_failure(&mut self, file: &str, error: &WeaveError) {
        self.failed_files += 1;
        self.errors.push(FileError {
            file: file.to_string(),
            message: error.to_string(),
        });
    }
}

enum Processed {
    Unchanged,
    Changed(Box<FileUpdate>),
}

/// A pending or failed entry is reprocessed even if its hash matches,
/// since its graph may be half written.
fn needs_retry(entry: &FileIndexEntry) -> bool {
    entry.pending_graph || entry.hash_status == HashStatus::Failed
}

/// Repository id for `root`: the configured id, else the directory name.
pub fn repo_id(config: &ScanConfig, root: &Path) -> String {
    config.repo_id.clone().unwrap_or_else(|| {
        root.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repo".to_string())
    })
}

/// Incremental scanner that owns the graph store.
pub struct Indexer {
    config: WeaveConfig,
    store: Mutex<Box<dyn GraphStore>>,
    extractor: Box<dyn EntityExtractor>,
    chunker: Box<dyn Chunker>,
    manifest_reader: Box<dyn ManifestReader>,
    manifest_cache: ManifestCache,
    pool: rayon::ThreadPool,
}

impl Indexer {
    /// Create an indexer writing into `store`, with the tree-sitter
    /// extractor, line chunker and filesystem manifest reader.
    pub fn new(config: WeaveConfig, store: Box<dyn GraphStore>) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.scan.workers)
            .build()
            .map_err(|e| WeaveError::Other(format!("Failed to build worker pool: {}", e)))?;
        let manifest_cache = ManifestCache::new(
            config.cache.capacity,
            Duration::from_secs(config.cache.ttl_secs),
        );

        Ok(Self {
            chunker: Box::new(LineChunker::new(&config.chunk)),
            extractor: Box::new(TreeSitterExtractor),
            manifest_reader: Box::new(FsManifestReader),
            manifest_cache,
            pool,
            store: Mutex::new(store),
            config,
        })
    }

    /// Open the store selected by `config` under `root` and wrap it.
    pub fn open(config: WeaveConfig, root: &Path) -> Result<Self> {
        let store = open_store(&config.store, root)?;
        Self::new(config, store)
    }

    /// Replace the entity extractor.
    pub fn with_extractor(mut self, extractor: Box<dyn EntityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace the chunker.
    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    /// Replace the manifest reader.
    pub fn with_manifest_reader(mut self, reader: Box<dyn ManifestReader>) -> Self {
        self.manifest_reader = reader;
        self
    }

    /// Lock the store for queries between scans.
    pub fn store(&self) -> MutexGuard<'_, Box<dyn GraphStore>> {
        self.store.lock()
    }

    /// Give up the store.
    pub fn into_store(self) -> Box<dyn GraphStore> {
        self.store.into_inner()
    }

    /// Configuration in use.
    pub fn config(&self) -> &WeaveConfig {
        &self.config
    }

    /// Files a scan of `root` would look at.
    pub fn discover(&self, root: &Path) -> Result<Vec<SourceFile>> {
        discover_files(root, &self.config.scan)
    }

    /// Bring the graph up to date with the files under `root`.
    ///
    /// Per-file failures are recorded in the report and never abort the
    /// scan. Only failing to list files or read the file index does.
    pub fn scan(&self, root: &Path) -> Result<ScanReport> {
        let started = Instant::now();
        let root = root.canonicalize().map_err(|e| WeaveError::Io {
            path: root.to_path_buf(),
            source: e,
        })?;
        let repo_id = repo_id(&self.config.scan, &root);
        let mut report = ScanReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            repo_id: repo_id.clone(),
            ..ScanReport::default()
        };

        let files = self.discover(&root)?;
        report.files_seen = files.len();
        let known: HashSet<String> = files.iter().map(|f| f.file_id.clone()).collect();
        let priors: BTreeMap<String, FileIndexEntry> = self
            .store
            .lock()
            .list_entries(&repo_id)?
            .into_iter()
            .map(|entry| (entry.file_id.clone(), entry))
            .collect();
        log::debug!(
            "Scanning {} files in {} ({} indexed before)",
            files.len(),
            root.display(),
            priors.len()
        );

        for batch in files.chunks(self.config.scan.batch_size) {
            let outcomes: Vec<Result<Processed>> = self.pool.install(|| {
                batch
                    .par_iter()
                    .map(|file| self.process(&root, file, priors.get(&file.file_id)))
                    .collect()
            });

            for (file, outcome) in batch.iter().zip(outcomes) {
                let prior = priors.get(&file.file_id);
                match outcome {
                    Ok(Processed::Unchanged) => report.unchanged_files += 1,
                    Ok(Processed::Changed(update)) => self.commit(&repo_id, &known, prior, &update, &mut report),
                    Err(e) => {
                        log::warn!("Skipping {}: {}", file.file_id, e);
                        report.record_failure(&file.file_id, &e);
                        if let Some(entry) = prior {
                            self.mark_failed(entry);
                        }
                    }
                }
            }
        }

        for entry in priors.values() {
            if entry.hash_status == HashStatus::Deleted || known.contains(&entry.file_id) {
                continue;
            }
            match self.remove(&repo_id, &entry.file_id) {
                Ok(nodes) => {
                    log::debug!("{}: removed, {} nodes deleted", entry.file_id, nodes);
                    report.deleted_files += 1;
                }
                Err(e) => {
                    log::error!("Removing {} from the graph failed: {}", entry.file_id, e);
                    report.record_failure(&entry.file_id, &e);
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis();
        log::info!(
            "Scan {}: {} files, {} new, {} modified, {} unchanged, {} deleted, {} failed in {}ms",
            report.run_id,
            report.files_seen,
            report.new_files,
            report.modified_files,
            report.unchanged_files,
            report.deleted_files,
            report.failed_files,
            report.elapsed_ms
        );
        Ok(report)
    }

    /// Parallel phase for one file: read, detect, extract, filter.
    fn process(&self, root: &Path, file: &SourceFile, prior: Option<&FileIndexEntry>) -> Result<Processed> {
        let content = std::fs::read_to_string(&file.path).map_err(|e| WeaveError::Io {
            path: file.path.clone(),
            source: e,
        })?;

        let retry;
        let prior = match prior {
            Some(entry) if needs_retry(entry) => {
                let mut cleared = entry.clone();
                cleared.content_hash.clear();
                retry = cleared;
                Some(&retry)
            }
            other => other,
        };

        let mut change = ChangeDetector::new(self.chunker.as_ref()).detect(&file.file_id, &content, prior);
        if !change.file_changed {
            return Ok(Processed::Unchanged);
        }

        let raw = self.extractor.extract(&file.path, &change.normalized)?;
        attach_symbols(&mut change.chunks, &raw);
        let documentation = ChunkDocumentation::build(&change.normalized, &change.chunks, &raw);
        let resolver = PackageResolver::new(root, self.manifest_reader.as_ref(), &self.manifest_cache);
        let discovery = StoreDiscovery::new(&self.store);
        let pipeline = EntityPipeline::new(&self.config.filter)
            .with_resolver(&resolver)
            .with_discovery(&discovery)
            .with_documentation(&documentation)
            .run(&file.file_id, raw);

        Ok(Processed::Changed(Box::new(FileUpdate {
            file: file.clone(),
            change,
            pipeline,
        })))
    }

    /// Serial phase for one changed file.
    fn commit(
        &self,
        repo_id: &str,
        known: &HashSet<String>,
        prior: Option<&FileIndexEntry>,
        update: &FileUpdate,
        report: &mut ScanReport,
    ) {
        let file_id = update.file.file_id.as_str();
        let mut entry = prior
            .cloned()
            .unwrap_or_else(|| FileIndexEntry::new(repo_id, file_id, ""));
        entry.pending_graph = true;
        entry.touch();

        let mut guard = self.store.lock();
        let store: &mut dyn GraphStore = &mut **guard;
        match write_file(store, repo_id, known, &entry, update) {
            Ok(counts) => {
                match update.change.status {
                    ChangeStatus::New => report.new_files += 1,
                    _ => report.modified_files += 1,
                }
                report.chunks_added += update.change.added_chunks.len();
                report.chunks_removed += update.change.removed_chunks.len();
                report.entities_written += counts.entities;
                report.edges_written += counts.edges;
            }
            Err(e) => {
                log::error!("Graph write for {} failed: {}", file_id, e);
                report.record_failure(file_id, &e);
                entry.hash_status = HashStatus::Failed;
                entry.touch();
                if let Err(e) = store.upsert_entry(&entry) {
                    log::error!("Marking {} failed: {}", file_id, e);
                }
            }
        }
    }

    fn mark_failed(&self, prior: &FileIndexEntry) {
        let mut entry = prior.clone();
        entry.hash_status = HashStatus::Failed;
        entry.touch();
        if let Err(e) = self.store.lock().upsert_entry(&entry) {
            log::error!("Marking {} failed: {}", entry.file_id, e);
        }
    }

    fn remove(&self, repo_id: &str, file_id: &str) -> Result<usize> {
        let mut store = self.store.lock();
        let deleted = store.delete_file_subtree(file_id)?;
        store.mark_deleted(repo_id, file_id)?;
        Ok(deleted)
    }
}

/// Write the pending entry, the graph, then the indexed entry. The stored
/// hash only advances once the graph is complete.
fn write_file(
    store: &mut dyn GraphStore,
    repo_id: &str,
    known: &HashSet<String>,
    pending: &FileIndexEntry,
    update: &FileUpdate,
) -> Result<write::WriteCounts> {
    store.upsert_entry(pending)?;
    let counts = GraphWriter::new(store, repo_id, known).write(update)?;

    let mut indexed = pending.clone();
    indexed.content_hash = update.change.new_hash.clone();
    indexed.chunk_hashes = update.change.chunk_hashes();
    indexed.hash_status = HashStatus::Indexed;
    indexed.pending_graph = false;
    indexed.touch();
    store.upsert_entry(&indexed)?;
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{schema, MemoryGraphStore, NodeKind};
    use std::fs;
    use tempfile::TempDir;

    fn indexer() -> Indexer {
        let mut store = MemoryGraphStore::new();
        store.initialize().unwrap();
        let mut config = WeaveConfig::default();
        config.scan.repo_id = Some("demo".to_string());
        config.scan.workers = 2;
        Indexer::new(config, Box::new(store)).unwrap()
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_first_scan_indexes_everything() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "src/a.ts", "import express from 'express';\nexport function a() {}\n");
        write(temp_dir.path(), "src/b.py", "import os\n\ndef b():\n    pass\n");

        let indexer = indexer();
        let report = indexer.scan(temp_dir.path()).unwrap();
        assert_eq!(report.files_seen, 2);
        assert_eq!(report.new_files, 2);
        assert_eq!(report.failed_files, 0);
        assert!(report.entities_written > 0);

        let store = indexer.store();
        assert!(store.get_node("workspace:demo").unwrap().is_some());
        assert!(store.get_node("file:src/a.ts").unwrap().is_some());
        assert!(store.get_node("package:express").unwrap().is_some());
        let entry = store.get_entry("demo", "src/a.ts").unwrap().unwrap();
        assert_eq!(entry.hash_status, HashStatus::Indexed);
        assert!(!entry.pending_graph);
        assert!(!entry.chunk_hashes.is_empty());
    }

    #[test]
    fn test_pending_entry_is_reprocessed() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.ts", "export function a() {}\n");

        let indexer = indexer();
        indexer.scan(temp_dir.path()).unwrap();
        {
            let mut store = indexer.store();
            let mut entry = store.get_entry("demo", "a.ts").unwrap().unwrap();
            entry.pending_graph = true;
            store.upsert_entry(&entry).unwrap();
        }

        let report = indexer.scan(temp_dir.path()).unwrap();
        assert_eq!(report.unchanged_files, 0);
        assert_eq!(report.modified_files, 1);
        let entry = indexer.store().get_entry("demo", "a.ts").unwrap().unwrap();
        assert!(!entry.pending_graph);
    }

    #[test]
    fn test_removed_file_is_deleted_from_graph() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.ts", "export function a() {}\n");
        write(temp_dir.path(), "b.ts", "export function b() {}\n");

        let indexer = indexer();
        indexer.scan(temp_dir.path()).unwrap();
        fs::remove_file(temp_dir.path().join("b.ts")).unwrap();

        let report = indexer.scan(temp_dir.path()).unwrap();
        assert_eq!(report.deleted_files, 1);
        assert_eq!(report.unchanged_files, 1);

        let store = indexer.store();
        assert!(store.get_node("file:b.ts").unwrap().is_none());
        assert!(store.node_ids_for_file("b.ts", None).unwrap().is_empty());
        let entry = store.get_entry("demo", "b.ts").unwrap().unwrap();
        assert_eq!(entry.hash_status, HashStatus::Deleted);
    }

    #[test]
    fn test_internal_import_links_file_nodes() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "src/api.ts", "export function helper() {}\n");
        write(
            temp_dir.path(),
            "src/app.ts",
            "import { helper } from './api';\nhelper();\n",
        );

        let indexer = indexer();
        indexer.scan(temp_dir.path()).unwrap();

        let store = indexer.store();
        let import_id = schema::entity_id("src/app.ts", "import", "./api", Some("./api"));
        let edges = store.edges_touching(&[import_id.clone()]).unwrap();
        assert!(edges
            .iter()
            .any(|e| e.from_id == import_id && e.to_id == "file:src/api.ts" && e.edge_type == schema::EDGE_IMPORTS));

        let call_id = schema::entity_id("src/app.ts", "call", "helper", None);
        let calls = store.edges_touching(&[call_id.clone()]).unwrap();
        assert!(calls
            .iter()
            .any(|e| e.edge_type == schema::EDGE_CALLS && e.to_id == "entity:src/api.ts#function:helper"));
        assert!(store
            .nodes_of_kind(NodeKind::File)
            .unwrap()
            .iter()
            .all(|n| n.properties.get("placeholder").is_none()));
    }
}
