//! Maps parsed commands onto library calls.
//!
//! Every command returns the pretty-printed JSON payload to print.

use super::{Cli, CliSuccessPayload, Commands};
use crate::config::{StoreBackend, WeaveConfig};
use crate::error::{Result, WeaveError};
use crate::graph::{open_store, FileIndex, GraphStore, HashStatus};
use crate::index::{self, Indexer};
use crate::neighborhood::{NeighborhoodRequest, NeighborhoodService};
use serde::Serialize;
use serde_json::json;
use std::path::Path;

/// Configuration for `cli`: the explicit file, else the root's config,
/// with store flags applied on top.
pub fn load_config(cli: &Cli) -> Result<WeaveConfig> {
    let mut config = match &cli.config {
        Some(path) => WeaveConfig::load(path)?,
        None => WeaveConfig::load_or_default(&cli.root)?,
    };
    if cli.memory {
        config.store.backend = StoreBackend::Memory;
    }
    if let Some(db) = &cli.db {
        config.store.backend = StoreBackend::Sqlite;
        config.store.path = db.clone();
    }
    Ok(config)
}

fn render(message: String, data: &impl Serialize) -> Result<String> {
    let payload = CliSuccessPayload::with_data(message, serde_json::to_value(data)?);
    Ok(serde_json::to_string_pretty(&payload)?)
}

/// Store to query. An in-memory store is filled by scanning the root.
fn query_store(config: WeaveConfig, root: &Path) -> Result<Box<dyn GraphStore>> {
    match config.store.backend {
        StoreBackend::Sqlite => open_store(&config.store, root),
        StoreBackend::Memory => {
            let indexer = Indexer::open(config, root)?;
            let report = indexer.scan(root)?;
            log::debug!("Scanned {} files into memory", report.files_seen);
            Ok(indexer.into_store())
        }
    }
}

/// Run `cli.command` and return the JSON to print.
pub fn execute(cli: &Cli) -> Result<String> {
    let config = load_config(cli)?;
    let repo_id = match cli.root.canonicalize() {
        Ok(root) => index::repo_id(&config.scan, &root),
        Err(_) => index::repo_id(&config.scan, &cli.root),
    };
    let open = || query_store(config.clone(), &cli.root);

    match &cli.command {
        Commands::Scan => {
            let indexer = Indexer::open(config.clone(), &cli.root)?;
            let report = indexer.scan(&cli.root)?;
            let message = format!(
                "Scanned {} files: {} new, {} modified, {} unchanged, {} deleted, {} failed",
                report.files_seen,
                report.new_files,
                report.modified_files,
                report.unchanged_files,
                report.deleted_files,
                report.failed_files
            );
            render(message, &report)
        }

        Commands::Subgraph {
            seeds,
            depth,
            max_nodes,
        } => {
            let seeds = if seeds.is_empty() { None } else { Some(seeds.as_slice()) };
            let subgraph = open()?.get_subgraph(seeds, *depth, *max_nodes)?;
            let message = format!("{} nodes, {} edges", subgraph.nodes.len(), subgraph.edges.len());
            render(message, &subgraph)
        }

        Commands::Related { chunks, depth } => {
            let related = open()?.get_related_chunks(chunks, *depth)?;
            render(format!("{} related chunks", related.len()), &related)
        }

        Commands::Neighborhood {
            center,
            depth,
            max_per_level,
            min_confidence,
            node_kinds,
            edge_types,
            direction,
        } => {
            let request = NeighborhoodRequest {
                center: center.clone(),
                depth: *depth,
                max_neighbors_per_level: *max_per_level,
                min_confidence: *min_confidence,
                node_kinds: node_kinds.iter().map(|k| k.to_node_kind()).collect(),
                edge_types: edge_types.clone(),
                direction: direction.to_direction(),
            };
            let snapshot = open()?.snapshot()?;
            let neighborhood = NeighborhoodService::new(&snapshot).expand(&request)?;
            let message = format!(
                "{} nodes, {} edges around {}",
                neighborhood.stats.node_count, neighborhood.stats.edge_count, center
            );
            render(message, &neighborhood)
        }

        Commands::Stats => {
            let stats = open()?.get_stats()?;
            if !stats.duplicate_ids.is_empty() {
                return Err(WeaveError::DuplicateIdIntegrityViolation {
                    ids: stats.duplicate_ids,
                });
            }
            render(
                format!("{} nodes, {} edges", stats.node_count, stats.edge_count),
                &stats,
            )
        }

        Commands::Delete { file } => {
            let mut store = open()?;
            let deleted = store.delete_file_subtree(file)?;
            // Forget the fingerprint so the next scan rebuilds the file.
            if let Some(entry) = store.get_entry(&repo_id, file)? {
                if entry.hash_status != HashStatus::Deleted {
                    store.mark_deleted(&repo_id, file)?;
                }
            }
            if deleted == 0 {
                let payload = CliSuccessPayload::message_only(format!("Nothing stored under {}", file));
                return Ok(serde_json::to_string_pretty(&payload)?);
            }
            render(
                format!("Deleted {} nodes under {}", deleted, file),
                &json!({ "file": file, "deleted_nodes": deleted }),
            )
        }
    }
}
