//! Codeweave: incremental code knowledge graph.
//!
//! This library fingerprints repository files to decide what needs
//! reprocessing, turns raw syntax-tree extraction into a deduplicated,
//! confidence-scored entity graph, and answers bounded neighborhood
//! queries over that graph for retrieval features.

#![warn(missing_docs)]
// env_logger is used by src/main.rs (binary), not this library
#![expect(unused_crate_dependencies)]

pub mod cache;
pub mod change;
pub mod chunk;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod entity;
pub mod error;
pub mod filter;
pub mod graph;
pub mod index;
pub mod ingest;
pub mod manifest;
pub mod neighborhood;

/// Re-export common error types for convenience.
pub use error::{Result, WeaveError};

/// Re-export the store contract for convenience.
pub use graph::GraphStore;

/// Re-export the scanner for convenience.
pub use index::{Indexer, ScanReport};

/// Codeweave version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
