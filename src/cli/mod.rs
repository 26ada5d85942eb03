//! Command-line interface for Codeweave.
//!
//! This module handles argument parsing and the JSON payload shapes only.
//! Commands are mapped onto library calls in [`commands`].

pub mod commands;

use crate::graph::NodeKind;
use crate::neighborhood::Direction;
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

pub use commands::execute;

/// Codeweave: incremental code knowledge graph.
#[derive(Parser, Debug)]
#[command(name = "codeweave")]
#[command(author, version, about, long_about = None)]
#[command(subcommand_required = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Repository root.
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Config file (default: <root>/.codeweave.toml when present).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// SQLite database path, overriding the config.
    #[arg(long, global = true, value_name = "PATH", conflicts_with = "memory")]
    pub db: Option<PathBuf>,

    /// Use an in-memory store. Query commands scan the root first.
    #[arg(long, global = true)]
    pub memory: bool,
}

/// Available Codeweave commands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Scan the repository and bring the graph up to date.
    Scan,

    /// Bounded breadth-first subgraph around seed nodes.
    Subgraph {
        /// Seed node id (repeatable). All file nodes when omitted.
        #[arg(long = "seed", value_name = "ID")]
        seeds: Vec<String>,

        /// Maximum hops from a seed.
        #[arg(short, long, default_value_t = 2)]
        depth: usize,

        /// Maximum nodes returned.
        #[arg(long, default_value_t = 200)]
        max_nodes: usize,
    },

    /// Chunks related to the given chunks over chunk-to-chunk edges.
    Related {
        /// Chunk node id (repeatable).
        #[arg(long = "chunk", value_name = "ID", required = true)]
        chunks: Vec<String>,

        /// Maximum hops.
        #[arg(short, long, default_value_t = 1)]
        depth: usize,
    },

    /// Filtered neighborhood of one node.
    Neighborhood {
        /// Center node id.
        #[arg(long)]
        center: String,

        /// Maximum hops.
        #[arg(short, long, default_value_t = 1)]
        depth: usize,

        /// Keep at most this many highest-confidence edges per level.
        #[arg(long, value_name = "N")]
        max_per_level: Option<usize>,

        /// Minimum node and edge confidence.
        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,

        /// Allowed node kind (repeatable).
        #[arg(long = "node-kind", value_enum, value_name = "KIND")]
        node_kinds: Vec<NodeKindArg>,

        /// Allowed edge type (repeatable).
        #[arg(long = "edge-type", value_name = "TYPE")]
        edge_types: Vec<String>,

        /// Edge direction to follow.
        #[arg(long, value_enum, default_value_t = DirectionArg::Both)]
        direction: DirectionArg,
    },

    /// Node and edge counts plus the duplicate-id audit.
    Stats,

    /// Remove a file and everything stored under it from the graph.
    Delete {
        /// Root-relative file path.
        #[arg(short, long)]
        file: String,
    },
}

/// Node kind filter.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKindArg {
    /// Source files.
    File,
    /// Line-ranged chunks.
    Chunk,
    /// Extracted entities.
    Entity,
    /// Repository root.
    Workspace,
    /// External or builtin packages.
    Package,
}

impl NodeKindArg {
    /// Convert to the graph node kind.
    pub fn to_node_kind(self) -> NodeKind {
        match self {
            NodeKindArg::File => NodeKind::File,
            NodeKindArg::Chunk => NodeKind::Chunk,
            NodeKindArg::Entity => NodeKind::Entity,
            NodeKindArg::Workspace => NodeKind::Workspace,
            NodeKindArg::Package => NodeKind::Package,
        }
    }
}

/// Traversal direction.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionArg {
    /// Follow edges pointing at the frontier.
    Incoming,
    /// Follow edges leaving the frontier.
    Outgoing,
    /// Follow both.
    Both,
}

impl DirectionArg {
    /// Convert to the neighborhood direction.
    pub fn to_direction(self) -> Direction {
        match self {
            DirectionArg::Incoming => Direction::Incoming,
            DirectionArg::Outgoing => Direction::Outgoing,
            DirectionArg::Both => Direction::Both,
        }
    }
}

/// Parse command-line arguments.
///
/// Returns the parsed Cli struct or exits on error.
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// JSON success payload for CLI responses.
#[derive(Debug, Serialize)]
pub struct CliSuccessPayload {
    /// Status indicator ("ok").
    pub status: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CliSuccessPayload {
    /// Construct a payload containing only the message.
    pub fn message_only(message: String) -> Self {
        Self {
            status: "ok",
            message,
            data: None,
        }
    }

    /// Construct a payload with structured data.
    pub fn with_data(message: String, data: Value) -> Self {
        Self {
            status: "ok",
            message,
            data: Some(data),
        }
    }
}

/// JSON error payload for CLI responses.
#[derive(Debug, Serialize)]
pub struct CliErrorPayload {
    /// Status indicator ("error").
    pub status: &'static str,
    /// Structured error details.
    pub error: ErrorDetails,
}

/// Details for a CLI error payload.
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    /// Error kind identifier (NodeNotFound, etc.).
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Optional hint for remediation steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl CliErrorPayload {
    /// Build payload from a WeaveError instance.
    pub fn from_error(error: &crate::WeaveError) -> Self {
        let hint = match error {
            crate::WeaveError::NodeNotFound(_) => Some("Run `codeweave scan` first, or check the node id".to_string()),
            crate::WeaveError::DuplicateIdIntegrityViolation { .. } => {
                Some("Rebuild the store: delete the database and rescan".to_string())
            }
            _ => None,
        };

        CliErrorPayload {
            status: "error",
            error: ErrorDetails {
                kind: error.kind(),
                message: error.to_string(),
                hint,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_neighborhood_flags() {
        let cli = Cli::try_parse_from([
            "codeweave",
            "neighborhood",
            "--center",
            "file:a.ts",
            "--depth",
            "2",
            "--node-kind",
            "entity",
            "--node-kind",
            "file",
            "--edge-type",
            "imports",
            "--direction",
            "outgoing",
            "--memory",
        ])
        .unwrap();

        assert!(cli.memory);
        match cli.command {
            Commands::Neighborhood {
                center,
                depth,
                node_kinds,
                edge_types,
                direction,
                ..
            } => {
                assert_eq!(center, "file:a.ts");
                assert_eq!(depth, 2);
                assert_eq!(node_kinds, vec![NodeKindArg::Entity, NodeKindArg::File]);
                assert_eq!(edge_types, vec!["imports"]);
                assert_eq!(direction.to_direction(), Direction::Outgoing);
            }
            other => panic!("Expected neighborhood, got {:?}", other),
        }
    }

    #[test]
    fn test_db_conflicts_with_memory() {
        let result = Cli::try_parse_from(["codeweave", "stats", "--db", "g.db", "--memory"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_error_payload_carries_kind() {
        let payload = CliErrorPayload::from_error(&crate::WeaveError::NodeNotFound("x".into()));
        assert_eq!(payload.error.kind, "NodeNotFound");
        assert!(payload.error.hint.is_some());
    }
}
