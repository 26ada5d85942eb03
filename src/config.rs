//! Configuration loaded from `.codeweave.toml`.
//!
//! Every section has defaults, so an empty or missing file is valid.

use crate::error::{Result, WeaveError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name looked up at the repository root.
pub const CONFIG_FILE_NAME: &str = ".codeweave.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    /// Relevance filter switches.
    pub filter: FilterConfig,
    /// Storage backend selection.
    pub store: StoreConfig,
    /// File discovery and worker pool.
    pub scan: ScanConfig,
    /// Chunk boundaries.
    pub chunk: ChunkConfig,
    /// Manifest cache bounds.
    pub cache: CacheConfig,
}

/// Stage 1 switches. All on by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Drop function-local entities.
    pub drop_local_scope: bool,
    /// Drop type references naming primitive/builtin types.
    pub drop_primitive_types: bool,
    /// Drop imports of non-code assets (stylesheets, images, fonts).
    pub drop_asset_imports: bool,
    /// Multiply the relevance of private members by `private_weight`.
    pub downweight_private: bool,
    /// Relevance multiplier for private members.
    pub private_weight: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            drop_local_scope: true,
            drop_primitive_types: true,
            drop_asset_imports: true,
            downweight_private: true,
            private_weight: 0.3,
        }
    }
}

/// Which [`crate::graph::GraphStore`] backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// File-backed SQLite database.
    Sqlite,
    /// Process-local maps.
    Memory,
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend.
    pub backend: StoreBackend,
    /// Database path; relative paths resolve against the repository root.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: PathBuf::from(".codeweave/graph.db"),
        }
    }
}

/// Discovery and worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Files handed to the pool at a time.
    pub batch_size: usize,
    /// Worker threads.
    pub workers: usize,
    /// Files larger than this are skipped.
    pub max_file_size: u64,
    /// Directory names never descended into.
    pub skip_dirs: Vec<String>,
    /// Glob patterns on root-relative paths; empty accepts every supported file.
    pub include: Vec<String>,
    /// Repository id; defaults to the root directory name.
    pub repo_id: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            workers: 4,
            max_file_size: 1024 * 1024,
            skip_dirs: [
                ".git",
                ".codeweave",
                "node_modules",
                "target",
                "dist",
                "build",
                "__pycache__",
                ".venv",
                "venv",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            include: Vec::new(),
            repo_id: None,
        }
    }
}

/// Chunk boundary settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// A chunk may close at a blank line once it has this many lines.
    pub min_lines: usize,
    /// A chunk always closes at this many lines.
    pub max_lines: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_lines: 8,
            max_lines: 60,
        }
    }
}

/// Manifest cache bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached directories.
    pub capacity: usize,
    /// Seconds before an entry expires.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl_secs: 300,
        }
    }
}

impl WeaveConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: WeaveConfig = toml::from_str(text).map_err(|e| WeaveError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| WeaveError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load `<root>/.codeweave.toml` if present, else defaults.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        if path.is_file() {
            log::debug!("Loading config from {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings the scanner cannot run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| {
            Err(WeaveError::Config {
                message: message.to_string(),
            })
        };
        if self.scan.batch_size == 0 {
            return fail("scan.batch_size must be at least 1");
        }
        if self.scan.workers == 0 {
            return fail("scan.workers must be at least 1");
        }
        if self.chunk.min_lines == 0 || self.chunk.min_lines > self.chunk.max_lines {
            return fail("chunk.min_lines must be between 1 and chunk.max_lines");
        }
        if !(0.0..=1.0).contains(&self.filter.private_weight) {
            return fail("filter.private_weight must be within [0, 1]");
        }
        if self.cache.capacity == 0 {
            return fail("cache.capacity must be at least 1");
        }
        for pattern in &self.scan.include {
            if let Err(e) = glob::Pattern::new(pattern) {
                return fail(&format!("invalid include pattern '{}': {}", pattern, e));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = WeaveConfig::from_toml_str("").unwrap();
        assert_eq!(config, WeaveConfig::default());
        assert!(config.filter.drop_asset_imports);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = WeaveConfig::from_toml_str(
            "[store]\nbackend = \"memory\"\n\n[scan]\nbatch_size = 4\n",
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.scan.batch_size, 4);
        assert_eq!(config.scan.workers, 4);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = WeaveConfig::from_toml_str("[scan]\nbatch_size = 0\n");
        assert!(matches!(result, Err(WeaveError::Config { .. })));
    }

    #[test]
    fn test_private_weight_out_of_range_rejected() {
        let result = WeaveConfig::from_toml_str("[filter]\nprivate_weight = 1.5\n");
        assert!(matches!(result, Err(WeaveError::Config { .. })));
    }
}
