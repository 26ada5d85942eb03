//! File index records consumed by the reindexing scheduler.
//!
//! One entry per `(repo_id, file_id)` remembers the content fingerprint and
//! chunk hashes from the last successful pass over that file.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Processing state of a file index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStatus {
    /// Change detected, graph not yet written.
    Pending,
    /// Graph written for `content_hash`.
    Indexed,
    /// Last graph write failed; `content_hash` is from the previous success.
    Failed,
    /// File no longer exists in the repository.
    Deleted,
}

impl HashStatus {
    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashStatus::Pending => "pending",
            HashStatus::Indexed => "indexed",
            HashStatus::Failed => "failed",
            HashStatus::Deleted => "deleted",
        }
    }

    /// Parse a stored status string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(HashStatus::Pending),
            "indexed" => Some(HashStatus::Indexed),
            "failed" => Some(HashStatus::Failed),
            "deleted" => Some(HashStatus::Deleted),
            _ => None,
        }
    }
}

/// Persisted change-tracking state for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIndexEntry {
    /// Repository identifier.
    pub repo_id: String,
    /// Repository-relative file path with `/` separators.
    pub file_id: String,
    /// SHA-256 of the normalized content at the last successful pass.
    pub content_hash: String,
    /// Processing state.
    pub hash_status: HashStatus,
    /// True while a graph write for this file is outstanding.
    pub pending_graph: bool,
    /// Chunk hashes from the last successful pass.
    pub chunk_hashes: Vec<String>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 time of the last mutation.
    pub updated_at: String,
}

impl FileIndexEntry {
    /// Create a fresh entry stamped with the current time.
    pub fn new(repo_id: &str, file_id: &str, content_hash: &str) -> Self {
        let now = now_rfc3339();
        Self {
            repo_id: repo_id.to_string(),
            file_id: file_id.to_string(),
            content_hash: content_hash.to_string(),
            hash_status: HashStatus::Pending,
            pending_graph: false,
            chunk_hashes: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Refresh `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = now_rfc3339();
    }
}

/// Current time formatted for storage.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Storage of [`FileIndexEntry`] records keyed by `(repo_id, file_id)`.
pub trait FileIndex {
    /// All entries of a repository, ordered by file id.
    fn list_entries(&self, repo_id: &str) -> Result<Vec<FileIndexEntry>>;

    /// A single entry, if present.
    fn get_entry(&self, repo_id: &str, file_id: &str) -> Result<Option<FileIndexEntry>>;

    /// Insert or replace an entry.
    fn upsert_entry(&mut self, entry: &FileIndexEntry) -> Result<()>;

    /// Mark an entry deleted. Fails with `FileNotFound` if it does not exist.
    fn mark_deleted(&mut self, repo_id: &str, file_id: &str) -> Result<()>;
}
