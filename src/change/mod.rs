//! Content fingerprinting and chunk-level change detection.

use crate::chunk::{Chunk, Chunker};
use crate::graph::file_index::{FileIndexEntry, HashStatus};
use crate::graph::schema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// Canonical form used for hashing and chunking: `\n` line endings,
/// trailing whitespace removed per line, NFC composition.
pub fn normalize_content(content: &str) -> String {
    let unified = content.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    for line in unified.lines() {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.nfc().collect()
}

/// SHA-256 of `text` as lowercase hex.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of raw file content after normalization.
pub fn fingerprint(content: &str) -> String {
    content_hash(&normalize_content(content))
}

/// Outcome class for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// Never indexed, or indexed and later deleted.
    New,
    /// Hash differs from the prior pass.
    Modified,
    /// Hash matches the prior pass.
    Unchanged,
}

/// Result of comparing a file against its prior index entry.
#[derive(Debug, Clone)]
pub struct ChangeResult {
    /// Whether downstream work is needed.
    pub file_changed: bool,
    /// Outcome class.
    pub status: ChangeStatus,
    /// Ids of chunks not present in the prior pass.
    pub added_chunks: Vec<String>,
    /// Ids of prior chunks that no longer exist.
    pub removed_chunks: Vec<String>,
    /// Prior content hash, if any.
    pub old_hash: Option<String>,
    /// Current content hash.
    pub new_hash: String,
    /// Current chunks; empty when unchanged.
    pub chunks: Vec<Chunk>,
    /// Normalized content the chunks were cut from.
    pub normalized: String,
}

impl ChangeResult {
    /// Short hashes of the current chunks, for the file index.
    pub fn chunk_hashes(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.hash.clone()).collect()
    }
}

/// Decides whether a file needs reprocessing and which chunks moved.
pub struct ChangeDetector<'a> {
    chunker: &'a dyn Chunker,
}

impl<'a> ChangeDetector<'a> {
    /// Create a detector that cuts chunks with `chunker`.
    pub fn new(chunker: &'a dyn Chunker) -> Self {
        Self { chunker }
    }

    /// Compare `content` of `path` against `prior`.
    ///
    /// An unchanged hash returns before the chunker runs.
    pub fn detect(&self, path: &str, content: &str, prior: Option<&FileIndexEntry>) -> ChangeResult {
        let normalized = normalize_content(content);
        let new_hash = content_hash(&normalized);
        let prior = prior.filter(|entry| entry.hash_status != HashStatus::Deleted);

        if let Some(entry) = prior {
            if entry.content_hash == new_hash {
                log::debug!("{}: unchanged", path);
                return ChangeResult {
                    file_changed: false,
                    status: ChangeStatus::Unchanged,
                    added_chunks: Vec::new(),
                    removed_chunks: Vec::new(),
                    old_hash: Some(entry.content_hash.clone()),
                    new_hash,
                    chunks: Vec::new(),
                    normalized,
                };
            }
        }

        let chunks = self.chunker.chunk(path, &normalized);
        let (status, added_chunks, removed_chunks): (ChangeStatus, Vec<String>, Vec<String>) = match prior {
            None => (
                ChangeStatus::New,
                chunks.iter().map(|c| c.id.clone()).collect(),
                Vec::new(),
            ),
            Some(entry) => {
                let old: HashSet<&str> = entry.chunk_hashes.iter().map(String::as_str).collect();
                let new: HashSet<&str> = chunks.iter().map(|c| c.hash.as_str()).collect();
                let added = chunks
                    .iter()
                    .filter(|c| !old.contains(c.hash.as_str()))
                    .map(|c| c.id.clone())
                    .collect();
                let removed = entry
                    .chunk_hashes
                    .iter()
                    .filter(|h| !new.contains(h.as_str()))
                    .map(|h| schema::chunk_id(path, h))
                    .collect();
                (ChangeStatus::Modified, added, removed)
            }
        };
        log::debug!(
            "{}: {:?}, +{} -{} chunks",
            path,
            status,
            added_chunks.len(),
            removed_chunks.len()
        );

        ChangeResult {
            file_changed: true,
            status,
            added_chunks,
            removed_chunks,
            old_hash: prior.map(|entry| entry.content_hash.clone()),
            new_hash,
            chunks,
            normalized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::LineChunker;
    use crate::config::ChunkConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChunker {
        inner: LineChunker,
        calls: AtomicUsize,
    }

    impl Chunker for CountingChunker {
        fn chunk(&self, path: &str, content: &str) -> Vec<Chunk> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.chunk(path, content)
        }
    }

    fn counting() -> CountingChunker {
        CountingChunker {
            inner: LineChunker::new(&ChunkConfig {
                min_lines: 1,
                max_lines: 10,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    fn entry_for(result: &ChangeResult) -> FileIndexEntry {
        let mut entry = FileIndexEntry::new("repo", "a.py", &result.new_hash);
        entry.hash_status = HashStatus::Indexed;
        entry.chunk_hashes = result.chunk_hashes();
        entry
    }

    #[test]
    fn test_formatting_noise_does_not_change_hash() {
        assert_eq!(fingerprint("a = 1  \r\nb = 2\r\n"), fingerprint("a = 1\nb = 2\n"));
        assert_eq!(fingerprint("x\ry"), fingerprint("x\ny\n"));
        // "é" precomposed vs e + combining acute
        assert_eq!(fingerprint("caf\u{e9}"), fingerprint("cafe\u{301}"));
        assert_ne!(fingerprint("a = 1"), fingerprint("a = 2"));
    }

    #[test]
    fn test_new_file_reports_all_chunks_added() {
        let chunker = counting();
        let detector = ChangeDetector::new(&chunker);
        let result = detector.detect("a.py", "x = 1\n\ny = 2\n", None);
        assert!(result.file_changed);
        assert_eq!(result.status, ChangeStatus::New);
        assert_eq!(result.added_chunks.len(), 2);
        assert!(result.removed_chunks.is_empty());
        assert!(result.old_hash.is_none());
    }

    #[test]
    fn test_unchanged_file_skips_chunking() {
        let chunker = counting();
        let detector = ChangeDetector::new(&chunker);
        let first = detector.detect("a.py", "x = 1\n", None);
        let entry = entry_for(&first);

        let second = detector.detect("a.py", "x = 1   \r\n", Some(&entry));
        assert!(!second.file_changed);
        assert_eq!(second.status, ChangeStatus::Unchanged);
        assert!(second.chunks.is_empty());
        assert_eq!(chunker.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_modified_file_reports_chunk_delta() {
        let chunker = counting();
        let detector = ChangeDetector::new(&chunker);
        let first = detector.detect("a.py", "x = 1\n\ny = 2\n", None);
        let entry = entry_for(&first);

        let second = detector.detect("a.py", "x = 1\n\ny = 3\n", Some(&entry));
        assert_eq!(second.status, ChangeStatus::Modified);
        assert_eq!(second.added_chunks.len(), 1);
        assert_eq!(second.removed_chunks.len(), 1);
        assert_eq!(second.removed_chunks[0], first.chunks[1].id);
        assert_eq!(second.old_hash.as_deref(), Some(first.new_hash.as_str()));
    }

    #[test]
    fn test_deleted_prior_counts_as_new() {
        let chunker = counting();
        let detector = ChangeDetector::new(&chunker);
        let first = detector.detect("a.py", "x = 1\n", None);
        let mut entry = entry_for(&first);
        entry.hash_status = HashStatus::Deleted;

        let again = detector.detect("a.py", "x = 1\n", Some(&entry));
        assert!(again.file_changed);
        assert_eq!(again.status, ChangeStatus::New);
        assert!(again.removed_chunks.is_empty());
    }
}
