//! Line-ranged content chunks.
//!
//! Chunks are the unit of change tracking below the file level: each one is
//! identified by the hash of its text, so an edit only replaces the chunks
//! it touches.

use crate::change::content_hash;
use crate::config::ChunkConfig;
use crate::entity::{EntityScope, EntityType, RawEntity};
use crate::graph::{schema, ChunkRecord};
use ropey::Rope;
use std::collections::{HashMap, HashSet};

/// Hex characters of the content hash kept in chunk ids.
pub const CHUNK_HASH_LEN: usize = 16;

/// A stable-id, line-ranged slice of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Stable id (`chunk:<path>#<hash>`).
    pub id: String,
    /// Truncated content hash, unique within the file.
    pub hash: String,
    /// First line (1-based).
    pub start_line: usize,
    /// Last line (1-based, inclusive).
    pub end_line: usize,
    /// Chunk text.
    pub content: String,
    /// First class or function declared in the chunk.
    pub symbol_name: Option<String>,
}

impl Chunk {
    /// Whether `line` falls inside the chunk.
    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    /// Storage record for the chunk node.
    pub fn to_record(&self, file_path: &str) -> ChunkRecord {
        ChunkRecord {
            id: self.id.clone(),
            file_path: file_path.to_string(),
            chunk_type: "block".to_string(),
            start_line: self.start_line,
            end_line: self.end_line,
            symbol_name: self.symbol_name.clone(),
            content_hash: self.hash.clone(),
        }
    }
}

/// Splits normalized file content into chunks.
pub trait Chunker: Send + Sync {
    /// Chunk `content` of the file at `path`.
    fn chunk(&self, path: &str, content: &str) -> Vec<Chunk>;
}

/// Closes a chunk at a blank line once it holds `min_lines`, or at
/// `max_lines` regardless, so local edits leave distant chunks intact.
#[derive(Debug, Clone)]
pub struct LineChunker {
    min_lines: usize,
    max_lines: usize,
}

impl LineChunker {
    /// Create a chunker from config bounds.
    pub fn new(config: &ChunkConfig) -> Self {
        Self {
            min_lines: config.min_lines.max(1),
            max_lines: config.max_lines.max(config.min_lines.max(1)),
        }
    }
}

impl Default for LineChunker {
    fn default() -> Self {
        Self::new(&ChunkConfig::default())
    }
}

impl Chunker for LineChunker {
    fn chunk(&self, path: &str, content: &str) -> Vec<Chunk> {
        let rope = Rope::from_str(content);
        let mut chunks = Vec::new();
        let mut seen_hashes: HashMap<String, usize> = HashMap::new();
        let mut current: Vec<String> = Vec::new();
        let mut start_line = 1;

        let mut flush = |lines: &mut Vec<String>, start: usize, chunks: &mut Vec<Chunk>| {
            if lines.is_empty() {
                return;
            }
            let text = lines.concat();
            let count = lines.len();
            lines.clear();
            if text.trim().is_empty() {
                return;
            }
            // Identical blocks in one file get distinct, ordinal-salted hashes.
            let full = content_hash(&text);
            let ordinal = seen_hashes.entry(full.clone()).or_insert(0);
            let hash = if *ordinal == 0 {
                full
            } else {
                content_hash(&format!("{}#{}", text, ordinal))
            };
            *ordinal += 1;
            let hash = hash[..CHUNK_HASH_LEN].to_string();
            chunks.push(Chunk {
                id: schema::chunk_id(path, &hash),
                hash,
                start_line: start,
                end_line: start + count - 1,
                content: text,
                symbol_name: None,
            });
        };

        for (index, line) in rope.lines().enumerate() {
            let line = line.to_string();
            if line.is_empty() {
                // Rope yields an empty tail after a final newline.
                continue;
            }
            let blank = line.trim().is_empty();
            current.push(line);
            if current.len() >= self.max_lines || (blank && current.len() >= self.min_lines) {
                flush(&mut current, start_line, &mut chunks);
                start_line = index + 2;
            }
        }
        flush(&mut current, start_line, &mut chunks);
        chunks
    }
}

fn is_declaration(entity: &RawEntity) -> bool {
    matches!(entity.entity_type, EntityType::Class | EntityType::Function)
        && entity.scope != EntityScope::Local
}

/// Name each chunk after the first class or function declared inside it.
pub fn attach_symbols(chunks: &mut [Chunk], entities: &[RawEntity]) {
    let mut declarations: Vec<&RawEntity> = entities.iter().filter(|e| is_declaration(e)).collect();
    declarations.sort_by_key(|e| e.line);

    for chunk in chunks.iter_mut() {
        chunk.symbol_name = declarations
            .iter()
            .find(|e| chunk.contains_line(e.line))
            .map(|e| e.name.clone());
    }
}

/// Looks up inline documentation for a symbol name.
pub trait DocumentationSource: Send + Sync {
    /// Documentation text, if the symbol has any.
    fn documentation_for(&self, name: &str) -> Option<String>;
}

/// Documentation harvested from comment blocks next to declarations.
///
/// Takes the comment lines directly above a declaration (skipping
/// attributes and decorators) or a docstring directly below it, without
/// crossing the declaring chunk's boundaries.
#[derive(Debug, Clone, Default)]
pub struct ChunkDocumentation {
    docs: HashMap<String, String>,
}

impl ChunkDocumentation {
    /// Harvest documentation for every declaration in `entities`.
    pub fn build(content: &str, chunks: &[Chunk], entities: &[RawEntity]) -> Self {
        let lines: Vec<&str> = content.lines().collect();
        let mut docs = HashMap::new();
        let mut done = HashSet::new();

        for entity in entities.iter().filter(|e| is_declaration(e)) {
            if !done.insert(entity.name.clone()) {
                continue;
            }
            let Some(chunk) = chunks.iter().find(|c| c.contains_line(entity.line)) else {
                continue;
            };
            if let Some(doc) = doc_above(&lines, entity.line, chunk.start_line)
                .or_else(|| docstring_below(&lines, entity.line, chunk.end_line))
            {
                docs.insert(entity.name.clone(), doc);
            }
        }
        Self { docs }
    }

    /// Number of documented symbols.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether nothing was documented.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl DocumentationSource for ChunkDocumentation {
    fn documentation_for(&self, name: &str) -> Option<String> {
        self.docs.get(name).cloned()
    }
}

fn strip_comment(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.starts_with("#[") || trimmed.starts_with("#!") {
        return None;
    }
    for marker in ["///", "//!", "//", "/**", "*/", "*", "#"] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return Some(rest.trim_end_matches("*/").trim());
        }
    }
    None
}

fn is_annotation(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("#[") || trimmed.starts_with('@')
}

fn doc_above(lines: &[&str], decl_line: usize, chunk_start: usize) -> Option<String> {
    let mut collected = Vec::new();
    let mut line = decl_line;
    while line > chunk_start {
        line -= 1;
        let text = lines.get(line - 1)?;
        if is_annotation(text) && collected.is_empty() {
            continue;
        }
        match strip_comment(text) {
            Some(body) => collected.push(body.to_string()),
            None => break,
        }
    }
    collected.reverse();
    let doc = collected
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (!doc.is_empty()).then_some(doc)
}

fn docstring_below(lines: &[&str], decl_line: usize, chunk_end: usize) -> Option<String> {
    if decl_line >= chunk_end {
        return None;
    }
    let first = lines.get(decl_line)?.trim();
    let quote = ["\"\"\"", "'''"].into_iter().find(|q| first.starts_with(q))?;
    let mut body = Vec::new();
    let opening = &first[quote.len()..];
    if let Some(end) = opening.find(quote) {
        body.push(opening[..end].trim().to_string());
    } else {
        body.push(opening.trim().to_string());
        for line in lines.iter().take(chunk_end).skip(decl_line + 1) {
            let text = line.trim();
            if let Some(end) = text.find(quote) {
                body.push(text[..end].trim().to_string());
                break;
            }
            body.push(text.to_string());
        }
    }
    let doc = body
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (!doc.is_empty()).then_some(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(min: usize, max: usize) -> LineChunker {
        LineChunker::new(&ChunkConfig {
            min_lines: min,
            max_lines: max,
        })
    }

    #[test]
    fn test_empty_content_has_no_chunks() {
        assert!(LineChunker::default().chunk("a.ts", "").is_empty());
    }

    #[test]
    fn test_chunks_close_at_blank_lines_after_min() {
        let content = "a\nb\n\nc\nd\n\ne\n";
        let chunks = chunker(2, 10).chunk("a.ts", content);
        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 3));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (4, 6));
        assert_eq!((chunks[2].start_line, chunks[2].end_line), (7, 7));
    }

    #[test]
    fn test_chunks_close_at_max_lines() {
        let content = "1\n2\n3\n4\n5\n";
        let chunks = chunker(1, 2).chunk("a.ts", content);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].content, "5\n");
    }

    #[test]
    fn test_edit_only_changes_touched_chunk() {
        let before = "fn a() {}\n\nfn b() {}\n\nfn c() {}\n";
        let after = "fn a() {}\n\nfn b() { 1 }\n\nfn c() {}\n";
        let old = chunker(1, 10).chunk("x.rs", before);
        let new = chunker(1, 10).chunk("x.rs", after);
        assert_eq!(old.len(), 3);
        assert_eq!(old[0].id, new[0].id);
        assert_ne!(old[1].id, new[1].id);
        assert_eq!(old[2].id, new[2].id);
    }

    #[test]
    fn test_identical_blocks_get_distinct_ids() {
        let content = "x = 1\n\nx = 1\n";
        let chunks = chunker(1, 10).chunk("a.py", content);
        assert_eq!(chunks.len(), 2);
        assert_ne!(chunks[0].id, chunks[1].id);
    }

    #[test]
    fn test_attach_symbols_and_documentation() {
        let content = "/// Adds numbers.\nfn add() {}\n\ndef greet():\n    \"\"\"Say hello.\"\"\"\n";
        let mut chunks = chunker(1, 10).chunk("a.rs", content);
        let entities = vec![
            RawEntity::new(EntityType::Function, "add", 2),
            RawEntity::new(EntityType::Function, "greet", 4),
        ];
        attach_symbols(&mut chunks, &entities);
        assert_eq!(chunks[0].symbol_name.as_deref(), Some("add"));
        assert_eq!(chunks[1].symbol_name.as_deref(), Some("greet"));

        let docs = ChunkDocumentation::build(content, &chunks, &entities);
        assert_eq!(docs.documentation_for("add").as_deref(), Some("Adds numbers."));
        assert_eq!(docs.documentation_for("greet").as_deref(), Some("Say hello."));
    }
}
