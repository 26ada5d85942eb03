//! Source file discovery.

use crate::config::ScanConfig;
use crate::error::{Result, WeaveError};
use crate::ingest::detect::{detect_language, Language};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A supported source file under the scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Root-relative path with `/` separators; doubles as the file id.
    pub file_id: String,
    /// Detected language.
    pub language: Language,
    /// Size on disk.
    pub size_bytes: u64,
}

/// Root-relative id of `path` with `/` separators.
pub fn relative_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn is_skipped_dir(entry: &DirEntry, skip_dirs: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && skip_dirs.iter().any(|skip| entry.file_name().to_str() == Some(skip.as_str()))
}

/// Walk `root` and return every file the scanner should look at, ordered
/// by file id.
///
/// Unreadable directory entries are logged and skipped.
pub fn discover_files(root: &Path, config: &ScanConfig) -> Result<Vec<SourceFile>> {
    let patterns = config
        .include
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| WeaveError::Config {
                message: format!("Invalid include pattern '{}': {}", p, e),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry, &config.skip_dirs));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(language) = detect_language(entry.path()) else {
            continue;
        };
        let Some(file_id) = relative_id(root, entry.path()) else {
            continue;
        };
        if !patterns.is_empty() && !patterns.iter().any(|p| p.matches(&file_id)) {
            continue;
        }
        let size_bytes = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                log::debug!("Skipping {}: {}", file_id, e);
                continue;
            }
        };
        if size_bytes > config.max_file_size {
            log::debug!("Skipping {}: {} bytes exceeds limit", file_id, size_bytes);
            continue;
        }

        files.push(SourceFile {
            path: entry.into_path(),
            file_id,
            language,
            size_bytes,
        });
    }

    files.sort_by(|a, b| a.file_id.cmp(&b.file_id));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn ids(files: &[SourceFile]) -> Vec<&str> {
        files.iter().map(|f| f.file_id.as_str()).collect()
    }

    #[test]
    fn test_discovers_supported_files_and_skips_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "src/app.ts", "export const a = 1;\n");
        write(root, "src/lib/util.py", "x = 1\n");
        write(root, "README.md", "# readme\n");
        write(root, "node_modules/left-pad/index.js", "module.exports = 1;\n");

        let files = discover_files(root, &ScanConfig::default()).unwrap();
        assert_eq!(ids(&files), vec!["src/app.ts", "src/lib/util.py"]);
        assert_eq!(files[0].language, Language::TypeScript);
    }

    #[test]
    fn test_include_patterns_and_size_limit() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "src/a.rs", "fn a() {}\n");
        write(root, "scripts/b.py", "print(1)\n");
        write(root, "src/big.rs", &"// filler\n".repeat(50));

        let config = ScanConfig {
            include: vec!["src/*".to_string()],
            max_file_size: 100,
            ..ScanConfig::default()
        };
        let files = discover_files(root, &config).unwrap();
        assert_eq!(ids(&files), vec!["src/a.rs"]);
    }

    #[test]
    fn test_invalid_include_pattern_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = ScanConfig {
            include: vec!["src/[".to_string()],
            ..ScanConfig::default()
        };
        assert!(matches!(
            discover_files(temp_dir.path(), &config),
            Err(WeaveError::Config { .. })
        ));
    }
}
