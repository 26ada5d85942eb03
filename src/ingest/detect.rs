//! Language detection from file extensions.
//!
//! Table-driven. Unknown extensions return None, never inferred from content.

use std::path::Path;

/// Languages the extractors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// Rust (.rs)
    Rust,
    /// Python (.py)
    Python,
    /// JavaScript (.js, .mjs, .cjs, .jsx)
    JavaScript,
    /// TypeScript (.ts, .tsx)
    TypeScript,
}

impl Language {
    /// Convert language to string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }
}

/// Detect programming language from file path.
///
/// # Examples
///
/// ```
/// # use codeweave::ingest::detect::{detect_language, Language};
/// # use std::path::Path;
/// assert_eq!(detect_language(Path::new("main.rs")), Some(Language::Rust));
/// assert_eq!(detect_language(Path::new("app.tsx")), Some(Language::TypeScript));
/// assert_eq!(detect_language(Path::new("file.txt")), None);
/// ```
pub fn detect_language(path: &Path) -> Option<Language> {
    let extension = path.extension()?.to_str()?;

    // Case-sensitive
    let language = match extension {
        "rs" => Language::Rust,
        "py" => Language::Python,
        "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
        "ts" | "tsx" => Language::TypeScript,
        _ => return None,
    };

    Some(language)
}

/// Whether the path needs the JSX-aware TypeScript grammar.
pub fn is_tsx(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("tsx")
}
