//! Stage 3: category classification and name normalization.

use super::{Category, DeduplicatedEntity, NormalizedEntity};
use crate::entity::EntityType;
use crate::ingest::detect::Language;
use crate::manifest::{PackageInfo, PackageResolver};

/// Node.js core modules.
pub const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http", "http2",
    "https", "inspector", "module", "net", "os", "path", "perf_hooks", "process", "punycode",
    "querystring", "readline", "repl", "stream", "string_decoder", "sys", "timers", "tls",
    "trace_events", "tty", "url", "util", "v8", "vm", "wasi", "worker_threads", "zlib",
];

/// Commonly imported Python standard library modules.
pub const PYTHON_STDLIB: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "bisect", "builtins",
    "calendar", "collections", "concurrent", "configparser", "contextlib", "copy", "csv",
    "ctypes", "dataclasses", "datetime", "decimal", "difflib", "email", "enum", "errno",
    "fnmatch", "fractions", "functools", "gc", "getpass", "glob", "gzip", "hashlib", "heapq",
    "hmac", "html", "http", "importlib", "inspect", "io", "ipaddress", "itertools", "json",
    "logging", "math", "mimetypes", "multiprocessing", "operator", "os", "pathlib", "pickle",
    "platform", "pprint", "queue", "random", "re", "secrets", "select", "shlex", "shutil",
    "signal", "socket", "sqlite3", "ssl", "statistics", "string", "struct", "subprocess",
    "sys", "tempfile", "textwrap", "threading", "time", "timeit", "tomllib", "traceback",
    "types", "typing", "unicodedata", "unittest", "urllib", "uuid", "warnings", "weakref",
    "xml", "zipfile", "zlib",
];

/// Rust standard library crates.
pub const RUST_BUILTINS: &[&str] = &["std", "core", "alloc"];

const NODE_PREFIX: &str = "node:";

/// Classify and normalize every entity.
pub fn apply(
    file_path: &str,
    language: Option<Language>,
    entities: &[DeduplicatedEntity],
    resolver: Option<&PackageResolver<'_>>,
) -> Vec<NormalizedEntity> {
    entities
        .iter()
        .map(|entity| normalize_one(file_path, language, entity, resolver))
        .collect()
}

fn normalize_one(
    file_path: &str,
    language: Option<Language>,
    entity: &DeduplicatedEntity,
    resolver: Option<&PackageResolver<'_>>,
) -> NormalizedEntity {
    let raw = entity.raw();
    if raw.entity_type != EntityType::Import {
        return NormalizedEntity {
            entity: entity.clone(),
            normalized_name: raw.name.clone(),
            category: Category::Internal,
            package_info: None,
        };
    }

    let specifier = raw.source.as_deref().unwrap_or(&raw.name);
    let (normalized_name, category, package_info) = if is_relative(specifier, language) {
        (resolve_internal(file_path, specifier, language), Category::Internal, None)
    } else if let Some(module) = builtin_module(specifier, language) {
        (module, Category::Builtin, None)
    } else {
        let package = package_name(specifier, language);
        let info = match resolver {
            Some(resolver) => resolver.resolve(file_path, &package),
            None => PackageInfo::named(&package),
        };
        (package, Category::External, Some(info))
    };

    NormalizedEntity {
        entity: entity.clone(),
        normalized_name,
        category,
        package_info,
    }
}

/// Whether an import specifier refers to code in the same repository.
pub fn is_relative(specifier: &str, language: Option<Language>) -> bool {
    let ecmascript = || {
        specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier == "."
            || specifier == ".."
            || specifier.starts_with('/')
    };
    let python = || specifier.starts_with('.');
    let rust = || {
        ["crate", "self", "super"]
            .iter()
            .any(|root| specifier == *root || specifier.starts_with(&format!("{}::", root)))
    };
    match language {
        Some(Language::Python) => python(),
        Some(Language::Rust) => rust(),
        Some(_) => ecmascript(),
        None => ecmascript() || python() || rust(),
    }
}

/// Builtin module name for the specifier, if it names one.
pub fn builtin_module(specifier: &str, language: Option<Language>) -> Option<String> {
    if let Some(rest) = specifier.strip_prefix(NODE_PREFIX) {
        return Some(first_segment(rest, "/").to_string());
    }
    let node = || {
        let head = first_segment(specifier, "/");
        NODE_BUILTINS.contains(&head).then(|| head.to_string())
    };
    let python = || {
        let head = first_segment(specifier, ".");
        PYTHON_STDLIB.contains(&head).then(|| head.to_string())
    };
    let rust = || {
        let head = first_segment(specifier, "::");
        RUST_BUILTINS.contains(&head).then(|| head.to_string())
    };
    match language {
        Some(Language::Python) => python(),
        Some(Language::Rust) => rust(),
        Some(_) => node(),
        None => node().or_else(python).or_else(rust),
    }
}

/// Package name of an external import.
///
/// `@scope/pkg/sub` → `@scope/pkg`, `pkg/sub` → `pkg`, `a.b.c` → `a`,
/// `a::b` → `a`.
pub fn package_name(specifier: &str, language: Option<Language>) -> String {
    match language {
        Some(Language::Python) => first_segment(specifier, ".").to_string(),
        Some(Language::Rust) => first_segment(specifier, "::").to_string(),
        _ if specifier.contains("::") => first_segment(specifier, "::").to_string(),
        _ => {
            let mut parts = specifier.split('/');
            match (parts.next(), parts.next()) {
                (Some(scope), Some(name)) if scope.starts_with('@') => format!("{}/{}", scope, name),
                (Some(name), _) => name.to_string(),
                _ => specifier.to_string(),
            }
        }
    }
}

fn first_segment<'a>(text: &'a str, separator: &str) -> &'a str {
    text.split(separator).next().unwrap_or(text)
}

fn parent_dir(file_path: &str) -> &str {
    let unified = file_path.trim_start_matches("./");
    unified.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Join `relative` onto `base`, resolving `.` and `..` segments.
pub fn join_normalized(base: &str, relative: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let base = base.replace('\\', "/");
    let relative = relative.replace('\\', "/");
    let start = if relative.starts_with('/') { "" } else { base.as_str() };
    for segment in start.split('/').chain(relative.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Repository-relative path an internal import points at, without
/// extension.
pub fn resolve_internal(file_path: &str, specifier: &str, language: Option<Language>) -> String {
    let file_path = file_path.replace('\\', "/");
    let dir = parent_dir(&file_path);

    if specifier.contains("::") || matches!(specifier, "crate" | "self" | "super") {
        let mut segments = specifier.split("::");
        let root = segments.next().unwrap_or_default();
        let rest: Vec<&str> = segments.collect();
        let base = match root {
            "crate" => crate_root(&file_path),
            "super" => join_normalized(dir, ".."),
            _ => dir.to_string(),
        };
        return join_normalized(&base, &rest.join("/"));
    }

    if language == Some(Language::Python) || (language.is_none() && !specifier.contains('/')) {
        let dots = specifier.chars().take_while(|c| *c == '.').count();
        if dots > 0 {
            let ups = vec![".."; dots - 1].join("/");
            let module = specifier[dots..].replace('.', "/");
            return join_normalized(&join_normalized(dir, &ups), &module);
        }
    }

    join_normalized(dir, specifier)
}

/// Directory `crate::` paths resolve against: the innermost `src`
/// ancestor, else the file's own directory.
fn crate_root(file_path: &str) -> String {
    let segments: Vec<&str> = file_path.split('/').collect();
    match segments[..segments.len().saturating_sub(1)]
        .iter()
        .rposition(|s| *s == "src")
    {
        Some(index) => segments[..=index].join("/"),
        None => parent_dir(file_path).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::RawEntity;
    use crate::filter::FilteredEntity;

    fn dedup(entity: RawEntity) -> DeduplicatedEntity {
        let line = entity.line;
        DeduplicatedEntity {
            entity: FilteredEntity {
                entity,
                relevance_score: 1.0,
                filter_reason: None,
            },
            occurrences: 1,
            merged_from: vec![line],
        }
    }

    #[test]
    fn test_relative_paths_resolve_against_file_dir() {
        assert_eq!(
            resolve_internal("src/app/main.ts", "../utils/format", Some(Language::TypeScript)),
            "src/utils/format"
        );
        assert_eq!(resolve_internal("main.js", "./lib", Some(Language::JavaScript)), "lib");
    }

    #[test]
    fn test_python_relative_imports() {
        assert!(is_relative(".models", Some(Language::Python)));
        assert_eq!(resolve_internal("pkg/api/views.py", ".models", Some(Language::Python)), "pkg/api/models");
        assert_eq!(resolve_internal("pkg/api/views.py", "..core.db", Some(Language::Python)), "pkg/core/db");
    }

    #[test]
    fn test_rust_relative_paths() {
        assert!(is_relative("crate::graph::schema", Some(Language::Rust)));
        assert!(!is_relative("serde::Serialize", Some(Language::Rust)));
        assert_eq!(
            resolve_internal("src/graph/memory.rs", "crate::error::Result", Some(Language::Rust)),
            "src/error/Result"
        );
        assert_eq!(
            resolve_internal("src/graph/memory.rs", "super::GraphStore", Some(Language::Rust)),
            "src/GraphStore"
        );
    }

    #[test]
    fn test_builtins() {
        assert_eq!(builtin_module("node:fs/promises", Some(Language::TypeScript)), Some("fs".into()));
        assert_eq!(builtin_module("path", Some(Language::JavaScript)), Some("path".into()));
        assert_eq!(builtin_module("os.path", Some(Language::Python)), Some("os".into()));
        assert_eq!(builtin_module("std::collections::HashMap", Some(Language::Rust)), Some("std".into()));
        assert_eq!(builtin_module("express", Some(Language::JavaScript)), None);
    }

    #[test]
    fn test_package_names() {
        assert_eq!(package_name("@scope/pkg/sub", Some(Language::TypeScript)), "@scope/pkg");
        assert_eq!(package_name("lodash/map", Some(Language::JavaScript)), "lodash");
        assert_eq!(package_name("requests.adapters", Some(Language::Python)), "requests");
        assert_eq!(package_name("serde::de", Some(Language::Rust)), "serde");
    }

    #[test]
    fn test_non_imports_are_internal_with_own_name() {
        let out = apply(
            "a.ts",
            Some(Language::TypeScript),
            &[dedup(RawEntity::new(EntityType::Class, "User", 1))],
            None,
        );
        assert_eq!(out[0].category, Category::Internal);
        assert_eq!(out[0].normalized_name, "User");
        assert!(out[0].package_info.is_none());
    }

    #[test]
    fn test_external_without_resolver_keeps_name() {
        let out = apply(
            "a.ts",
            Some(Language::TypeScript),
            &[dedup(RawEntity::import("Router", "express", 1))],
            None,
        );
        assert_eq!(out[0].category, Category::External);
        assert_eq!(out[0].normalized_name, "express");
        assert_eq!(out[0].package_info.as_ref().map(|p| p.name.as_str()), Some("express"));
    }
}
