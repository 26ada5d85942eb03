//! Package manifest reading and external package resolution.
//!
//! Supports `package.json`, `Cargo.toml` and `pyproject.toml`. Resolution
//! is best-effort: any read or parse failure is treated as "not declared".

use crate::cache::TtlLruCache;
use crate::error::{Result, WeaveError};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toml::Value as TomlValue;

/// Lockfiles in detection priority order with the manager they imply.
pub const LOCKFILES: &[(&str, &str)] = &[
    ("pnpm-lock.yaml", "pnpm"),
    ("yarn.lock", "yarn"),
    ("bun.lockb", "bun"),
    ("package-lock.json", "npm"),
    ("Cargo.lock", "cargo"),
    ("poetry.lock", "poetry"),
    ("uv.lock", "uv"),
    ("Pipfile.lock", "pipenv"),
];

/// Package metadata attached to external imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package name; always set.
    pub name: String,
    /// Declared version requirement.
    pub version: Option<String>,
    /// Package manager.
    pub manager: Option<String>,
    /// Declared only as a development dependency.
    pub is_dev_dependency: bool,
}

impl PackageInfo {
    /// Info carrying only the name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            manager: None,
            is_dev_dependency: false,
        }
    }
}

/// Manifest format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// npm-style `package.json`.
    PackageJson,
    /// Cargo manifest.
    CargoToml,
    /// Python project metadata.
    PyProject,
}

impl ManifestKind {
    /// All kinds in lookup order.
    pub const ALL: [ManifestKind; 3] = [
        ManifestKind::PackageJson,
        ManifestKind::CargoToml,
        ManifestKind::PyProject,
    ];

    /// File name looked up in a directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            ManifestKind::PackageJson => "package.json",
            ManifestKind::CargoToml => "Cargo.toml",
            ManifestKind::PyProject => "pyproject.toml",
        }
    }

    /// Manager assumed when no lockfile is present.
    pub fn default_manager(&self) -> &'static str {
        match self {
            ManifestKind::PackageJson => "npm",
            ManifestKind::CargoToml => "cargo",
            ManifestKind::PyProject => "pip",
        }
    }
}

/// A dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredDependency {
    /// Version requirement as written.
    pub version: Option<String>,
    /// Declared in a development-only section.
    pub dev: bool,
}

/// Parsed manifest of one directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Manifest file path.
    pub path: PathBuf,
    /// Format.
    pub kind: ManifestKind,
    /// Dependencies keyed by normalized package name.
    pub dependencies: BTreeMap<String, DeclaredDependency>,
    /// Lockfile found next to the manifest.
    pub lockfile: Option<String>,
    /// Package manager from the lockfile, else the format default.
    pub manager: String,
}

impl Manifest {
    /// Declaration of `package`, compared case-insensitively with `-`/`_`
    /// treated as equal.
    pub fn dependency(&self, package: &str) -> Option<&DeclaredDependency> {
        self.dependencies.get(&normalize_package_name(package))
    }
}

/// Lowercase, with `_` folded into `-`.
pub fn normalize_package_name(name: &str) -> String {
    name.trim().to_lowercase().replace('_', "-")
}

/// Reads the manifest declared in a directory.
pub trait ManifestReader: Send + Sync {
    /// Manifest of `dir`, or `None` when the directory has none.
    fn read_dir(&self, dir: &Path) -> Result<Option<Manifest>>;
}

/// [`ManifestReader`] over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsManifestReader;

impl ManifestReader for FsManifestReader {
    fn read_dir(&self, dir: &Path) -> Result<Option<Manifest>> {
        let Some(kind) = ManifestKind::ALL
            .into_iter()
            .find(|kind| dir.join(kind.file_name()).is_file())
        else {
            return Ok(None);
        };
        let path = dir.join(kind.file_name());
        let text = std::fs::read_to_string(&path).map_err(|e| WeaveError::Io {
            path: path.clone(),
            source: e,
        })?;

        let dependencies = match kind {
            ManifestKind::PackageJson => parse_package_json(&path, &text)?,
            ManifestKind::CargoToml => parse_cargo_toml(&path, &text)?,
            ManifestKind::PyProject => parse_pyproject(&path, &text)?,
        };

        let lockfile = LOCKFILES
            .iter()
            .find(|(name, _)| dir.join(name).is_file())
            .copied();
        let manager = lockfile
            .map(|(_, manager)| manager)
            .unwrap_or_else(|| kind.default_manager())
            .to_string();

        Ok(Some(Manifest {
            path,
            kind,
            dependencies,
            lockfile: lockfile.map(|(name, _)| name.to_string()),
            manager,
        }))
    }
}

fn manifest_error(path: &Path, message: impl ToString) -> WeaveError {
    WeaveError::Manifest {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn declare(deps: &mut BTreeMap<String, DeclaredDependency>, name: &str, version: Option<String>, dev: bool) {
    // A runtime declaration wins over a dev one.
    let key = normalize_package_name(name);
    match deps.get(&key) {
        Some(existing) if !existing.dev => {}
        _ => {
            deps.insert(key, DeclaredDependency { version, dev });
        }
    }
}

fn parse_package_json(path: &Path, text: &str) -> Result<BTreeMap<String, DeclaredDependency>> {
    let json: JsonValue = serde_json::from_str(text).map_err(|e| manifest_error(path, e))?;
    let mut deps = BTreeMap::new();
    for (section, dev) in [
        ("dependencies", false),
        ("peerDependencies", false),
        ("optionalDependencies", false),
        ("devDependencies", true),
    ] {
        if let Some(table) = json.get(section).and_then(|v| v.as_object()) {
            for (name, version) in table {
                declare(&mut deps, name, version.as_str().map(String::from), dev);
            }
        }
    }
    Ok(deps)
}

fn toml_version(value: &TomlValue) -> Option<String> {
    match value {
        TomlValue::String(version) => Some(version.clone()),
        TomlValue::Table(table) => table
            .get("version")
            .and_then(|v| v.as_str())
            .map(String::from),
        _ => None,
    }
}

fn toml_table<'a>(root: &'a TomlValue, path: &[&str]) -> Option<&'a toml::map::Map<String, TomlValue>> {
    let mut current = root;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_table()
}

fn parse_cargo_toml(path: &Path, text: &str) -> Result<BTreeMap<String, DeclaredDependency>> {
    let doc: TomlValue = toml::from_str(text).map_err(|e| manifest_error(path, e))?;
    let mut deps = BTreeMap::new();
    for (section, dev) in [
        ("dependencies", false),
        ("build-dependencies", false),
        ("dev-dependencies", true),
    ] {
        if let Some(table) = toml_table(&doc, &[section]) {
            for (name, value) in table {
                declare(&mut deps, name, toml_version(value), dev);
            }
        }
    }
    if let Some(table) = toml_table(&doc, &["workspace", "dependencies"]) {
        for (name, value) in table {
            declare(&mut deps, name, toml_version(value), false);
        }
    }
    Ok(deps)
}

/// Split a PEP 508 requirement into name and version specifier.
fn split_requirement(requirement: &str) -> Option<(String, Option<String>)> {
    let requirement = requirement.split(';').next()?.trim();
    let end = requirement
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
        .unwrap_or(requirement.len());
    let name = &requirement[..end];
    if name.is_empty() {
        return None;
    }
    let mut rest = requirement[end..].trim();
    if rest.starts_with('[') {
        rest = rest.find(']').map(|i| rest[i + 1..].trim()).unwrap_or("");
    }
    let version = (!rest.is_empty()).then(|| rest.trim_matches(|c| c == '(' || c == ')').to_string());
    Some((name.to_string(), version))
}

fn parse_pyproject(path: &Path, text: &str) -> Result<BTreeMap<String, DeclaredDependency>> {
    let doc: TomlValue = toml::from_str(text).map_err(|e| manifest_error(path, e))?;
    let mut deps = BTreeMap::new();

    if let Some(list) = doc
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array())
    {
        for requirement in list.iter().filter_map(|v| v.as_str()) {
            if let Some((name, version)) = split_requirement(requirement) {
                declare(&mut deps, &name, version, false);
            }
        }
    }

    for (section, dev) in [
        (&["tool", "poetry", "dependencies"][..], false),
        (&["tool", "poetry", "group", "dev", "dependencies"][..], true),
        (&["tool", "poetry", "dev-dependencies"][..], true),
    ] {
        if let Some(table) = toml_table(&doc, section) {
            for (name, value) in table.iter().filter(|(name, _)| name.as_str() != "python") {
                declare(&mut deps, name, toml_version(value), dev);
            }
        }
    }
    Ok(deps)
}

/// Per-directory manifest memo shared across a scan.
pub type ManifestCache = TtlLruCache<PathBuf, Option<Arc<Manifest>>>;

/// Resolves external package names to [`PackageInfo`] using the nearest
/// manifests above a file, never leaving the repository root.
pub struct PackageResolver<'a> {
    root: PathBuf,
    reader: &'a dyn ManifestReader,
    cache: &'a ManifestCache,
}

impl<'a> PackageResolver<'a> {
    /// Create a resolver for the repository at `root`.
    pub fn new(root: &Path, reader: &'a dyn ManifestReader, cache: &'a ManifestCache) -> Self {
        Self {
            root: root.to_path_buf(),
            reader,
            cache,
        }
    }

    fn manifest_in(&self, dir: &Path) -> Option<Arc<Manifest>> {
        self.cache.get_or_insert_with(dir.to_path_buf(), || {
            match self.reader.read_dir(dir) {
                Ok(manifest) => manifest.map(Arc::new),
                Err(e) => {
                    log::debug!("Manifest lookup in {} failed: {}", dir.display(), e);
                    None
                }
            }
        })
    }

    /// Metadata for `package` imported by the root-relative `file_path`.
    ///
    /// The manager comes from the nearest manifest; version and dev flag
    /// from the nearest manifest declaring the package.
    pub fn resolve(&self, file_path: &str, package: &str) -> PackageInfo {
        let mut info = PackageInfo::named(package);
        let file = self.root.join(file_path);
        let mut dir = file.parent().map(Path::to_path_buf);

        while let Some(current) = dir {
            if !current.starts_with(&self.root) {
                break;
            }
            if let Some(manifest) = self.manifest_in(&current) {
                if info.manager.is_none() {
                    info.manager = Some(manifest.manager.clone());
                }
                if let Some(declared) = manifest.dependency(package) {
                    info.version = declared.version.clone();
                    info.is_dev_dependency = declared.dev;
                    info.manager = Some(manifest.manager.clone());
                    return info;
                }
            }
            if current == self.root {
                break;
            }
            dir = current.parent().map(Path::to_path_buf);
        }
        info
    }
}
