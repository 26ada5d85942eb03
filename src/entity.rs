//! Raw entity records produced by extractors.
//!
//! A [`RawEntity`] lives for one pipeline run over one file.

use serde::{Deserialize, Serialize};

/// Kind of extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Import of a module or package.
    Import,
    /// Exported symbol.
    Export,
    /// Class, struct, enum or trait declaration.
    Class,
    /// Function or method declaration.
    Function,
    /// Call expression.
    Call,
    /// Variable binding.
    Variable,
    /// Reference to a named type.
    TypeReference,
}

impl EntityType {
    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Import => "import",
            EntityType::Export => "export",
            EntityType::Class => "class",
            EntityType::Function => "function",
            EntityType::Call => "call",
            EntityType::Variable => "variable",
            EntityType::TypeReference => "type_reference",
        }
    }
}

/// Lexical scope an entity was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityScope {
    /// Top level of the file.
    #[default]
    Module,
    /// Inside a class/impl body.
    Class,
    /// Inside a function body.
    Local,
}

/// Unfiltered candidate extracted from a file's syntax tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    /// Entity kind.
    pub entity_type: EntityType,
    /// Symbol or import name.
    pub name: String,
    /// Import source module, when applicable.
    pub source: Option<String>,
    /// Named specifiers of an import.
    pub specifiers: Vec<String>,
    /// Scope the entity was found in.
    pub scope: EntityScope,
    /// 1-based line.
    pub line: usize,
    /// Private by language convention.
    pub is_private: bool,
}

impl RawEntity {
    /// Module-scoped, public entity with no source or specifiers.
    pub fn new(entity_type: EntityType, name: impl Into<String>, line: usize) -> Self {
        Self {
            entity_type,
            name: name.into(),
            source: None,
            specifiers: Vec::new(),
            scope: EntityScope::Module,
            line,
            is_private: false,
        }
    }

    /// Import of `name` from `source`.
    pub fn import(name: impl Into<String>, source: impl Into<String>, line: usize) -> Self {
        let mut entity = Self::new(EntityType::Import, name, line);
        entity.source = Some(source.into());
        entity
    }

    /// Set the scope.
    pub fn with_scope(mut self, scope: EntityScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the named specifiers.
    pub fn with_specifiers(mut self, specifiers: Vec<String>) -> Self {
        self.specifiers = specifiers;
        self
    }

    /// Mark private.
    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }
}
