//! Four-stage entity filter pipeline.
//!
//! Reduces a file's raw entities to a small set of high-confidence,
//! classified and linked entities:
//!
//! 1. [`relevance`]: drop noise, down-weight private members
//! 2. [`dedup`]: collapse repeated mentions
//! 3. [`normalize`]: classify internal / external / builtin
//! 4. [`enrich`]: final confidence, relationships, documentation
//!
//! No stage fails on empty or fully-filtered input. External lookups are
//! optional capabilities chosen when the pipeline is built.

pub mod dedup;
pub mod enrich;
pub mod normalize;
pub mod relevance;

use crate::chunk::DocumentationSource;
use crate::config::FilterConfig;
use crate::discovery::EntityDiscovery;
use crate::entity::RawEntity;
use crate::ingest::detect::detect_language;
use crate::manifest::{PackageInfo, PackageResolver};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// Why an entity was dropped or down-weighted in stage 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    /// Declared inside a function body.
    LocalScope,
    /// Type reference to a primitive or builtin type.
    PrimitiveType,
    /// Import of a stylesheet, image, font or media file.
    AssetImport,
    /// Private by language convention; kept with reduced relevance.
    PrivateMember,
}

/// Stage 1 survivor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredEntity {
    /// Extracted entity.
    #[serde(flatten)]
    pub entity: RawEntity,
    /// Relevance in `[0, 1]`.
    pub relevance_score: f64,
    /// Set when relevance was reduced.
    pub filter_reason: Option<FilterReason>,
}

/// Entity dropped in stage 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedEntity {
    /// Extracted entity.
    #[serde(flatten)]
    pub entity: RawEntity,
    /// Drop reason.
    pub reason: FilterReason,
}

/// Stage 2 output: one entry per `(type, name, source)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeduplicatedEntity {
    /// Merged entity; specifiers hold the sorted union.
    #[serde(flatten)]
    pub entity: FilteredEntity,
    /// Raw mentions merged into this entry. At least 1.
    pub occurrences: usize,
    /// Line of every merged mention.
    pub merged_from: Vec<usize>,
}

/// Origin class of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Defined in this repository.
    Internal,
    /// Third-party package.
    External,
    /// Platform or standard library module.
    Builtin,
}

/// Stage 3 output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEntity {
    /// Deduplicated entity.
    #[serde(flatten)]
    pub entity: DeduplicatedEntity,
    /// Resolved path for internal imports, package name for external and
    /// builtin imports, otherwise the entity name.
    pub normalized_name: String,
    /// Origin class.
    pub category: Category,
    /// Set for external imports.
    pub package_info: Option<PackageInfo>,
}

/// Relationship kind; doubles as the edge type written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Import of a module or package.
    Imports,
    /// Export of the entity itself.
    Exports,
    /// Call by name.
    Calls,
    /// Same symbol already present in another file.
    References,
}

impl RelationKind {
    /// Edge type string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Imports => crate::graph::schema::EDGE_IMPORTS,
            RelationKind::Exports => crate::graph::schema::EDGE_EXPORTS,
            RelationKind::Calls => crate::graph::schema::EDGE_CALLS,
            RelationKind::References => crate::graph::schema::EDGE_REFERENCES,
        }
    }
}

/// Inferred outgoing relationship of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    /// Normalized target name, or a node id for references.
    pub target: String,
    /// Relationship kind.
    pub kind: RelationKind,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Stage 4 output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedEntity {
    /// Normalized entity.
    #[serde(flatten)]
    pub entity: NormalizedEntity,
    /// Final confidence in `[0, 1]`.
    pub confidence: f64,
    /// Inferred relationships.
    pub relationships: Vec<Relationship>,
    /// Inline documentation for the symbol.
    pub documentation: Option<String>,
}

impl FilteredEntity {
    /// Underlying raw entity.
    pub fn raw(&self) -> &RawEntity {
        &self.entity
    }
}

impl DeduplicatedEntity {
    /// Underlying raw entity.
    pub fn raw(&self) -> &RawEntity {
        self.entity.raw()
    }
}

impl NormalizedEntity {
    /// Underlying raw entity.
    pub fn raw(&self) -> &RawEntity {
        self.entity.raw()
    }
}

impl EnrichedEntity {
    /// Underlying raw entity.
    pub fn raw(&self) -> &RawEntity {
        self.entity.raw()
    }

    /// Origin class.
    pub fn category(&self) -> Category {
        self.entity.category
    }
}

/// Entity counts after each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    /// Raw input.
    pub raw: usize,
    /// Stage 1 survivors.
    pub filtered: usize,
    /// Stage 1 drops.
    pub rejected: usize,
    /// Stage 2 output.
    pub deduplicated: usize,
    /// Stage 3 output.
    pub normalized: usize,
    /// Stage 4 output.
    pub enriched: usize,
}

impl StageCounts {
    /// Enriched over raw; 0 for empty input.
    pub fn compression_ratio(&self) -> f64 {
        if self.raw == 0 {
            0.0
        } else {
            self.enriched as f64 / self.raw as f64
        }
    }
}

/// Full lineage of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineResult {
    /// Raw input.
    pub raw: Vec<RawEntity>,
    /// Stage 1 survivors.
    pub filtered: Vec<FilteredEntity>,
    /// Stage 1 drops with reasons.
    pub rejected: Vec<RejectedEntity>,
    /// Stage 2 output.
    pub deduplicated: Vec<DeduplicatedEntity>,
    /// Stage 3 output.
    pub normalized: Vec<NormalizedEntity>,
    /// Stage 4 output.
    pub enriched: Vec<EnrichedEntity>,
    /// Counts per stage.
    pub stats: StageCounts,
    /// Wall time of the run.
    pub elapsed_ms: u128,
}

/// Runs the four stages for one file.
///
/// ```
/// # use codeweave::config::FilterConfig;
/// # use codeweave::entity::RawEntity;
/// # use codeweave::filter::{Category, EntityPipeline};
/// let config = FilterConfig::default();
/// let result = EntityPipeline::new(&config)
///     .run("src/app.ts", vec![RawEntity::import("Router", "express", 1)]);
/// assert_eq!(result.enriched[0].category(), Category::External);
/// ```
pub struct EntityPipeline<'a> {
    config: &'a FilterConfig,
    resolver: Option<&'a PackageResolver<'a>>,
    discovery: Option<&'a dyn EntityDiscovery>,
    documentation: Option<&'a dyn DocumentationSource>,
}

impl<'a> EntityPipeline<'a> {
    /// Pipeline with no external lookups.
    pub fn new(config: &'a FilterConfig) -> Self {
        Self {
            config,
            resolver: None,
            discovery: None,
            documentation: None,
        }
    }

    /// Resolve external package metadata through `resolver`.
    pub fn with_resolver(mut self, resolver: &'a PackageResolver<'a>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Link entities to nodes already written by other files.
    pub fn with_discovery(mut self, discovery: &'a dyn EntityDiscovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Attach inline documentation.
    pub fn with_documentation(mut self, documentation: &'a dyn DocumentationSource) -> Self {
        self.documentation = Some(documentation);
        self
    }

    /// Run all stages over the entities of the root-relative `file_path`.
    pub fn run(&self, file_path: &str, raw: Vec<RawEntity>) -> PipelineResult {
        let started = Instant::now();
        let language = detect_language(Path::new(file_path));

        let (filtered, rejected) = relevance::apply(self.config, &raw);
        let deduplicated = dedup::apply(&filtered);
        let normalized = normalize::apply(file_path, language, &deduplicated, self.resolver);
        let enriched = enrich::apply(file_path, &normalized, self.discovery, self.documentation);

        let stats = StageCounts {
            raw: raw.len(),
            filtered: filtered.len(),
            rejected: rejected.len(),
            deduplicated: deduplicated.len(),
            normalized: normalized.len(),
            enriched: enriched.len(),
        };
        log::debug!(
            "{}: {} raw -> {} enriched ({} rejected)",
            file_path,
            stats.raw,
            stats.enriched,
            stats.rejected
        );

        PipelineResult {
            raw,
            filtered,
            rejected,
            deduplicated,
            normalized,
            enriched,
            stats,
            elapsed_ms: started.elapsed().as_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityScope, EntityType};

    #[test]
    fn test_empty_input_gives_empty_output() {
        let config = FilterConfig::default();
        let result = EntityPipeline::new(&config).run("a.ts", Vec::new());
        assert_eq!(result.stats, StageCounts::default());
        assert!(result.enriched.is_empty());
        assert_eq!(result.stats.compression_ratio(), 0.0);
    }

    #[test]
    fn test_fully_filtered_input() {
        let config = FilterConfig::default();
        let raw = vec![
            RawEntity::new(EntityType::Variable, "tmp", 3).with_scope(EntityScope::Local),
            RawEntity::new(EntityType::TypeReference, "string", 4),
        ];
        let result = EntityPipeline::new(&config).run("a.ts", raw);
        assert_eq!(result.stats.raw, 2);
        assert_eq!(result.stats.rejected, 2);
        assert!(result.deduplicated.is_empty());
        assert!(result.enriched.is_empty());
    }

    #[test]
    fn test_result_serializes_with_flattened_lineage() {
        let config = FilterConfig::default();
        let result = EntityPipeline::new(&config).run("a.py", vec![RawEntity::import("os", "os", 1)]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["enriched"][0]["name"], "os");
        assert_eq!(json["enriched"][0]["category"], "builtin");
        assert_eq!(json["stats"]["enriched"], 1);
    }
}
