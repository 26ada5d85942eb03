//! Stage 1: relevance filtering.

use super::{FilterReason, FilteredEntity, RejectedEntity};
use crate::config::FilterConfig;
use crate::entity::{EntityScope, EntityType, RawEntity};

/// Relevance of an entity before any down-weighting.
pub const BASE_RELEVANCE: f64 = 1.0;

/// Type names never worth a node.
pub const PRIMITIVE_TYPES: &[&str] = &[
    // TypeScript
    "string", "number", "boolean", "any", "unknown", "void", "never", "null", "undefined",
    "object", "symbol", "bigint", "Array", "Promise", "Record", "Partial", "Readonly",
    // Python
    "int", "float", "str", "bool", "bytes", "None", "list", "dict", "tuple", "set", "Any",
    "Optional", "List", "Dict",
    // Rust
    "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128", "usize",
    "f32", "f64", "char", "String", "Self", "Option", "Result", "Vec", "Box",
];

/// Extensions of imported files that are not code.
pub const ASSET_EXTENSIONS: &[&str] = &[
    "css", "scss", "sass", "less", "styl", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico",
    "bmp", "avif", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "wav", "ogg", "webm",
];

/// Whether an import specifier points at a non-code asset.
pub fn is_asset_path(specifier: &str) -> bool {
    let path = specifier.split(['?', '#']).next().unwrap_or(specifier);
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        _ => false,
    }
}

fn drop_reason(config: &FilterConfig, entity: &RawEntity) -> Option<FilterReason> {
    if config.drop_local_scope && entity.scope == EntityScope::Local {
        return Some(FilterReason::LocalScope);
    }
    if config.drop_primitive_types
        && entity.entity_type == EntityType::TypeReference
        && PRIMITIVE_TYPES.contains(&entity.name.as_str())
    {
        return Some(FilterReason::PrimitiveType);
    }
    if config.drop_asset_imports && entity.entity_type == EntityType::Import {
        let specifier = entity.source.as_deref().unwrap_or(&entity.name);
        if is_asset_path(specifier) {
            return Some(FilterReason::AssetImport);
        }
    }
    None
}

/// Split `raw` into survivors and rejects, preserving input order.
pub fn apply(config: &FilterConfig, raw: &[RawEntity]) -> (Vec<FilteredEntity>, Vec<RejectedEntity>) {
    let mut kept = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();

    for entity in raw {
        if let Some(reason) = drop_reason(config, entity) {
            rejected.push(RejectedEntity {
                entity: entity.clone(),
                reason,
            });
            continue;
        }

        let (relevance_score, filter_reason) = if config.downweight_private && entity.is_private {
            (BASE_RELEVANCE * config.private_weight, Some(FilterReason::PrivateMember))
        } else {
            (BASE_RELEVANCE, None)
        };
        kept.push(FilteredEntity {
            entity: entity.clone(),
            relevance_score: relevance_score.clamp(0.0, 1.0),
            filter_reason,
        });
    }

    (kept, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_detection() {
        assert!(is_asset_path("./styles.css"));
        assert!(is_asset_path("../img/logo.SVG?url"));
        assert!(!is_asset_path("express"));
        assert!(!is_asset_path("./config.json"));
        assert!(!is_asset_path(".css"));
    }

    #[test]
    fn test_private_members_are_downweighted_not_dropped() {
        let config = FilterConfig::default();
        let raw = vec![RawEntity::new(EntityType::Function, "_helper", 2).private(true)];
        let (kept, rejected) = apply(&config, &raw);
        assert!(rejected.is_empty());
        assert!((kept[0].relevance_score - 0.3).abs() < 1e-9);
        assert_eq!(kept[0].filter_reason, Some(FilterReason::PrivateMember));
    }

    #[test]
    fn test_switches_disable_rules() {
        let config = FilterConfig {
            drop_local_scope: false,
            drop_primitive_types: false,
            drop_asset_imports: false,
            downweight_private: false,
            private_weight: 0.3,
        };
        let raw = vec![
            RawEntity::new(EntityType::Variable, "x", 1).with_scope(EntityScope::Local),
            RawEntity::new(EntityType::TypeReference, "string", 2),
            RawEntity::import("styles.css", "./styles.css", 3),
            RawEntity::new(EntityType::Function, "_f", 4).private(true),
        ];
        let (kept, rejected) = apply(&config, &raw);
        assert_eq!(kept.len(), 4);
        assert!(rejected.is_empty());
        assert!(kept.iter().all(|e| e.relevance_score == 1.0));
    }

    #[test]
    fn test_rejects_carry_reasons() {
        let config = FilterConfig::default();
        let raw = vec![
            RawEntity::new(EntityType::Variable, "x", 1).with_scope(EntityScope::Local),
            RawEntity::new(EntityType::TypeReference, "usize", 2),
            RawEntity::import("logo.png", "./logo.png", 3),
            RawEntity::new(EntityType::TypeReference, "GraphStore", 4),
        ];
        let (kept, rejected) = apply(&config, &raw);
        let reasons: Vec<FilterReason> = rejected.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![FilterReason::LocalScope, FilterReason::PrimitiveType, FilterReason::AssetImport]
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].entity.name, "GraphStore");
    }
}
