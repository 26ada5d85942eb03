//! Entity pipeline tests.
//!
//! Drives the four filter stages end to end over hand-built raw entities
//! and over entities extracted from real source text.

use codeweave::config::FilterConfig;
use codeweave::entity::{EntityScope, EntityType, RawEntity};
use codeweave::filter::{Category, EntityPipeline, FilterReason, RelationKind};
use codeweave::ingest::{EntityExtractor, TreeSitterExtractor};
use std::path::Path;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_and_local_entities_are_dropped() {
        let config = FilterConfig::default();
        let raw = vec![
            RawEntity::import("Router", "express", 1),
            RawEntity::import("styles.css", "./styles.css", 2),
            RawEntity::new(EntityType::Variable, "temp", 5).with_scope(EntityScope::Local),
        ];

        let result = EntityPipeline::new(&config).run("src/app.ts", raw);

        assert_eq!(result.stats.raw, 3);
        assert_eq!(result.stats.rejected, 2);
        let reasons: Vec<FilterReason> = result.rejected.iter().map(|r| r.reason).collect();
        assert!(reasons.contains(&FilterReason::AssetImport));
        assert!(reasons.contains(&FilterReason::LocalScope));

        assert_eq!(result.enriched.len(), 1);
        let router = &result.enriched[0];
        assert_eq!(router.category(), Category::External);
        assert_eq!(router.confidence, 1.0);
        let imports: Vec<_> = router
            .relationships
            .iter()
            .filter(|r| r.kind == RelationKind::Imports)
            .collect();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].target, "express");
    }

    #[test]
    fn test_repeated_imports_collapse() {
        let config = FilterConfig::default();
        let raw = vec![
            RawEntity::import("express", "express", 1),
            RawEntity::import("express", "express", 12),
        ];

        let result = EntityPipeline::new(&config).run("server.js", raw);

        assert_eq!(result.deduplicated.len(), 1);
        assert_eq!(result.deduplicated[0].occurrences, 2);
        assert_eq!(result.deduplicated[0].merged_from.len(), 2);
    }

    #[test]
    fn test_stage_counts_never_grow_and_scores_stay_bounded() {
        let source = r#"
import { Router } from 'express';
import { Router as R2 } from 'express';
import fs from 'fs';
import './theme.scss';
import { helper } from './util';

export function handler(req: string): number {
    const local = helper(req);
    return local;
}

export class Service {
    private cache: Map<string, number>;
    run() { handler("x"); handler("y"); }
}
"#;
        let raw = TreeSitterExtractor
            .extract(Path::new("src/routes.ts"), source)
            .expect("Failed to extract");
        assert!(!raw.is_empty());

        let config = FilterConfig::default();
        let result = EntityPipeline::new(&config).run("src/routes.ts", raw);
        let stats = result.stats;

        assert!(stats.enriched <= stats.deduplicated);
        assert!(stats.deduplicated <= stats.filtered);
        assert!(stats.filtered <= stats.raw);
        assert_eq!(stats.filtered + stats.rejected, stats.raw);
        assert!(stats.compression_ratio() <= 1.0);

        for entity in &result.filtered {
            assert!((0.0..=1.0).contains(&entity.relevance_score));
        }
        for entity in &result.enriched {
            assert!((0.0..=1.0).contains(&entity.confidence), "{:?}", entity);
            for relationship in &entity.relationships {
                assert!((0.0..=1.0).contains(&relationship.confidence));
            }
        }

        let fs = result
            .enriched
            .iter()
            .find(|e| e.raw().entity_type == EntityType::Import && e.entity.normalized_name == "fs")
            .expect("fs import kept");
        assert_eq!(fs.category(), Category::Builtin);

        let util = result
            .enriched
            .iter()
            .find(|e| e.raw().source.as_deref() == Some("./util"))
            .expect("relative import kept");
        assert_eq!(util.category(), Category::Internal);
        assert_eq!(util.entity.normalized_name, "src/util");
    }

    #[test]
    fn test_empty_input_is_not_an_error() {
        let config = FilterConfig::default();
        let result = EntityPipeline::new(&config).run("empty.py", Vec::new());

        assert!(result.enriched.is_empty());
        assert_eq!(result.stats.compression_ratio(), 0.0);
    }
}
