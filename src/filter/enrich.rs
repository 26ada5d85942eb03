//! Stage 4: confidence, relationships and documentation.

use super::{EnrichedEntity, NormalizedEntity, RelationKind, Relationship};
use crate::chunk::DocumentationSource;
use crate::discovery::EntityDiscovery;
use crate::entity::EntityType;

// Boost constants are provisional and due for recalibration against
// labelled data.

/// Confidence multiplier for exported entities.
pub const EXPORT_BOOST: f64 = 1.2;

/// Weight of `log10(occurrences)` in the corroboration boost.
pub const OCCURRENCE_BOOST_WEIGHT: f64 = 0.1;

/// Confidence multiplier for call edges matched by name only.
pub const CALL_CONFIDENCE_FACTOR: f64 = 0.8;

/// Fixed confidence of a cross-file reference edge.
pub const REFERENCE_CONFIDENCE: f64 = 0.85;

/// Final confidence from relevance, export status and occurrences.
pub fn confidence_for(entity: &NormalizedEntity) -> f64 {
    let mut confidence = entity.entity.entity.relevance_score;
    if entity.raw().entity_type == EntityType::Export {
        confidence = (confidence * EXPORT_BOOST).min(1.0);
    }
    let occurrences = entity.entity.occurrences;
    if occurrences > 1 {
        let boost = 1.0 + (occurrences as f64).log10() * OCCURRENCE_BOOST_WEIGHT;
        confidence = (confidence * boost).min(1.0);
    }
    confidence.clamp(0.0, 1.0)
}

fn inferred_relationship(entity: &NormalizedEntity, confidence: f64) -> Option<Relationship> {
    let raw = entity.raw();
    let (target, kind, confidence) = match raw.entity_type {
        EntityType::Import => (entity.normalized_name.clone(), RelationKind::Imports, confidence),
        EntityType::Export => (raw.name.clone(), RelationKind::Exports, confidence),
        EntityType::Call => (
            raw.name.clone(),
            RelationKind::Calls,
            confidence * CALL_CONFIDENCE_FACTOR,
        ),
        _ => return None,
    };
    Some(Relationship {
        target,
        kind,
        confidence,
    })
}

/// Enrich every entity of `file_path`.
///
/// Discovery failures are logged and treated as "not found".
pub fn apply(
    file_path: &str,
    entities: &[NormalizedEntity],
    discovery: Option<&dyn EntityDiscovery>,
    documentation: Option<&dyn DocumentationSource>,
) -> Vec<EnrichedEntity> {
    entities
        .iter()
        .map(|entity| {
            let raw = entity.raw();
            let confidence = confidence_for(entity);
            let mut relationships: Vec<Relationship> =
                inferred_relationship(entity, confidence).into_iter().collect();

            if let Some(discovery) = discovery {
                match discovery.find_existing(&raw.name, raw.entity_type, file_path) {
                    Ok(Some(target)) => relationships.push(Relationship {
                        target,
                        kind: RelationKind::References,
                        confidence: REFERENCE_CONFIDENCE,
                    }),
                    Ok(None) => {}
                    Err(e) => log::debug!("Discovery for {} in {} failed: {}", raw.name, file_path, e),
                }
            }

            EnrichedEntity {
                entity: entity.clone(),
                confidence,
                relationships,
                documentation: documentation.and_then(|docs| docs.documentation_for(&raw.name)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::RawEntity;
    use crate::error::{Result, WeaveError};
    use crate::filter::{Category, DeduplicatedEntity, FilteredEntity};

    fn normalized(entity: RawEntity, relevance_score: f64, occurrences: usize) -> NormalizedEntity {
        let name = entity.name.clone();
        NormalizedEntity {
            entity: DeduplicatedEntity {
                merged_from: vec![entity.line; occurrences],
                entity: FilteredEntity {
                    entity,
                    relevance_score,
                    filter_reason: None,
                },
                occurrences,
            },
            normalized_name: name,
            category: Category::Internal,
            package_info: None,
        }
    }

    struct Failing;

    impl EntityDiscovery for Failing {
        fn find_existing(&self, _: &str, _: EntityType, _: &str) -> Result<Option<String>> {
            Err(WeaveError::Other("store offline".into()))
        }
    }

    struct Fixed;

    impl EntityDiscovery for Fixed {
        fn find_existing(&self, name: &str, _: EntityType, _: &str) -> Result<Option<String>> {
            Ok((name == "User").then(|| "entity:b.ts#class:User".to_string()))
        }
    }

    struct Docs;

    impl DocumentationSource for Docs {
        fn documentation_for(&self, name: &str) -> Option<String> {
            (name == "User").then(|| "A user.".to_string())
        }
    }

    #[test]
    fn test_boosts_are_capped() {
        let export = normalized(RawEntity::new(EntityType::Export, "api", 1), 0.9, 1);
        assert_eq!(confidence_for(&export), 1.0);

        let repeated = normalized(RawEntity::new(EntityType::Function, "f", 1), 0.3, 10);
        assert!((confidence_for(&repeated) - 0.33).abs() < 1e-9);

        let saturated = normalized(RawEntity::new(EntityType::Export, "g", 1), 1.0, 1000);
        assert_eq!(confidence_for(&saturated), 1.0);
    }

    #[test]
    fn test_relationship_per_kind() {
        let call = normalized(RawEntity::new(EntityType::Call, "save", 3), 1.0, 1);
        let class = normalized(RawEntity::new(EntityType::Class, "Repo", 1), 1.0, 1);
        let out = apply("a.ts", &[call, class], None, None);

        assert_eq!(out[0].relationships.len(), 1);
        assert_eq!(out[0].relationships[0].kind, RelationKind::Calls);
        assert!((out[0].relationships[0].confidence - 0.8).abs() < 1e-9);
        assert!(out[1].relationships.is_empty());
    }

    #[test]
    fn test_discovery_and_documentation() {
        let user = normalized(RawEntity::new(EntityType::Class, "User", 1), 1.0, 1);
        let out = apply("a.ts", &[user], Some(&Fixed), Some(&Docs));
        assert_eq!(out[0].relationships[0].kind, RelationKind::References);
        assert_eq!(out[0].relationships[0].confidence, REFERENCE_CONFIDENCE);
        assert_eq!(out[0].documentation.as_deref(), Some("A user."));
    }

    #[test]
    fn test_discovery_failure_is_not_found() {
        let user = normalized(RawEntity::new(EntityType::Class, "User", 1), 1.0, 1);
        let out = apply("a.ts", &[user], Some(&Failing), None);
        assert_eq!(out.len(), 1);
        assert!(out[0].relationships.is_empty());
    }
}
