//! Stage 2: deduplication by `(type, name, source)`.

use super::{DeduplicatedEntity, FilteredEntity};
use crate::entity::EntityType;
use std::collections::{BTreeSet, HashMap};

type GroupKey = (EntityType, String, Option<String>);

/// Collapse repeated mentions, keeping first-appearance order.
pub fn apply(filtered: &[FilteredEntity]) -> Vec<DeduplicatedEntity> {
    let mut groups: Vec<DeduplicatedEntity> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for entity in filtered {
        let raw = entity.raw();
        let key = (raw.entity_type, raw.name.clone(), raw.source.clone());
        match index.get(&key) {
            Some(&slot) => {
                let group = &mut groups[slot];
                group.occurrences += 1;
                group.merged_from.push(raw.line);
                if entity.relevance_score > group.entity.relevance_score {
                    group.entity.relevance_score = entity.relevance_score;
                    group.entity.filter_reason = entity.filter_reason;
                }
                if raw.entity_type == EntityType::Import && !raw.specifiers.is_empty() {
                    let union: BTreeSet<String> = group
                        .entity
                        .entity
                        .specifiers
                        .drain(..)
                        .chain(raw.specifiers.iter().cloned())
                        .collect();
                    group.entity.entity.specifiers = union.into_iter().collect();
                }
            }
            None => {
                let mut first = entity.clone();
                if raw.entity_type == EntityType::Import {
                    let sorted: BTreeSet<String> = first.entity.specifiers.drain(..).collect();
                    first.entity.specifiers = sorted.into_iter().collect();
                }
                index.insert(key, groups.len());
                groups.push(DeduplicatedEntity {
                    entity: first,
                    occurrences: 1,
                    merged_from: vec![raw.line],
                });
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::RawEntity;

    fn kept(entity: RawEntity, relevance_score: f64) -> FilteredEntity {
        FilteredEntity {
            entity,
            relevance_score,
            filter_reason: None,
        }
    }

    #[test]
    fn test_identical_imports_collapse() {
        let input = vec![
            kept(RawEntity::import("react", "react", 1), 1.0),
            kept(RawEntity::import("react", "react", 9), 1.0),
        ];
        let out = apply(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].occurrences, 2);
        assert_eq!(out[0].merged_from, vec![1, 9]);
    }

    #[test]
    fn test_specifiers_union_sorted_and_max_relevance() {
        let input = vec![
            kept(
                RawEntity::import("lodash", "lodash", 1).with_specifiers(vec!["map".into(), "filter".into()]),
                0.3,
            ),
            kept(
                RawEntity::import("lodash", "lodash", 2).with_specifiers(vec!["reduce".into(), "map".into()]),
                0.9,
            ),
        ];
        let out = apply(&input);
        assert_eq!(out[0].raw().specifiers, vec!["filter", "map", "reduce"]);
        assert!((out[0].entity.relevance_score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_distinct_sources_stay_separate_in_order() {
        let input = vec![
            kept(RawEntity::import("x", "./a", 1), 1.0),
            kept(RawEntity::new(EntityType::Function, "run", 2), 1.0),
            kept(RawEntity::import("x", "./b", 3), 1.0),
            kept(RawEntity::import("x", "./a", 4), 1.0),
        ];
        let out = apply(&input);
        let sources: Vec<Option<&str>> = out.iter().map(|e| e.raw().source.as_deref()).collect();
        assert_eq!(sources, vec![Some("./a"), None, Some("./b")]);
        assert_eq!(out[0].occurrences, 2);
    }
}
