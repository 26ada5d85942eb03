//! Lookup of entities already written by other files.

use crate::entity::EntityType;
use crate::error::Result;
use crate::graph::GraphStore;
use parking_lot::Mutex;

/// Finds an existing graph node for an entity owned by another file.
pub trait EntityDiscovery: Send + Sync {
    /// Id of a node with the same `(name, type)` whose file is not
    /// `requesting_file`.
    fn find_existing(&self, name: &str, entity_type: EntityType, requesting_file: &str) -> Result<Option<String>>;
}

/// [`EntityDiscovery`] backed by a shared [`GraphStore`].
///
/// Each lookup holds the store lock only for the duration of one query.
pub struct StoreDiscovery<'a> {
    store: &'a Mutex<Box<dyn GraphStore>>,
}

impl<'a> StoreDiscovery<'a> {
    /// Discover entities in `store`.
    pub fn new(store: &'a Mutex<Box<dyn GraphStore>>) -> Self {
        Self { store }
    }
}

impl EntityDiscovery for StoreDiscovery<'_> {
    fn find_existing(&self, name: &str, entity_type: EntityType, requesting_file: &str) -> Result<Option<String>> {
        let candidates = self.store.lock().find_entities(name, entity_type.as_str())?;
        Ok(candidates
            .into_iter()
            .find(|node| node.file_path() != Some(requesting_file))
            .map(|node| node.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{schema, GraphNode, MemoryGraphStore, NodeKind};
    use serde_json::json;

    fn entity(path: &str, name: &str) -> GraphNode {
        GraphNode::new(
            schema::entity_id(path, "class", name, None),
            NodeKind::Entity,
            name,
        )
        .with_properties(json!({"file_path": path, "name": name, "entity_type": "class"}))
    }

    #[test]
    fn test_skips_entities_of_requesting_file() {
        let mut store = MemoryGraphStore::new();
        store.initialize().unwrap();
        store
            .upsert_nodes(&[entity("a.ts", "User"), entity("b.ts", "User")])
            .unwrap();
        let store: Mutex<Box<dyn GraphStore>> = Mutex::new(Box::new(store));
        let discovery = StoreDiscovery::new(&store);

        let found = discovery.find_existing("User", EntityType::Class, "a.ts").unwrap();
        assert_eq!(found, Some(schema::entity_id("b.ts", "class", "User", None)));

        let none = discovery.find_existing("Order", EntityType::Class, "a.ts").unwrap();
        assert!(none.is_none());
    }
}
