//! JSON fixture loading

use crate::MemoryStore;
use serde::Deserialize;
use strata_domain::{KnowledgeEntity, PropertyMap, Relationship, StoreError};

#[derive(Deserialize)]
struct Fixture {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Deserialize)]
struct RawEntity {
    id: String,
    #[serde(flatten)]
    fields: PropertyMap,
}

/// Populate a store from a JSON document
///
/// ```json
/// { "entities": [ { "id": "e1", "layer": "SEMANTIC", "name": "Diabetes", "domain": "endocrinology" } ],
///   "relationships": [ { "source_id": "e1", "target_id": "e2", "relation_type": "treats", "confidence": 0.9 } ] }
/// ```
///
/// Every entity must name its layer. Returns the number of entities loaded.
pub async fn load_fixture(store: &MemoryStore, json: &str) -> Result<usize, StoreError> {
    let fixture: Fixture =
        serde_json::from_str(json).map_err(|e| StoreError::InvalidData(e.to_string()))?;

    let mut entities = Vec::with_capacity(fixture.entities.len());
    for raw in fixture.entities {
        let entity = KnowledgeEntity::from_map(raw.id, raw.fields)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        entities.push(entity);
    }

    let count = entities.len();
    for entity in entities {
        store.insert(entity).await;
    }
    for relationship in fixture.relationships {
        store.add_relationship(relationship).await;
    }
    Ok(count)
}
