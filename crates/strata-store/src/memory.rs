//! In-memory entity store

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use strata_domain::traits::{EntityFilter, EntityStore, EntityVersioning, PromotionReceipt};
use strata_domain::{
    EntityId, EntityStatus, KnowledgeEntity, Layer, PropertyMap, Relationship, StoreError,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    entities: BTreeMap<EntityId, KnowledgeEntity>,
    relationships: Vec<Relationship>,
    failing_layers: HashSet<Layer>,
    fail_writes: bool,
    latency: Option<Duration>,
}

/// Entity store held entirely in memory
///
/// Cloning shares the underlying data. Besides the trait surface it offers
/// fault injection (failing layers, failing writes, artificial latency) so
/// callers can exercise their degraded paths.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity
    pub async fn insert(&self, entity: KnowledgeEntity) {
        self.inner.write().await.entities.insert(entity.id.clone(), entity);
    }

    /// Add a relationship
    pub async fn add_relationship(&self, relationship: Relationship) {
        self.inner.write().await.relationships.push(relationship);
    }

    /// Number of stored entities
    pub async fn len(&self) -> usize {
        self.inner.read().await.entities.len()
    }

    /// Whether the store holds no entities
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entities.is_empty()
    }

    /// Snapshot of one entity, bypassing fault injection
    pub async fn snapshot(&self, id: &EntityId) -> Option<KnowledgeEntity> {
        self.inner.read().await.entities.get(id).cloned()
    }

    /// Make `query_by_layer` fail for `layer`
    pub async fn fail_layer(&self, layer: Layer) {
        self.inner.write().await.failing_layers.insert(layer);
    }

    /// Make every write fail (or succeed again)
    pub async fn set_fail_writes(&self, fail: bool) {
        self.inner.write().await.fail_writes = fail;
    }

    /// Delay every trait call by `latency`
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.inner.write().await.latency = latency;
    }

    async fn simulate_latency(&self) {
        let latency = self.inner.read().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn check_writable(&self) -> Result<(), StoreError> {
        if self.inner.read().await.fail_writes {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

/// Merge `props` into `entity`, routing reserved keys to typed fields
fn apply_properties(entity: &mut KnowledgeEntity, props: PropertyMap) -> Result<(), StoreError> {
    for (key, value) in props {
        match key.as_str() {
            "layer" => {
                let raw = value.as_str().unwrap_or_default();
                entity.layer = Layer::parse(raw)
                    .ok_or_else(|| StoreError::InvalidData(format!("invalid layer '{}'", value)))?;
            }
            "confidence" => {
                let score = value
                    .as_f64()
                    .ok_or_else(|| StoreError::InvalidData(format!("invalid confidence '{}'", value)))?;
                entity.confidence = score.clamp(0.0, 1.0);
            }
            "name" => {
                if let Value::String(name) = value {
                    entity.name = name;
                }
            }
            "entity_type" => {
                if let Value::String(kind) = value {
                    entity.entity_type = kind;
                }
            }
            _ => {
                entity.properties.insert(key, value);
            }
        }
    }
    entity.updated_at = Utc::now();
    Ok(())
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get_entity(&self, id: &EntityId) -> Result<Option<KnowledgeEntity>, StoreError> {
        self.simulate_latency().await;
        Ok(self.inner.read().await.entities.get(id).cloned())
    }

    async fn query_by_layer(
        &self,
        layer: Layer,
        filter: &EntityFilter,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntity>, StoreError> {
        self.simulate_latency().await;
        let inner = self.inner.read().await;
        if inner.failing_layers.contains(&layer) {
            return Err(StoreError::Unavailable(format!("{} partition offline", layer)));
        }
        Ok(inner
            .entities
            .values()
            .filter(|e| e.layer == layer && e.status != EntityStatus::Deprecated)
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_relationships(&self, id: &EntityId) -> Result<Vec<Relationship>, StoreError> {
        self.simulate_latency().await;
        Ok(self
            .inner
            .read()
            .await
            .relationships
            .iter()
            .filter(|r| r.touches(id))
            .cloned()
            .collect())
    }

    async fn update_entity_properties(&self, id: &EntityId, props: PropertyMap) -> Result<bool, StoreError> {
        self.simulate_latency().await;
        self.check_writable().await?;
        let mut inner = self.inner.write().await;
        match inner.entities.get_mut(id) {
            Some(entity) => {
                apply_properties(entity, props)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn promote_entity(
        &self,
        id: &EntityId,
        target: Layer,
        props: PropertyMap,
    ) -> Result<PromotionReceipt, StoreError> {
        self.simulate_latency().await;
        self.check_writable().await?;
        let mut inner = self.inner.write().await;
        let entity = inner
            .entities
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let from_layer = entity.layer;
        apply_properties(entity, props)?;
        entity.layer = target;
        Ok(PromotionReceipt {
            entity_id: id.clone(),
            from_layer,
            to_layer: target,
            promoted_at: entity.updated_at,
        })
    }

    fn versioning(&self) -> Option<&dyn EntityVersioning> {
        Some(self)
    }
}

#[async_trait]
impl EntityVersioning for MemoryStore {
    async fn version_count(&self, root: &EntityId) -> Result<u32, StoreError> {
        let inner = self.inner.read().await;
        let count = inner
            .entities
            .keys()
            .filter(|id| *id != root && &id.root() == root)
            .count();
        Ok(count as u32)
    }

    async fn create_version(&self, previous: &EntityId, entity: KnowledgeEntity) -> Result<(), StoreError> {
        self.check_writable().await?;
        let mut inner = self.inner.write().await;
        let old = inner
            .entities
            .get_mut(previous)
            .ok_or_else(|| StoreError::NotFound(previous.to_string()))?;
        old.status = EntityStatus::Deprecated;
        old.properties
            .insert("superseded_by".to_string(), Value::from(entity.id.to_string()));
        old.updated_at = Utc::now();

        inner
            .relationships
            .push(Relationship::new(previous.clone(), entity.id.clone(), "superseded_by", 1.0));
        inner.entities.insert(entity.id.clone(), entity);
        Ok(())
    }
}
