//! Knowledge entities and their typed per-layer properties

use crate::{DomainError, Layer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Loosely-typed property bag as exchanged with the entity store
pub type PropertyMap = BTreeMap<String, Value>;

/// Identifier of a knowledge entity
///
/// Versioned copies append `_v<n>` to the original id; [`EntityId::root`]
/// strips that suffix to recover the logical entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id of the `n`th versioned copy of this entity's root
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_domain::EntityId;
    ///
    /// let id = EntityId::new("drug-42");
    /// assert_eq!(id.versioned(2).as_str(), "drug-42_v2");
    /// assert_eq!(id.versioned(2).versioned(3).as_str(), "drug-42_v3");
    /// ```
    pub fn versioned(&self, n: u32) -> Self {
        Self(format!("{}_v{}", self.root().as_str(), n))
    }

    /// The logical entity this id belongs to, with any `_v<n>` suffix removed
    pub fn root(&self) -> EntityId {
        if let Some(pos) = self.0.rfind("_v") {
            let suffix = &self.0[pos + 2..];
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
                return Self(self.0[..pos].to_string());
            }
        }
        self.clone()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle status of an entity within its layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// In normal use
    #[default]
    Active,
    /// Waiting for a human decision
    PendingReview,
    /// Superseded by a newer version
    Deprecated,
}

/// A knowledge entity as held by the external store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntity {
    /// Unique identifier
    pub id: EntityId,
    /// Display name
    pub name: String,
    /// Free-form type tag (drug, disease, symptom, ...)
    pub entity_type: String,
    /// Current maturity layer
    pub layer: Layer,
    /// Belief score in [0, 1]
    pub confidence: f64,
    /// Lifecycle status
    #[serde(default)]
    pub status: EntityStatus,
    /// Everything else
    #[serde(default)]
    pub properties: PropertyMap,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntity {
    /// Create an active entity
    pub fn new(
        id: impl Into<EntityId>,
        name: impl Into<String>,
        entity_type: impl Into<String>,
        layer: Layer,
        confidence: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            layer,
            confidence: crate::confidence::clamp_score(confidence),
            status: EntityStatus::Active,
            properties: PropertyMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Decode an entity from a flat property map
    ///
    /// `layer` is mandatory; `name`, `entity_type` and `confidence` fall
    /// back to empty/0.5. All other keys land in `properties`.
    pub fn from_map(id: impl Into<EntityId>, mut map: PropertyMap) -> Result<Self, DomainError> {
        let id = id.into();
        let layer = match map.remove("layer") {
            None | Some(Value::Null) => return Err(DomainError::MissingLayer(id.to_string())),
            Some(Value::String(s)) => Layer::parse(&s).ok_or(DomainError::InvalidLayer {
                id: id.to_string(),
                value: s,
            })?,
            Some(other) => {
                return Err(DomainError::InvalidLayer {
                    id: id.to_string(),
                    value: other.to_string(),
                })
            }
        };
        let name = take_string(&mut map, "name").unwrap_or_default();
        let entity_type = take_string(&mut map, "entity_type").unwrap_or_default();
        let confidence = map
            .remove("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.5);

        let mut entity = Self::new(id, name, entity_type, layer, confidence);
        entity.properties = map;
        Ok(entity)
    }

    /// Flatten into the map shape used for transition payloads
    pub fn to_map(&self) -> PropertyMap {
        let mut map = self.properties.clone();
        map.insert("name".into(), Value::from(self.name.clone()));
        map.insert("entity_type".into(), Value::from(self.entity_type.clone()));
        map.insert("layer".into(), Value::from(self.layer.as_str()));
        map.insert("confidence".into(), Value::from(self.confidence));
        map
    }

    /// Read a numeric property, accepting integers or floats
    pub fn number(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(Value::as_f64)
    }

    /// Read a string property, ignoring blanks
    pub fn text(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

fn take_string(map: &mut PropertyMap, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Keys accepted as a Perception source identifier
pub const SOURCE_KEYS: [&str; 4] = ["source", "origin", "source_id", "document_id"];

/// Typed view of the properties a layer requires
///
/// Fields not required by the layer are kept in `extra`.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerProperties {
    /// Perception needs to know where a fact came from
    Perception {
        /// Source or origin identifier
        source: String,
        /// Remaining properties
        extra: PropertyMap,
    },
    /// Semantic needs a domain
    Semantic {
        /// Knowledge domain
        domain: String,
        /// Optional description
        description: Option<String>,
        /// Remaining properties
        extra: PropertyMap,
    },
    /// Reasoning needs a justified score
    Reasoning {
        /// Score in [0, 1]
        confidence: f64,
        /// Justification text
        reasoning: String,
        /// Remaining properties
        extra: PropertyMap,
    },
    /// Application needs to know where it is used
    Application {
        /// Usage context
        usage_context: String,
        /// Remaining properties
        extra: PropertyMap,
    },
}

impl LayerProperties {
    /// Parse the requirements of `layer` out of a property map
    ///
    /// On failure returns one message per missing or ill-formed field, each
    /// naming the field.
    pub fn parse(layer: Layer, map: &PropertyMap) -> Result<Self, Vec<String>> {
        let mut extra = map.clone();
        let mut errors = Vec::new();

        let result = match layer {
            Layer::Perception => {
                let found = SOURCE_KEYS
                    .iter()
                    .find_map(|k| non_blank(map, k).map(|v| (*k, v)));
                match found {
                    Some((key, source)) => {
                        extra.remove(key);
                        Some(LayerProperties::Perception { source, extra })
                    }
                    None => {
                        errors.push("missing required field: source".to_string());
                        None
                    }
                }
            }
            Layer::Semantic => match non_blank(map, "domain") {
                Some(domain) => {
                    extra.remove("domain");
                    let description = non_blank(map, "description");
                    extra.remove("description");
                    Some(LayerProperties::Semantic {
                        domain,
                        description,
                        extra,
                    })
                }
                None => {
                    errors.push("missing required field: domain".to_string());
                    None
                }
            },
            Layer::Reasoning => {
                let confidence = match map.get("confidence") {
                    None | Some(Value::Null) => {
                        errors.push("missing required field: confidence".to_string());
                        None
                    }
                    Some(v) => match v.as_f64() {
                        Some(c) if (0.0..=1.0).contains(&c) => Some(c),
                        _ => {
                            errors.push(format!("invalid field: confidence must be in [0, 1], got {}", v));
                            None
                        }
                    },
                };
                let reasoning = non_blank(map, "reasoning");
                if reasoning.is_none() {
                    errors.push("missing required field: reasoning".to_string());
                }
                match (confidence, reasoning) {
                    (Some(confidence), Some(reasoning)) => {
                        extra.remove("confidence");
                        extra.remove("reasoning");
                        Some(LayerProperties::Reasoning {
                            confidence,
                            reasoning,
                            extra,
                        })
                    }
                    _ => None,
                }
            }
            Layer::Application => match non_blank(map, "usage_context") {
                Some(usage_context) => {
                    extra.remove("usage_context");
                    Some(LayerProperties::Application { usage_context, extra })
                }
                None => {
                    errors.push("missing required field: usage_context".to_string());
                    None
                }
            },
        };

        result.ok_or(errors)
    }

    /// Layer these properties satisfy
    pub fn layer(&self) -> Layer {
        match self {
            LayerProperties::Perception { .. } => Layer::Perception,
            LayerProperties::Semantic { .. } => Layer::Semantic,
            LayerProperties::Reasoning { .. } => Layer::Reasoning,
            LayerProperties::Application { .. } => Layer::Application,
        }
    }
}

fn non_blank(map: &PropertyMap, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
