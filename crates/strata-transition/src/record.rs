//! Transition records

use crate::ValidationOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use strata_domain::{EntityId, Layer, PropertyMap};

/// Unique identifier for a transition, based on UUIDv7
///
/// UUIDv7 ids sort by creation time, which keeps lineage listings
/// chronological without a separate sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionId(uuid::Uuid);

impl TransitionId {
    /// Generate a new id
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Parse an id from its string form
    pub fn parse(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid transition id: {}", e))
    }
}

impl Default for TransitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionStatus {
    /// Waiting for approval
    Pending,
    /// Cleared to execute
    Approved,
    /// Refused by a reviewer or by validation
    Rejected,
    /// Applied to the store
    Completed,
    /// Could not be applied (entity vanished or moved)
    Failed,
}

impl TransitionStatus {
    /// No further state changes allowed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransitionStatus::Rejected | TransitionStatus::Completed | TransitionStatus::Failed
        )
    }

    /// Get the status name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionStatus::Pending => "PENDING",
            TransitionStatus::Approved => "APPROVED",
            TransitionStatus::Rejected => "REJECTED",
            TransitionStatus::Completed => "COMPLETED",
            TransitionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One property that differs between the entity before and after a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Property name
    pub key: String,
    /// Value before (absent if newly added)
    pub before: Option<Value>,
    /// Value after (absent if removed)
    pub after: Option<Value>,
}

/// Compute the before/after diff between two property maps
pub fn diff_properties(before: &PropertyMap, after: &PropertyMap) -> Vec<PropertyChange> {
    let mut changes = Vec::new();
    for (key, old) in before {
        match after.get(key) {
            Some(new) if new == old => {}
            new => changes.push(PropertyChange {
                key: key.clone(),
                before: Some(old.clone()),
                after: new.cloned(),
            }),
        }
    }
    for (key, new) in after {
        if !before.contains_key(key) {
            changes.push(PropertyChange {
                key: key.clone(),
                before: None,
                after: Some(new.clone()),
            });
        }
    }
    changes.sort_by(|a, b| a.key.cmp(&b.key));
    changes
}

/// Audit record for moving one entity between layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerTransitionRecord {
    /// Record id
    pub transition_id: TransitionId,
    /// Entity being moved
    pub entity_id: EntityId,
    /// Source layer
    pub from_layer: Layer,
    /// Target layer
    pub to_layer: Layer,
    /// Current status
    pub status: TransitionStatus,
    /// Why the move was requested
    pub reason: String,
    /// Caller-supplied context
    pub metadata: PropertyMap,
    /// When the request was made
    pub requested_at: DateTime<Utc>,
    /// Who approved it (auto-approved requests use "system")
    pub approved_by: Option<String>,
    /// When it reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Latest validation result
    pub validation: Option<ValidationOutcome>,
    /// Why it was rejected or failed
    pub rejection_reason: Option<String>,
    /// Property diff applied by execution
    pub properties_changed: Vec<PropertyChange>,
    /// Prior entity ids of this logical entity, oldest first
    pub lineage: Vec<EntityId>,
    /// Id of the entity after execution (differs from `entity_id` when versioned)
    pub resulting_entity_id: Option<EntityId>,
}

impl LayerTransitionRecord {
    pub(crate) fn new(
        entity_id: EntityId,
        from_layer: Layer,
        to_layer: Layer,
        reason: String,
        metadata: PropertyMap,
    ) -> Self {
        Self {
            transition_id: TransitionId::new(),
            entity_id,
            from_layer,
            to_layer,
            status: TransitionStatus::Pending,
            reason,
            metadata,
            requested_at: Utc::now(),
            approved_by: None,
            completed_at: None,
            validation: None,
            rejection_reason: None,
            properties_changed: Vec::new(),
            lineage: Vec::new(),
            resulting_entity_id: None,
        }
    }

    /// Time from request to completion, if completed
    pub fn completion_millis(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.requested_at).num_milliseconds())
    }

    /// Whether this record concerns the same logical entity as `id`
    pub fn touches(&self, id: &EntityId) -> bool {
        let root = id.root();
        self.entity_id.root() == root
            || self
                .resulting_entity_id
                .as_ref()
                .is_some_and(|r| r.root() == root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_states() {
        assert!(!TransitionStatus::Pending.is_terminal());
        assert!(!TransitionStatus::Approved.is_terminal());
        assert!(TransitionStatus::Rejected.is_terminal());
        assert!(TransitionStatus::Completed.is_terminal());
        assert!(TransitionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_transition_id_roundtrip() {
        let id = TransitionId::new();
        assert_eq!(TransitionId::parse(&id.to_string()).unwrap(), id);
        assert!(TransitionId::parse("nope").is_err());
    }

    #[test]
    fn test_diff_properties() {
        let before: PropertyMap = serde_json::from_value(json!({"a": 1, "b": "x", "gone": true})).unwrap();
        let after: PropertyMap = serde_json::from_value(json!({"a": 1, "b": "y", "new": 2})).unwrap();
        let diff = diff_properties(&before, &after);
        let keys: Vec<_> = diff.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "gone", "new"]);
        assert_eq!(diff[0].before, Some(json!("x")));
        assert_eq!(diff[0].after, Some(json!("y")));
        assert_eq!(diff[1].after, None);
        assert_eq!(diff[2].before, None);
    }

    #[test]
    fn test_touches_versions() {
        let record = LayerTransitionRecord::new(
            EntityId::new("e1"),
            Layer::Perception,
            Layer::Semantic,
            "test".into(),
            PropertyMap::new(),
        );
        assert!(record.touches(&EntityId::new("e1_v3")));
        assert!(!record.touches(&EntityId::new("e2")));
    }
}
