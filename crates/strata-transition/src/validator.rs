//! Transition payload validation

use serde::{Deserialize, Serialize};
use strata_domain::{Layer, LayerProperties, PropertyMap};

/// Result of checking a transition payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether the transition may proceed
    pub is_valid: bool,

    /// One message per problem, naming the offending field
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Message used for any transition that does not move strictly forward
pub fn backwards_error(from: Layer, to: Layer) -> String {
    format!("cannot transition backwards: {} -> {}", from, to)
}

/// Check that `entity_data` may move from `from` to `to`
///
/// 1. The target must sit strictly above the source layer.
/// 2. The payload must carry the fields the target layer requires.
///
/// Both checks run so the caller sees every problem at once.
pub fn validate_transition(entity_data: &PropertyMap, from: Layer, to: Layer) -> ValidationOutcome {
    let mut errors = Vec::new();

    if to.order() <= from.order() {
        errors.push(backwards_error(from, to));
    }

    if let Err(missing) = LayerProperties::parse(to, entity_data) {
        errors.extend(missing);
    }

    ValidationOutcome::from_errors(errors)
}
