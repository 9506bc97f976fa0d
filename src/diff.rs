//! Desired-versus-observed comparison.
//!
//! Both sides are compared in the desired-record shape: the adapter projects
//! the observed snapshot back into its spec type first. Fields the caller left
//! unset (`null` after serialization) are not compared, so an optional field
//! the server fills in never shows up as drift.

use crate::canonical::sort_json_value;
use crate::error::ReconcileError;
use serde::{Deserialize, Serialize};

/// One top-level attribute whose desired and observed values disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDrift {
    pub field: String,
    pub desired: serde_json::Value,
    pub observed: serde_json::Value,
}

/// What the driver decided to do for one identity on one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    /// Not bound yet; issue a create.
    Create,
    /// Bound and drifted; issue a full replacement.
    Update,
    /// Deployment; issue the requested transition command.
    Transition,
    /// Bound and in sync.
    Noop,
    /// Bound, but the remote entity is gone; create it again.
    Recreate,
    /// Bound, but the remote entity is gone and recreation is disabled.
    Forget,
}

impl PlanAction {
    pub fn name(&self) -> &'static str {
        match self {
            PlanAction::Create => "create",
            PlanAction::Update => "update",
            PlanAction::Transition => "transition",
            PlanAction::Noop => "noop",
            PlanAction::Recreate => "recreate",
            PlanAction::Forget => "forget",
        }
    }

    /// Whether this action issues a mutating remote call.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            PlanAction::Create | PlanAction::Update | PlanAction::Transition | PlanAction::Recreate
        )
    }
}

/// Compare two records of the same shape, attribute by attribute.
///
/// Returned in the attribute order of `desired`'s canonical form, so output is
/// stable across runs.
pub fn diff_fields<T: Serialize>(desired: &T, observed: &T) -> Result<Vec<FieldDrift>, ReconcileError> {
    let desired = to_object(desired)?;
    let observed = to_object(observed)?;

    let drift = desired
        .into_iter()
        .filter(|(_, want)| !want.is_null())
        .filter_map(|(field, want)| {
            let have = observed
                .get(&field)
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            if have == want {
                None
            } else {
                Some(FieldDrift {
                    field,
                    desired: want,
                    observed: have,
                })
            }
        })
        .collect();

    Ok(drift)
}

fn to_object<T: Serialize>(
    value: &T,
) -> Result<serde_json::Map<String, serde_json::Value>, ReconcileError> {
    let value = serde_json::to_value(value)
        .map_err(|e| ReconcileError::InvalidSpec(format!("json error: {}", e)))?;
    match sort_json_value(value) {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(ReconcileError::InvalidSpec(format!(
            "desired state must serialize to an object, got {}",
            other
        ))),
    }
}
