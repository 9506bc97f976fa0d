//! Tracked resource state.
//!
//! A [`TrackedResource`] is everything the caller holds for one managed
//! entity between passes: the desired record, the last observed snapshot,
//! the identity once bound, and where it sits in the lifecycle. It's
//! serializable and restorable; persisting it is the store's problem.

use crate::canonical::fingerprint;
use crate::error::ReconcileError;
use crate::resource::ResourceAdapter;
use crate::types::{EntityKind, Identity};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Lifecycle position of a tracked identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Never created, or creation has not been confirmed.
    Unbound,
    /// Bound, and the last applied desired record is the current one.
    BoundClean,
    /// Bound, and the desired record changed since it was last applied.
    BoundDirty,
    /// Deleted. Terminal.
    Absent,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Unbound => "unbound",
            Phase::BoundClean => "bound_clean",
            Phase::BoundDirty => "bound_dirty",
            Phase::Absent => "absent",
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Phase::BoundClean | Phase::BoundDirty)
    }
}

/// Tracked state for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "S: Serialize, O: Serialize",
    deserialize = "S: DeserializeOwned, O: DeserializeOwned"
))]
pub struct TrackedResource<S, O> {
    pub kind: EntityKind,
    pub phase: Phase,
    /// Remote identity, set once the entity is bound.
    pub identity: Option<Identity>,
    /// Current desired record.
    pub desired: S,
    /// Fingerprint of `desired`.
    pub fingerprint: String,
    /// Fingerprint of the desired record last applied successfully.
    pub applied_fingerprint: Option<String>,
    /// Last snapshot read from the remote side.
    pub observed: Option<O>,

    // Audit
    pub created_at: u64,
    pub updated_at: u64,
}

/// Tracked state for the entity kind an adapter manages.
pub type Tracked<A> =
    TrackedResource<<A as ResourceAdapter>::Spec, <A as ResourceAdapter>::Observed>;

impl<S: Serialize, O> TrackedResource<S, O> {
    /// Start tracking a desired record. Nothing is bound yet.
    pub fn new(kind: EntityKind, desired: S) -> Result<Self, ReconcileError> {
        let now = current_unix_time();
        Ok(Self {
            kind,
            phase: Phase::Unbound,
            identity: None,
            fingerprint: fingerprint(&desired)?,
            desired,
            applied_fingerprint: None,
            observed: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the desired record.
    ///
    /// A bound resource goes dirty when the fingerprint differs from the last
    /// applied one, and clean again if the caller reverts. Returns whether the
    /// desired record changed at all.
    pub fn set_desired(&mut self, desired: S) -> Result<bool, ReconcileError> {
        if self.phase == Phase::Absent {
            return Err(ReconcileError::InvalidState(format!(
                "{} {} was deleted; start a new record",
                self.kind,
                self.identity_label()
            )));
        }

        let next = fingerprint(&desired)?;
        let changed = next != self.fingerprint;
        self.desired = desired;
        self.fingerprint = next;

        if self.phase.is_bound() {
            self.phase = if self.applied_fingerprint.as_deref() == Some(self.fingerprint.as_str()) {
                Phase::BoundClean
            } else {
                Phase::BoundDirty
            };
        }
        if changed {
            self.updated_at = current_unix_time();
        }
        Ok(changed)
    }

    pub fn is_dirty(&self) -> bool {
        self.phase == Phase::BoundDirty
    }

    pub fn is_bound(&self) -> bool {
        self.phase.is_bound()
    }

    /// Identity for log and error messages.
    pub fn identity_label(&self) -> String {
        self.identity
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<unbound>".to_string())
    }

    /// The bound identity, or `InvalidState`.
    pub fn require_identity(&self) -> Result<&Identity, ReconcileError> {
        self.identity.as_ref().ok_or_else(|| {
            ReconcileError::InvalidState(format!("{} has no identity; create it first", self.kind))
        })
    }

    /// Record a confirmed create: the identity is fixed from here on.
    pub fn bind(&mut self, identity: Identity, observed: O) {
        self.identity = Some(identity);
        self.settle(observed);
    }

    /// Record that the entity was created but not yet read back.
    ///
    /// The next pass reads it instead of creating a duplicate.
    pub(crate) fn bind_pending(&mut self, identity: Identity) {
        self.identity = Some(identity);
        self.phase = Phase::BoundDirty;
        self.updated_at = current_unix_time();
    }

    /// The current desired record has been applied and read back.
    pub fn settle(&mut self, observed: O) {
        self.observed = Some(observed);
        self.applied_fingerprint = Some(self.fingerprint.clone());
        self.phase = Phase::BoundClean;
        self.updated_at = current_unix_time();
    }

    /// Replace the observed snapshot without touching the phase.
    pub fn observe(&mut self, observed: O) {
        self.observed = Some(observed);
        self.updated_at = current_unix_time();
    }

    /// The entity is gone. Computed attributes are dropped with it.
    pub fn mark_absent(&mut self) {
        self.phase = Phase::Absent;
        self.observed = None;
        self.updated_at = current_unix_time();
    }
}

pub(crate) fn current_unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracked() -> TrackedResource<serde_json::Value, String> {
        TrackedResource::new(EntityKind::AclPolicy, json!({"name": "admin", "rules": "r1"})).unwrap()
    }

    #[test]
    fn test_new_is_unbound() {
        let t = tracked();
        assert_eq!(t.phase, Phase::Unbound);
        assert!(t.identity.is_none());
        assert!(t.observed.is_none());
        assert_eq!(t.identity_label(), "<unbound>");
        assert!(t.require_identity().is_err());
    }

    #[test]
    fn test_bind_settles_clean() {
        let mut t = tracked();
        t.bind(Identity::new("admin"), "snapshot".to_string());
        assert_eq!(t.phase, Phase::BoundClean);
        assert_eq!(t.applied_fingerprint.as_deref(), Some(t.fingerprint.as_str()));
        assert_eq!(t.require_identity().unwrap(), &Identity::new("admin"));
    }

    #[test]
    fn test_set_desired_marks_dirty_and_back() {
        let mut t = tracked();
        t.bind(Identity::new("admin"), "snapshot".to_string());

        // key order alone is not a change
        assert!(!t.set_desired(json!({"rules": "r1", "name": "admin"})).unwrap());
        assert_eq!(t.phase, Phase::BoundClean);

        assert!(t.set_desired(json!({"name": "admin", "rules": "r2"})).unwrap());
        assert!(t.is_dirty());

        // reverting to what was applied is clean again
        assert!(t.set_desired(json!({"name": "admin", "rules": "r1"})).unwrap());
        assert_eq!(t.phase, Phase::BoundClean);
    }

    #[test]
    fn test_set_desired_on_unbound_stays_unbound() {
        let mut t = tracked();
        assert!(t.set_desired(json!({"name": "admin", "rules": "r2"})).unwrap());
        assert_eq!(t.phase, Phase::Unbound);
    }

    #[test]
    fn test_absent_is_terminal() {
        let mut t = tracked();
        t.bind(Identity::new("admin"), "snapshot".to_string());
        t.mark_absent();
        assert_eq!(t.phase, Phase::Absent);
        assert!(t.observed.is_none());
        assert!(!t.is_bound());

        let err = t.set_desired(json!({"name": "admin"})).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidState(_)));
    }

    #[test]
    fn test_bind_pending_is_dirty() {
        let mut t = tracked();
        t.bind_pending(Identity::new("admin"));
        assert!(t.is_dirty());
        assert!(t.observed.is_none());
    }

    #[test]
    fn test_tracked_serialization() {
        let mut t = tracked();
        t.bind(Identity::new("admin"), "snapshot".to_string());
        let json = serde_json::to_string(&t).unwrap();
        let restored: TrackedResource<serde_json::Value, String> =
            serde_json::from_str(&json).unwrap();
        assert_eq!(restored.phase, Phase::BoundClean);
        assert_eq!(restored.identity, Some(Identity::new("admin")));
        assert_eq!(restored.observed.as_deref(), Some("snapshot"));
    }
}
