//! Entity adapters.
//!
//! Each adapter owns one entity kind: its desired-state schema, its local
//! validation, and the five inbound operations (exists, read, create,
//! update, delete) expressed against the backend traits. Adapters hold the
//! backend by reference and keep no other state between calls.

pub mod acl_policy;
pub mod acl_token;
pub mod deployment;
pub mod job;
pub mod quota;

pub use acl_policy::{AclPolicyAdapter, AclPolicySpec};
pub use acl_token::{AclTokenAdapter, AclTokenSpec, TokenType};
pub use deployment::{
    DeploymentAdapter, DeploymentSnapshot, DeploymentSpec, DeploymentTransition,
    TaskGroupProgress, TransitionPolicy,
};
pub use job::{JobAdapter, JobSpec, TaskGroupSpec, TaskResourcesSpec, TaskSpec};
pub use quota::{QuotaAdapter, QuotaLimitSpec, QuotaResourcesSpec, QuotaSpec};

use crate::diff::FieldDrift;
use crate::error::{ClientError, ReconcileError};
use crate::types::{EntityKind, Identity, Operation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use tracing::debug;

/// The contract every entity adapter honours.
///
/// - `exists` never fails on absence; it reports `false`.
/// - `read` fails with [`ReconcileError::NotFound`] on absence.
/// - `create` and `update` send the full desired record (deployments: one
///   transition command) and return before any read-back; the driver reads.
/// - `update` reports `false` when it decided to send nothing.
/// - `delete` treats absence as success.
pub trait ResourceAdapter: Send + Sync {
    const KIND: EntityKind;

    /// Deployments only accept transition commands, never field replacement.
    const TRANSITION_ONLY: bool = false;

    /// Desired-state record supplied by the caller.
    type Spec: Clone + Serialize + DeserializeOwned + Send + Sync;

    /// Observed-state snapshot returned by a read.
    type Observed: Clone + Serialize + DeserializeOwned + Send + Sync;

    /// Caller-assigned identity, or `None` when the server assigns it.
    fn spec_identity(spec: &Self::Spec) -> Option<Identity>;

    /// Local schema checks, run before any remote call.
    fn validate(&self, spec: &Self::Spec) -> Result<(), ReconcileError>;

    /// Attributes where `observed` disagrees with `desired`.
    fn drift(
        &self,
        desired: &Self::Spec,
        observed: &Self::Observed,
    ) -> Result<Vec<FieldDrift>, ReconcileError>;

    fn exists(&self, id: &Identity) -> impl Future<Output = Result<bool, ReconcileError>> + Send;

    fn read(
        &self,
        id: &Identity,
    ) -> impl Future<Output = Result<Self::Observed, ReconcileError>> + Send;

    fn create(
        &self,
        spec: &Self::Spec,
    ) -> impl Future<Output = Result<Identity, ReconcileError>> + Send;

    /// Returns whether a command was sent. Only a transition-only kind
    /// ever reports `false`.
    fn update(
        &self,
        id: &Identity,
        spec: &Self::Spec,
    ) -> impl Future<Output = Result<bool, ReconcileError>> + Send;

    fn delete(&self, id: &Identity) -> impl Future<Output = Result<(), ReconcileError>> + Send;
}

// ═══════════════════════════════════════════════════════════════════
// SHARED RESULT MAPPING
// ═══════════════════════════════════════════════════════════════════

/// Existence from an info call: found, absent, or error.
pub(crate) fn existence<T>(
    kind: EntityKind,
    id: &Identity,
    result: Result<T, ClientError>,
) -> Result<bool, ReconcileError> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => {
            debug!(%kind, %id, "not found; reporting absent");
            Ok(false)
        }
        Err(e) => Err(ReconcileError::remote(kind, id.to_string(), Operation::Exists, e)),
    }
}

/// Strict read: absence is an error.
pub(crate) fn fetched<T>(
    kind: EntityKind,
    id: &Identity,
    result: Result<T, ClientError>,
) -> Result<T, ReconcileError> {
    result.map_err(|e| ReconcileError::remote(kind, id.to_string(), Operation::Read, e))
}

/// Idempotent delete: absence counts as done.
pub(crate) fn deleted(
    kind: EntityKind,
    id: &Identity,
    result: Result<(), ClientError>,
) -> Result<(), ReconcileError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            debug!(%kind, %id, "already absent; delete is a no-op");
            Ok(())
        }
        Err(e) => Err(ReconcileError::remote(kind, id.to_string(), Operation::Delete, e)),
    }
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ReconcileError> {
    if value.trim().is_empty() {
        return Err(ReconcileError::InvalidSpec(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existence_mapping() {
        let id = Identity::new("x");
        assert!(existence(EntityKind::Job, &id, Ok::<_, ClientError>(())).unwrap());
        assert!(!existence::<()>(EntityKind::Job, &id, Err(ClientError::NotFound("".into()))).unwrap());
        let err = existence::<()>(
            EntityKind::Job,
            &id,
            Err(ClientError::Transport("refused".into())),
        )
        .unwrap_err();
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_fetched_surfaces_not_found() {
        let id = Identity::new("x");
        let err = fetched::<()>(
            EntityKind::AclPolicy,
            &id,
            Err(ClientError::NotFound("missing".into())),
        )
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_deleted_normalizes_not_found() {
        let id = Identity::new("x");
        assert!(deleted(EntityKind::QuotaSpecification, &id, Err(ClientError::NotFound("".into()))).is_ok());
        assert!(deleted(
            EntityKind::QuotaSpecification,
            &id,
            Err(ClientError::Api {
                status: 500,
                body: "boom".into()
            })
        )
        .is_err());
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("name", "admin").is_ok());
        assert!(require_non_empty("name", "  ").is_err());
    }
}
