//! [`StateStore`] trait definition.

use crate::error::ReconcileError;
use crate::store::StoredRecord;
use crate::types::{EntityKind, Identity};
use async_trait::async_trait;

/// Trait for persisting tracked resources, keyed by kind and identity.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Save a record. Overwrites any existing record for the same identity.
    async fn save(&self, record: &StoredRecord) -> Result<(), ReconcileError>;

    /// Load a record. Returns `None` if not found.
    async fn load(
        &self,
        kind: EntityKind,
        identity: &Identity,
    ) -> Result<Option<StoredRecord>, ReconcileError>;

    /// List every record of one kind, ordered by identity.
    async fn list(&self, kind: EntityKind) -> Result<Vec<StoredRecord>, ReconcileError>;

    /// Delete a record. Idempotent.
    async fn delete(&self, kind: EntityKind, identity: &Identity) -> Result<(), ReconcileError>;
}
