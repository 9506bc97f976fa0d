//! [`StoredRecord`], the persisted form of a tracked resource.

use crate::error::ReconcileError;
use crate::state::{Phase, TrackedResource};
use crate::types::{EntityKind, Identity};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Persisted form of a [`TrackedResource`].
///
/// Desired and observed records are kept as untyped JSON so one store can
/// hold every entity kind. Only bound resources are stored: an unbound one
/// has no identity to key it by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub kind: EntityKind,
    pub identity: Identity,
    pub phase: Phase,
    pub fingerprint: String,
    pub applied_fingerprint: Option<String>,
    pub desired: serde_json::Value,
    /// Last observed snapshot.
    pub attributes: Option<serde_json::Value>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl StoredRecord {
    /// Snapshot a tracked resource. Fails if it was never bound.
    pub fn from_tracked<S: Serialize, O: Serialize>(
        tracked: &TrackedResource<S, O>,
    ) -> Result<Self, ReconcileError> {
        let identity = tracked.identity.clone().ok_or_else(|| {
            ReconcileError::InvalidState(format!(
                "cannot persist {} without an identity",
                tracked.kind
            ))
        })?;

        let attributes = match &tracked.observed {
            Some(observed) => Some(to_json(observed)?),
            None => None,
        };

        Ok(Self {
            kind: tracked.kind,
            identity,
            phase: tracked.phase,
            fingerprint: tracked.fingerprint.clone(),
            applied_fingerprint: tracked.applied_fingerprint.clone(),
            desired: to_json(&tracked.desired)?,
            attributes,
            created_at: tracked.created_at,
            updated_at: tracked.updated_at,
        })
    }

    /// Restore the typed tracked resource.
    pub fn to_tracked<S: DeserializeOwned, O: DeserializeOwned>(
        &self,
    ) -> Result<TrackedResource<S, O>, ReconcileError> {
        let observed = match &self.attributes {
            Some(value) => Some(from_json(value)?),
            None => None,
        };

        Ok(TrackedResource {
            kind: self.kind,
            phase: self.phase,
            identity: Some(self.identity.clone()),
            desired: from_json(&self.desired)?,
            fingerprint: self.fingerprint.clone(),
            applied_fingerprint: self.applied_fingerprint.clone(),
            observed,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    /// Filesystem-safe key for this record's identity.
    pub fn key(&self) -> String {
        identity_key(&self.identity)
    }
}

/// URL-safe base64 of namespace and ID, NUL-separated. Slashes in either
/// part cannot escape the kind directory.
pub fn identity_key(identity: &Identity) -> String {
    let raw = match &identity.namespace {
        Some(ns) => format!("{}\u{0}{}", ns, identity.id),
        None => identity.id.clone(),
    };
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, ReconcileError> {
    serde_json::to_value(value)
        .map_err(|e| ReconcileError::Storage(format!("failed to serialize record: {}", e)))
}

fn from_json<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T, ReconcileError> {
    T::deserialize(value)
        .map_err(|e| ReconcileError::Storage(format!("failed to parse record: {}", e)))
}
