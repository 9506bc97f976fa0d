//! Canonical JSON and desired-state fingerprints.
//!
//! A tracked resource remembers the fingerprint of the desired record it last
//! applied. When the caller hands in a record with a different fingerprint
//! the resource goes dirty. Key order in maps must not change the outcome, so
//! every object is re-emitted with sorted keys before hashing.

use crate::error::ReconcileError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Serialize to JSON with every object's keys sorted.
pub fn to_canonical_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, ReconcileError> {
    let json_value = serde_json::to_value(value)
        .map_err(|e| ReconcileError::InvalidSpec(format!("json error: {}", e)))?;
    let sorted = sort_json_value(json_value);
    serde_json::to_string(&sorted)
        .map_err(|e| ReconcileError::InvalidSpec(format!("json error: {}", e)))
}

/// SHA-256 over the canonical JSON, URL-safe base64 without padding.
pub fn fingerprint<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, ReconcileError> {
    let canonical = to_canonical_json(value)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest))
}

/// Recursively sort all object keys. Arrays keep their order.
pub(crate) fn sort_json_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<String, serde_json::Value> = map
                .into_iter()
                .map(|(k, v)| (k, sort_json_value(v)))
                .collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(sort_json_value).collect())
        }
        other => other,
    }
}
