//! In-memory state store.
//!
//! Nothing survives the process. Useful for tests and for callers that
//! persist tracked resources some other way.

use crate::error::ReconcileError;
use crate::store::{StateStore, StoredRecord};
use crate::types::{EntityKind, Identity};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStateStore {
    records: RwLock<HashMap<(EntityKind, Identity), StoredRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save(&self, record: &StoredRecord) -> Result<(), ReconcileError> {
        self.records
            .write()
            .await
            .insert((record.kind, record.identity.clone()), record.clone());
        Ok(())
    }

    async fn load(
        &self,
        kind: EntityKind,
        identity: &Identity,
    ) -> Result<Option<StoredRecord>, ReconcileError> {
        Ok(self
            .records
            .read()
            .await
            .get(&(kind, identity.clone()))
            .cloned())
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<StoredRecord>, ReconcileError> {
        let mut records: Vec<StoredRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.identity.to_string());
        Ok(records)
    }

    async fn delete(&self, kind: EntityKind, identity: &Identity) -> Result<(), ReconcileError> {
        self.records.write().await.remove(&(kind, identity.clone()));
        Ok(())
    }
}
