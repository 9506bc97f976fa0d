//! File-backed state store.
//!
//! Stores each record as `{kind}/{key}.json` under
//! `~/.nomad-reconcile/state/` by default, where `key` is
//! [`identity_key`](crate::store::identity_key) of the identity.

use crate::error::ReconcileError;
use crate::store::{identity_key, StateStore, StoredRecord};
use crate::types::{EntityKind, Identity};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::warn;

/// File-backed implementation of [`StateStore`].
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    /// Create a store using the default directory (`~/.nomad-reconcile/state`).
    pub async fn new_default() -> Result<Self, ReconcileError> {
        let home = dirs::home_dir().ok_or_else(|| {
            ReconcileError::Storage("could not determine home directory".into())
        })?;
        Self::new(home.join(".nomad-reconcile").join("state")).await
    }

    /// Create a store at a custom directory path.
    pub async fn new(root: PathBuf) -> Result<Self, ReconcileError> {
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| ReconcileError::Storage(format!("failed to create state dir: {}", e)))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn kind_dir(&self, kind: EntityKind) -> PathBuf {
        self.root.join(kind.name())
    }

    fn record_path(&self, kind: EntityKind, identity: &Identity) -> PathBuf {
        self.kind_dir(kind)
            .join(format!("{}.json", identity_key(identity)))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn save(&self, record: &StoredRecord) -> Result<(), ReconcileError> {
        let dir = self.kind_dir(record.kind);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ReconcileError::Storage(format!("failed to create kind dir: {}", e)))?;

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| ReconcileError::Storage(format!("failed to serialize record: {}", e)))?;

        // Replace atomically.
        let path = self.record_path(record.kind, &record.identity);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| ReconcileError::Storage(format!("failed to write record: {}", e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| ReconcileError::Storage(format!("failed to move record: {}", e)))?;

        Ok(())
    }

    async fn load(
        &self,
        kind: EntityKind,
        identity: &Identity,
    ) -> Result<Option<StoredRecord>, ReconcileError> {
        let path = self.record_path(kind, identity);

        if tokio::fs::metadata(&path).await.is_err() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ReconcileError::Storage(format!("failed to read record: {}", e)))?;

        let record = serde_json::from_str(&content)
            .map_err(|e| ReconcileError::Storage(format!("failed to parse record: {}", e)))?;

        Ok(Some(record))
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<StoredRecord>, ReconcileError> {
        let dir = self.kind_dir(kind);
        if tokio::fs::metadata(&dir).await.is_err() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ReconcileError::Storage(format!("failed to read kind dir: {}", e)))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ReconcileError::Storage(format!("failed to read dir entry: {}", e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            match serde_json::from_str::<StoredRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }

        records.sort_by_key(|r| r.identity.to_string());
        Ok(records)
    }

    async fn delete(&self, kind: EntityKind, identity: &Identity) -> Result<(), ReconcileError> {
        let path = self.record_path(kind, identity);
        if tokio::fs::metadata(&path).await.is_ok() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| ReconcileError::Storage(format!("failed to delete record: {}", e)))?;
        }
        Ok(())
    }
}
