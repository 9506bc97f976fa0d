//! Quota specification adapter.

use crate::backend::QuotaApi;
use crate::diff::{diff_fields, FieldDrift};
use crate::error::ReconcileError;
use crate::resource::{deleted, existence, fetched, require_non_empty, ResourceAdapter};
use crate::types::{EntityKind, Identity, Operation, QuotaLimit, QuotaResources, QuotaSpecification};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub limits: Vec<QuotaLimitSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimitSpec {
    pub region: String,
    #[serde(default)]
    pub region_limit: QuotaResourcesSpec,
}

/// Unset means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaResourcesSpec {
    #[serde(default)]
    pub cpu: Option<i64>,
    #[serde(default)]
    pub memory_mb: Option<i64>,
}

impl QuotaSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            limits: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_limit(mut self, region: impl Into<String>, cpu: Option<i64>, memory_mb: Option<i64>) -> Self {
        self.limits.push(QuotaLimitSpec {
            region: region.into(),
            region_limit: QuotaResourcesSpec { cpu, memory_mb },
        });
        self
    }

    fn to_remote(&self, name: &str) -> QuotaSpecification {
        QuotaSpecification {
            name: name.to_string(),
            description: self.description.clone().unwrap_or_default(),
            limits: self
                .limits
                .iter()
                .map(|l| QuotaLimit {
                    region: l.region.clone(),
                    region_limit: QuotaResources {
                        cpu: l.region_limit.cpu,
                        memory_mb: l.region_limit.memory_mb,
                    },
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Limits are keyed by region; their order carries no meaning.
    fn normalized(&self) -> Self {
        let mut spec = self.clone();
        spec.limits.sort_by(|a, b| a.region.cmp(&b.region));
        spec
    }
}

impl From<&QuotaSpecification> for QuotaSpec {
    fn from(quota: &QuotaSpecification) -> Self {
        Self {
            name: quota.name.clone(),
            description: Some(quota.description.clone()),
            limits: quota
                .limits
                .iter()
                .map(|l| QuotaLimitSpec {
                    region: l.region.clone(),
                    region_limit: QuotaResourcesSpec {
                        cpu: l.region_limit.cpu,
                        memory_mb: l.region_limit.memory_mb,
                    },
                })
                .collect(),
        }
    }
}

pub struct QuotaAdapter<'a, B: QuotaApi> {
    backend: &'a B,
}

impl<'a, B: QuotaApi> QuotaAdapter<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    async fn upsert(
        &self,
        name: &str,
        spec: &QuotaSpec,
        action: Operation,
    ) -> Result<(), ReconcileError> {
        self.validate(spec)?;
        self.backend
            .quota_upsert(&spec.to_remote(name))
            .await
            .map_err(|e| ReconcileError::remote(EntityKind::QuotaSpecification, name, action, e))?;
        info!(name, %action, limits = spec.limits.len(), "quota specification applied");
        Ok(())
    }
}

impl<'a, B: QuotaApi> ResourceAdapter for QuotaAdapter<'a, B> {
    const KIND: EntityKind = EntityKind::QuotaSpecification;

    type Spec = QuotaSpec;
    type Observed = QuotaSpecification;

    fn spec_identity(spec: &QuotaSpec) -> Option<Identity> {
        Some(Identity::new(spec.name.clone()))
    }

    fn validate(&self, spec: &QuotaSpec) -> Result<(), ReconcileError> {
        require_non_empty("name", &spec.name)?;
        if spec.limits.is_empty() {
            return Err(ReconcileError::InvalidSpec(
                "quota needs at least one limit".into(),
            ));
        }
        let mut regions = BTreeSet::new();
        for limit in &spec.limits {
            require_non_empty("limits.region", &limit.region)?;
            if !regions.insert(limit.region.as_str()) {
                return Err(ReconcileError::InvalidSpec(format!(
                    "duplicate quota limit for region {:?}",
                    limit.region
                )));
            }
        }
        Ok(())
    }

    fn drift(
        &self,
        desired: &QuotaSpec,
        observed: &QuotaSpecification,
    ) -> Result<Vec<FieldDrift>, ReconcileError> {
        diff_fields(&desired.normalized(), &QuotaSpec::from(observed).normalized())
    }

    async fn exists(&self, id: &Identity) -> Result<bool, ReconcileError> {
        existence(Self::KIND, id, self.backend.quota_info(&id.id).await)
    }

    async fn read(&self, id: &Identity) -> Result<QuotaSpecification, ReconcileError> {
        fetched(Self::KIND, id, self.backend.quota_info(&id.id).await)
    }

    async fn create(&self, spec: &QuotaSpec) -> Result<Identity, ReconcileError> {
        self.upsert(&spec.name, spec, Operation::Create).await?;
        Ok(Identity::new(spec.name.clone()))
    }

    async fn update(&self, id: &Identity, spec: &QuotaSpec) -> Result<bool, ReconcileError> {
        self.upsert(&id.id, spec, Operation::Update).await?;
        Ok(true)
    }

    async fn delete(&self, id: &Identity) -> Result<(), ReconcileError> {
        deleted(Self::KIND, id, self.backend.quota_delete(&id.id).await)
    }
}
