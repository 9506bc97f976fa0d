//! ACL policy adapter.

use crate::backend::AclPolicyApi;
use crate::diff::{diff_fields, FieldDrift};
use crate::error::ReconcileError;
use crate::resource::{deleted, existence, fetched, require_non_empty, ResourceAdapter};
use crate::types::{AclPolicy, EntityKind, Identity, Operation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const MAX_POLICY_NAME_LEN: usize = 128;

/// Desired state for an ACL policy. The name is the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclPolicySpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// HCL or JSON rule document, sent verbatim.
    pub rules: String,
}

impl AclPolicySpec {
    pub fn new(name: impl Into<String>, rules: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            rules: rules.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn to_remote(&self, name: &str) -> AclPolicy {
        AclPolicy {
            name: name.to_string(),
            description: self.description.clone().unwrap_or_default(),
            rules: self.rules.clone(),
            ..Default::default()
        }
    }
}

impl From<&AclPolicy> for AclPolicySpec {
    fn from(policy: &AclPolicy) -> Self {
        Self {
            name: policy.name.clone(),
            description: Some(policy.description.clone()),
            rules: policy.rules.clone(),
        }
    }
}

pub struct AclPolicyAdapter<'a, B: AclPolicyApi> {
    backend: &'a B,
}

impl<'a, B: AclPolicyApi> AclPolicyAdapter<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }
}

impl<'a, B: AclPolicyApi> ResourceAdapter for AclPolicyAdapter<'a, B> {
    const KIND: EntityKind = EntityKind::AclPolicy;

    type Spec = AclPolicySpec;
    type Observed = AclPolicy;

    fn spec_identity(spec: &AclPolicySpec) -> Option<Identity> {
        Some(Identity::new(spec.name.clone()))
    }

    fn validate(&self, spec: &AclPolicySpec) -> Result<(), ReconcileError> {
        require_non_empty("name", &spec.name)?;
        if spec.name.len() > MAX_POLICY_NAME_LEN
            || !spec.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ReconcileError::InvalidSpec(format!(
                "invalid policy name {:?}: must be 1-{} alphanumerics or dashes",
                spec.name, MAX_POLICY_NAME_LEN
            )));
        }
        require_non_empty("rules", &spec.rules)
    }

    fn drift(
        &self,
        desired: &AclPolicySpec,
        observed: &AclPolicy,
    ) -> Result<Vec<FieldDrift>, ReconcileError> {
        diff_fields(desired, &AclPolicySpec::from(observed))
    }

    async fn exists(&self, id: &Identity) -> Result<bool, ReconcileError> {
        existence(Self::KIND, id, self.backend.acl_policy_info(&id.id).await)
    }

    async fn read(&self, id: &Identity) -> Result<AclPolicy, ReconcileError> {
        fetched(Self::KIND, id, self.backend.acl_policy_info(&id.id).await)
    }

    async fn create(&self, spec: &AclPolicySpec) -> Result<Identity, ReconcileError> {
        self.validate(spec)?;
        self.backend
            .acl_policy_upsert(&spec.to_remote(&spec.name))
            .await
            .map_err(|e| ReconcileError::remote(Self::KIND, &spec.name, Operation::Create, e))?;
        info!(name = %spec.name, "created ACL policy");
        Ok(Identity::new(spec.name.clone()))
    }

    async fn update(&self, id: &Identity, spec: &AclPolicySpec) -> Result<bool, ReconcileError> {
        self.validate(spec)?;
        self.backend
            .acl_policy_upsert(&spec.to_remote(&id.id))
            .await
            .map_err(|e| ReconcileError::remote(Self::KIND, &id.id, Operation::Update, e))?;
        debug!(name = %id.id, "updated ACL policy");
        Ok(true)
    }

    async fn delete(&self, id: &Identity) -> Result<(), ReconcileError> {
        deleted(Self::KIND, id, self.backend.acl_policy_delete(&id.id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeBackend};

    const RULES: &str = r#"namespace "*" { policy = "write" }"#;

    #[test]
    fn test_policy_name_validation() {
        let backend = FakeBackend::new();
        let adapter = AclPolicyAdapter::new(&backend);

        assert!(adapter.validate(&AclPolicySpec::new("read-only", RULES)).is_ok());
        assert!(adapter.validate(&AclPolicySpec::new("bad name", RULES)).is_err());
        assert!(adapter.validate(&AclPolicySpec::new("x".repeat(129), RULES)).is_err());
        assert!(adapter.validate(&AclPolicySpec::new("admin", "")).is_err());
    }

    #[tokio::test]
    async fn test_create_sends_full_record() {
        let backend = FakeBackend::new();
        let adapter = AclPolicyAdapter::new(&backend);
        let spec = AclPolicySpec::new("admin", RULES).with_description("root access");

        let id = adapter.create(&spec).await.unwrap();
        assert_eq!(id, Identity::new("admin"));

        let observed = adapter.read(&id).await.unwrap();
        assert_eq!(observed.description, "root access");
        assert_eq!(observed.rules, RULES);
        assert!(observed.create_index > 0);
        assert!(adapter.drift(&spec, &observed).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_spec_issues_no_call() {
        let backend = FakeBackend::new();
        let adapter = AclPolicyAdapter::new(&backend);
        let err = adapter
            .create(&AclPolicySpec::new("no spaces allowed", RULES))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidSpec(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_drift_after_out_of_band_edit() {
        let backend = FakeBackend::new().with_policy(AclPolicy {
            name: "admin".into(),
            rules: "old".into(),
            ..Default::default()
        });
        let adapter = AclPolicyAdapter::new(&backend);

        let observed = adapter.read(&Identity::new("admin")).await.unwrap();
        let drift = adapter
            .drift(&AclPolicySpec::new("admin", RULES), &observed)
            .unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].field, "rules");
    }

    #[tokio::test]
    async fn test_delete_of_removed_policy_succeeds() {
        let backend = FakeBackend::new().with_policy(AclPolicy {
            name: "admin".into(),
            rules: RULES.into(),
            ..Default::default()
        });
        backend.remove_policy("admin");
        let adapter = AclPolicyAdapter::new(&backend);

        adapter.delete(&Identity::new("admin")).await.unwrap();
        assert_eq!(backend.calls(), vec![Call::AclPolicyDelete("admin".into())]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = FakeBackend::new();
        let adapter = AclPolicyAdapter::new(&backend);
        let id = adapter.create(&AclPolicySpec::new("ops", RULES)).await.unwrap();

        adapter.delete(&id).await.unwrap();
        adapter.delete(&id).await.unwrap();
        assert!(!adapter.exists(&id).await.unwrap());
        assert!(adapter.read(&id).await.unwrap_err().is_not_found());
    }
}
