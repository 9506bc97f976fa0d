//! ACL token adapter.
//!
//! Tokens are the one kind whose identity the server assigns: the accessor
//! ID comes back from the create call and is what every later operation
//! addresses. The secret ID is only ever observed, never desired.

use crate::backend::AclTokenApi;
use crate::diff::{diff_fields, FieldDrift};
use crate::error::{ClientError, ReconcileError};
use crate::resource::{deleted, existence, fetched, ResourceAdapter};
use crate::types::{AclToken, EntityKind, Identity, Operation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    #[default]
    Client,
    Management,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Client => "client",
            TokenType::Management => "management",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state for an ACL token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclTokenSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Policy names. Must be empty for management tokens.
    #[serde(default)]
    pub policies: Vec<String>,
    /// Replicate to every region. Defaults to false.
    #[serde(default)]
    pub global: Option<bool>,
}

impl AclTokenSpec {
    pub fn client(policies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: None,
            token_type: TokenType::Client,
            policies: policies.into_iter().map(Into::into).collect(),
            global: None,
        }
    }

    pub fn management() -> Self {
        Self {
            name: None,
            token_type: TokenType::Management,
            policies: Vec::new(),
            global: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_global(mut self, global: bool) -> Self {
        self.global = Some(global);
        self
    }

    fn to_remote(&self, accessor_id: &str) -> AclToken {
        AclToken {
            accessor_id: accessor_id.to_string(),
            name: self.name.clone().unwrap_or_default(),
            token_type: self.token_type.as_str().to_string(),
            policies: self.policies.clone(),
            global: self.global.unwrap_or(false),
            ..Default::default()
        }
    }

    /// Policy order carries no meaning.
    fn normalized(&self) -> Self {
        let mut spec = self.clone();
        spec.policies.sort();
        spec
    }
}

impl From<&AclToken> for AclTokenSpec {
    fn from(token: &AclToken) -> Self {
        let token_type = if token.token_type == TokenType::Management.as_str() {
            TokenType::Management
        } else {
            TokenType::Client
        };
        Self {
            name: Some(token.name.clone()),
            token_type,
            policies: token.policies.clone(),
            global: Some(token.global),
        }
    }
}

pub struct AclTokenAdapter<'a, B: AclTokenApi> {
    backend: &'a B,
}

impl<'a, B: AclTokenApi> AclTokenAdapter<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }
}

impl<'a, B: AclTokenApi> ResourceAdapter for AclTokenAdapter<'a, B> {
    const KIND: EntityKind = EntityKind::AclToken;

    type Spec = AclTokenSpec;
    type Observed = AclToken;

    /// Server-assigned.
    fn spec_identity(_spec: &AclTokenSpec) -> Option<Identity> {
        None
    }

    fn validate(&self, spec: &AclTokenSpec) -> Result<(), ReconcileError> {
        match spec.token_type {
            TokenType::Management if !spec.policies.is_empty() => Err(ReconcileError::InvalidSpec(
                "management tokens cannot have policies".into(),
            )),
            TokenType::Client if spec.policies.is_empty() => Err(ReconcileError::InvalidSpec(
                "client tokens need at least one policy".into(),
            )),
            _ => Ok(()),
        }
    }

    fn drift(
        &self,
        desired: &AclTokenSpec,
        observed: &AclToken,
    ) -> Result<Vec<FieldDrift>, ReconcileError> {
        diff_fields(
            &desired.normalized(),
            &AclTokenSpec::from(observed).normalized(),
        )
    }

    async fn exists(&self, id: &Identity) -> Result<bool, ReconcileError> {
        existence(Self::KIND, id, self.backend.acl_token_info(&id.id).await)
    }

    async fn read(&self, id: &Identity) -> Result<AclToken, ReconcileError> {
        fetched(Self::KIND, id, self.backend.acl_token_info(&id.id).await)
    }

    async fn create(&self, spec: &AclTokenSpec) -> Result<Identity, ReconcileError> {
        self.validate(spec)?;
        let name = spec.name.clone().unwrap_or_default();
        let created = self
            .backend
            .acl_token_create(&spec.to_remote(""))
            .await
            .map_err(|e| ReconcileError::remote(Self::KIND, &name, Operation::Create, e))?;

        if created.accessor_id.is_empty() {
            return Err(ReconcileError::remote(
                Self::KIND,
                name,
                Operation::Create,
                ClientError::Decode("create response carried no accessor ID".into()),
            ));
        }
        info!(accessor_id = %created.accessor_id, token_type = %spec.token_type, "created ACL token");
        Ok(Identity::new(created.accessor_id))
    }

    async fn update(&self, id: &Identity, spec: &AclTokenSpec) -> Result<bool, ReconcileError> {
        self.validate(spec)?;
        self.backend
            .acl_token_update(&spec.to_remote(&id.id))
            .await
            .map_err(|e| ReconcileError::remote(Self::KIND, &id.id, Operation::Update, e))?;
        debug!(accessor_id = %id.id, "updated ACL token");
        Ok(true)
    }

    async fn delete(&self, id: &Identity) -> Result<(), ReconcileError> {
        deleted(Self::KIND, id, self.backend.acl_token_delete(&id.id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeBackend};

    #[test]
    fn test_token_policy_rules() {
        let backend = FakeBackend::new();
        let adapter = AclTokenAdapter::new(&backend);

        assert!(adapter.validate(&AclTokenSpec::management()).is_ok());
        assert!(adapter.validate(&AclTokenSpec::client(["readonly"])).is_ok());
        assert!(adapter
            .validate(&AclTokenSpec::client(Vec::<String>::new()))
            .is_err());

        let mut bad = AclTokenSpec::management();
        bad.policies.push("readonly".into());
        assert!(adapter.validate(&bad).is_err());
    }

    #[test]
    fn test_token_type_wire_names() {
        let spec: AclTokenSpec =
            serde_json::from_str(r#"{"type":"management","policies":[]}"#).unwrap();
        assert_eq!(spec.token_type, TokenType::Management);
        assert!(spec.global.is_none());
    }

    #[tokio::test]
    async fn test_create_returns_server_assigned_accessor() {
        let backend = FakeBackend::new();
        let adapter = AclTokenAdapter::new(&backend);

        let id = adapter
            .create(&AclTokenSpec::client(["readonly"]).with_name("ci"))
            .await
            .unwrap();
        assert_eq!(id.id, "accessor-1");

        let token = adapter.read(&id).await.unwrap();
        assert_eq!(token.secret_id, "secret-1");
        assert_eq!(token.name, "ci");
        assert_eq!(token.token_type, "client");
        assert!(!token.global);
    }

    #[tokio::test]
    async fn test_update_addresses_tracked_accessor() {
        let backend = FakeBackend::new();
        let adapter = AclTokenAdapter::new(&backend);
        let id = adapter
            .create(&AclTokenSpec::client(["readonly"]))
            .await
            .unwrap();

        let desired = AclTokenSpec::client(["readonly", "deploy"]).with_name("ci");
        adapter.update(&id, &desired).await.unwrap();
        assert_eq!(
            backend.mutations().last(),
            Some(&Call::AclTokenUpdate("accessor-1".into()))
        );

        let token = adapter.read(&id).await.unwrap();
        assert_eq!(token.accessor_id, "accessor-1");
        assert_eq!(token.secret_id, "secret-1");
        assert_eq!(token.policies, vec!["readonly", "deploy"]);
    }

    #[tokio::test]
    async fn test_policy_order_is_not_drift() {
        let backend = FakeBackend::new();
        let adapter = AclTokenAdapter::new(&backend);
        let id = adapter
            .create(&AclTokenSpec::client(["b", "a"]))
            .await
            .unwrap();
        let observed = adapter.read(&id).await.unwrap();

        assert!(adapter
            .drift(&AclTokenSpec::client(["a", "b"]), &observed)
            .unwrap()
            .is_empty());
        let drift = adapter
            .drift(&AclTokenSpec::client(["a"]).with_global(true), &observed)
            .unwrap();
        let fields: Vec<_> = drift.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["global", "policies"]);
    }

    #[tokio::test]
    async fn test_delete_unknown_accessor_succeeds() {
        let backend = FakeBackend::new();
        let adapter = AclTokenAdapter::new(&backend);
        adapter.delete(&Identity::new("accessor-9")).await.unwrap();
    }
}
