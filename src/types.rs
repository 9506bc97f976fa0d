//! Domain types shared by the backend, the adapters and the driver.
//!
//! The remote structs mirror the Nomad HTTP API wire shapes (PascalCase keys).
//! They are what a Read returns: the observed snapshot. Desired-state records
//! live next to their adapters in [`crate::resource`].

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The five entity kinds this crate reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Deployment,
    AclPolicy,
    AclToken,
    QuotaSpecification,
    Job,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Deployment => "deployment",
            EntityKind::AclPolicy => "acl_policy",
            EntityKind::AclToken => "acl_token",
            EntityKind::QuotaSpecification => "quota_specification",
            EntityKind::Job => "job",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The remote action an adapter was attempting when a call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Exists,
    Read,
    Create,
    Update,
    Delete,
    Fail,
    Pause,
    Resume,
    Promote,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Exists => "exists",
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Fail => "fail",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Promote => "promote",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Remote identity of a managed entity.
///
/// Jobs are addressed by ID and namespace; every other kind uses `id` alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            namespace: None,
        }
    }

    pub fn namespaced(id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Namespace, falling back to Nomad's `default`.
    pub fn namespace_or_default(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.id),
            None => f.write_str(&self.id),
        }
    }
}

pub const DEFAULT_NAMESPACE: &str = "default";

/// Nomad encodes empty lists and maps as `null`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ═══════════════════════════════════════════════════════════════════
// DEPLOYMENTS
// ═══════════════════════════════════════════════════════════════════

/// Deployment as reported by `GET /v1/deployment/:id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Deployment {
    #[serde(rename = "ID")]
    pub id: String,
    pub namespace: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    pub job_version: u64,
    pub job_modify_index: u64,
    pub job_create_index: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub task_groups: BTreeMap<String, DeploymentTaskGroup>,
    pub status: String,
    pub status_description: String,
    pub create_index: u64,
    pub modify_index: u64,
}

impl Deployment {
    /// Deployments that have not reached a terminal status.
    pub fn is_active(&self) -> bool {
        matches!(self.status.as_str(), "running" | "paused" | "pending")
    }
}

/// Per task group rollout progress inside a deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeploymentTaskGroup {
    pub auto_revert: bool,
    pub promoted: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub placed_canaries: Vec<String>,
    pub desired_canaries: u32,
    pub desired_total: u32,
    pub placed_allocs: u32,
    pub healthy_allocs: u32,
    pub unhealthy_allocs: u32,
}

/// Response to fail / pause / promote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeploymentUpdateResponse {
    #[serde(rename = "EvalID")]
    pub eval_id: String,
    pub deployment_modify_index: u64,
}

// ═══════════════════════════════════════════════════════════════════
// ACL
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AclPolicy {
    pub name: String,
    pub description: String,
    pub rules: String,
    pub create_index: u64,
    pub modify_index: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AclToken {
    #[serde(rename = "AccessorID", skip_serializing_if = "String::is_empty")]
    pub accessor_id: String,
    #[serde(rename = "SecretID", skip_serializing_if = "String::is_empty")]
    pub secret_id: String,
    pub name: String,
    #[serde(rename = "Type")]
    pub token_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub policies: Vec<String>,
    pub global: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub create_time: String,
    pub create_index: u64,
    pub modify_index: u64,
}

// ═══════════════════════════════════════════════════════════════════
// QUOTAS
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QuotaSpecification {
    pub name: String,
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub limits: Vec<QuotaLimit>,
    pub create_index: u64,
    pub modify_index: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QuotaLimit {
    pub region: String,
    pub region_limit: QuotaResources,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaResources {
    #[serde(rename = "CPU", skip_serializing_if = "Option::is_none")]
    pub cpu: Option<i64>,
    #[serde(rename = "MemoryMB", skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<i64>,
}

// ═══════════════════════════════════════════════════════════════════
// JOBS
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(rename = "Type")]
    pub job_type: String,
    pub priority: u8,
    pub all_at_once: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub datacenters: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub task_groups: Vec<TaskGroup>,
    #[serde(deserialize_with = "null_as_default")]
    pub meta: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_token: Option<String>,

    // Server-assigned; ignored by the register endpoint.
    pub status: String,
    pub status_description: String,
    pub stop: bool,
    pub version: u64,
    pub submit_time: i64,
    pub create_index: u64,
    pub modify_index: u64,
    pub job_modify_index: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskGroup {
    pub name: String,
    pub count: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub tasks: Vec<Task>,
    #[serde(deserialize_with = "null_as_default")]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Task {
    pub name: String,
    pub driver: String,
    #[serde(deserialize_with = "null_as_default")]
    pub config: BTreeMap<String, serde_json::Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub env: BTreeMap<String, String>,
    pub resources: TaskResources,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskResources {
    #[serde(rename = "CPU")]
    pub cpu: u32,
    #[serde(rename = "MemoryMB")]
    pub memory_mb: u32,
}

/// Response to `PUT /v1/jobs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct JobRegisterResponse {
    #[serde(rename = "EvalID")]
    pub eval_id: String,
    pub job_modify_index: u64,
    pub warnings: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::new("dep-1").to_string(), "dep-1");
        assert_eq!(
            Identity::namespaced("web", "prod").to_string(),
            "prod/web"
        );
        assert_eq!(Identity::new("web").namespace_or_default(), "default");
    }

    #[test]
    fn test_deployment_decodes_nomad_payload() {
        let payload = r#"{
            "ID": "dep-1",
            "Namespace": "default",
            "JobID": "web",
            "JobVersion": 3,
            "JobModifyIndex": 40,
            "JobCreateIndex": 12,
            "TaskGroups": {
                "frontend": {
                    "AutoRevert": true,
                    "Promoted": false,
                    "PlacedCanaries": null,
                    "DesiredCanaries": 1,
                    "DesiredTotal": 3,
                    "PlacedAllocs": 2,
                    "HealthyAllocs": 1,
                    "UnhealthyAllocs": 0
                }
            },
            "Status": "running",
            "StatusDescription": "Deployment is running",
            "CreateIndex": 41,
            "ModifyIndex": 44
        }"#;

        let dep: Deployment = serde_json::from_str(payload).unwrap();
        assert_eq!(dep.id, "dep-1");
        assert_eq!(dep.job_version, 3);
        assert!(dep.is_active());
        let tg = &dep.task_groups["frontend"];
        assert!(tg.auto_revert);
        assert!(tg.placed_canaries.is_empty());
        assert_eq!(tg.desired_total, 3);
    }

    #[test]
    fn test_terminal_deployment_is_not_active() {
        let dep = Deployment {
            status: "successful".into(),
            ..Default::default()
        };
        assert!(!dep.is_active());
    }

    #[test]
    fn test_acl_token_create_payload_omits_server_fields() {
        let token = AclToken {
            name: "ci".into(),
            token_type: "client".into(),
            policies: vec!["readonly".into()],
            ..Default::default()
        };
        let json = serde_json::to_value(&token).unwrap();
        assert!(json.get("AccessorID").is_none());
        assert!(json.get("SecretID").is_none());
        assert_eq!(json["Type"], "client");
    }

    #[test]
    fn test_job_serialization_omits_missing_vault_token() {
        let job = Job {
            id: "web".into(),
            job_type: "service".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["ID"], "web");
        assert_eq!(json["Type"], "service");
        assert!(json.get("VaultToken").is_none());
        assert!(json.get("Region").is_none());
    }

    #[test]
    fn test_quota_null_limits() {
        let quota: QuotaSpecification =
            serde_json::from_str(r#"{"Name":"q","Limits":null}"#).unwrap();
        assert!(quota.limits.is_empty());
    }
}
