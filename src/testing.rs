//! In-memory fake of the Nomad control API.
//!
//! Records every call it receives so tests can assert exactly which remote
//! operations a pass issued. State changes roughly follow what a real server
//! does (indexes bump, tokens get accessor IDs, pause flips the status), which
//! is enough for read-back assertions.

use crate::backend::{AclPolicyApi, AclTokenApi, DeploymentApi, JobApi, QuotaApi};
use crate::error::ClientError;
use crate::types::*;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// One remote call as seen by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DeploymentInfo(String),
    DeploymentFail(String),
    DeploymentPause(String, bool),
    DeploymentPromoteAll(String),
    AclPolicyInfo(String),
    AclPolicyUpsert(String),
    AclPolicyDelete(String),
    AclTokenInfo(String),
    AclTokenCreate(String),
    AclTokenUpdate(String),
    AclTokenDelete(String),
    QuotaInfo(String),
    QuotaUpsert(String),
    QuotaDelete(String),
    JobInfo(String, String),
    JobRegister(String, String),
    JobDeregister(String, String, bool),
}

impl Call {
    /// Whether the call changes remote state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Call::DeploymentInfo(_)
                | Call::AclPolicyInfo(_)
                | Call::AclTokenInfo(_)
                | Call::QuotaInfo(_)
                | Call::JobInfo(..)
        )
    }
}

#[derive(Default)]
struct FakeState {
    deployments: BTreeMap<String, Deployment>,
    policies: BTreeMap<String, AclPolicy>,
    tokens: BTreeMap<String, AclToken>,
    quotas: BTreeMap<String, QuotaSpecification>,
    jobs: BTreeMap<(String, String), Job>,
    calls: Vec<Call>,
    queued_failures: Vec<ClientError>,
    targeted_failures: Vec<(Call, ClientError)>,
    offline: bool,
    index: u64,
    token_seq: u64,
}

impl FakeState {
    fn next_index(&mut self) -> u64 {
        self.index += 1;
        self.index
    }

    /// Record the call, then hand back any injected failure.
    fn enter(&mut self, call: Call) -> Result<(), ClientError> {
        if self.offline {
            self.calls.push(call);
            return Err(ClientError::Transport("connection refused".into()));
        }
        if let Some(pos) = self.targeted_failures.iter().position(|(c, _)| *c == call) {
            self.calls.push(call);
            return Err(self.targeted_failures.remove(pos).1);
        }
        self.calls.push(call);
        if !self.queued_failures.is_empty() {
            return Err(self.queued_failures.remove(0));
        }
        Ok(())
    }
}

/// Recording fake backend.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a deployment as the scheduler would have created it.
    pub fn with_deployment(self, deployment: Deployment) -> Self {
        self.lock()
            .deployments
            .insert(deployment.id.clone(), deployment);
        self
    }

    pub fn with_policy(self, policy: AclPolicy) -> Self {
        self.lock().policies.insert(policy.name.clone(), policy);
        self
    }

    /// Remove a policy behind the reconciler's back.
    pub fn remove_policy(&self, name: &str) {
        self.lock().policies.remove(name);
    }

    pub fn remove_job(&self, id: &str, namespace: &str) {
        self.lock()
            .jobs
            .remove(&(namespace.to_string(), id.to_string()));
    }

    /// Edit a stored job in place, as another operator would.
    pub fn edit_job(&self, id: &str, namespace: &str, edit: impl FnOnce(&mut Job)) {
        if let Some(job) = self
            .lock()
            .jobs
            .get_mut(&(namespace.to_string(), id.to_string()))
        {
            edit(job);
        }
    }

    /// Fail the next call with `error`, after recording it.
    pub fn fail_next(&self, error: ClientError) {
        self.lock().queued_failures.push(error);
    }

    /// Fail the first call equal to `call` with `error`, after recording it.
    pub fn fail_on(&self, call: Call, error: ClientError) {
        self.lock().targeted_failures.push((call, error));
    }

    /// Every call fails with a transport error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn deployment(&self, id: &str) -> Option<Deployment> {
        self.lock().deployments.get(id).cloned()
    }

    pub fn policy(&self, name: &str) -> Option<AclPolicy> {
        self.lock().policies.get(name).cloned()
    }

    pub fn token(&self, accessor_id: &str) -> Option<AclToken> {
        self.lock().tokens.get(accessor_id).cloned()
    }

    pub fn quota(&self, name: &str) -> Option<QuotaSpecification> {
        self.lock().quotas.get(name).cloned()
    }

    pub fn job(&self, id: &str, namespace: &str) -> Option<Job> {
        self.lock()
            .jobs
            .get(&(namespace.to_string(), id.to_string()))
            .cloned()
    }
}

fn not_found(what: &str, id: &str) -> ClientError {
    ClientError::NotFound(format!("{} {:?} not found", what, id))
}

fn set_deployment_status(
    state: &mut FakeState,
    id: &str,
    status: &str,
    description: &str,
) -> Result<DeploymentUpdateResponse, ClientError> {
    let index = state.next_index();
    let dep = state
        .deployments
        .get_mut(id)
        .ok_or_else(|| not_found("deployment", id))?;
    dep.status = status.to_string();
    dep.status_description = description.to_string();
    dep.modify_index = index;
    Ok(DeploymentUpdateResponse {
        eval_id: format!("eval-{}", index),
        deployment_modify_index: index,
    })
}

impl DeploymentApi for FakeBackend {
    async fn deployment_info(&self, id: &str) -> Result<Deployment, ClientError> {
        let mut state = self.lock();
        state.enter(Call::DeploymentInfo(id.to_string()))?;
        state
            .deployments
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("deployment", id))
    }

    async fn deployment_fail(&self, id: &str) -> Result<DeploymentUpdateResponse, ClientError> {
        let mut state = self.lock();
        state.enter(Call::DeploymentFail(id.to_string()))?;
        set_deployment_status(&mut state, id, "failed", "Deployment marked as failed")
    }

    async fn deployment_pause(
        &self,
        id: &str,
        pause: bool,
    ) -> Result<DeploymentUpdateResponse, ClientError> {
        let mut state = self.lock();
        state.enter(Call::DeploymentPause(id.to_string(), pause))?;
        if pause {
            set_deployment_status(&mut state, id, "paused", "Deployment is paused")
        } else {
            set_deployment_status(&mut state, id, "running", "Deployment is running")
        }
    }

    async fn deployment_promote_all(
        &self,
        id: &str,
    ) -> Result<DeploymentUpdateResponse, ClientError> {
        let mut state = self.lock();
        state.enter(Call::DeploymentPromoteAll(id.to_string()))?;
        let response = set_deployment_status(
            &mut state,
            id,
            "running",
            "Deployment is running",
        )?;
        if let Some(dep) = state.deployments.get_mut(id) {
            for tg in dep.task_groups.values_mut() {
                tg.promoted = true;
            }
        }
        Ok(response)
    }
}

impl AclPolicyApi for FakeBackend {
    async fn acl_policy_info(&self, name: &str) -> Result<AclPolicy, ClientError> {
        let mut state = self.lock();
        state.enter(Call::AclPolicyInfo(name.to_string()))?;
        state
            .policies
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("ACL policy", name))
    }

    async fn acl_policy_upsert(&self, policy: &AclPolicy) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.enter(Call::AclPolicyUpsert(policy.name.clone()))?;
        let index = state.next_index();
        let create_index = state
            .policies
            .get(&policy.name)
            .map(|p| p.create_index)
            .unwrap_or(index);
        state.policies.insert(
            policy.name.clone(),
            AclPolicy {
                create_index,
                modify_index: index,
                ..policy.clone()
            },
        );
        Ok(())
    }

    async fn acl_policy_delete(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.enter(Call::AclPolicyDelete(name.to_string()))?;
        state
            .policies
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("ACL policy", name))
    }
}

impl AclTokenApi for FakeBackend {
    async fn acl_token_info(&self, accessor_id: &str) -> Result<AclToken, ClientError> {
        let mut state = self.lock();
        state.enter(Call::AclTokenInfo(accessor_id.to_string()))?;
        state
            .tokens
            .get(accessor_id)
            .cloned()
            .ok_or_else(|| not_found("ACL token", accessor_id))
    }

    async fn acl_token_create(&self, token: &AclToken) -> Result<AclToken, ClientError> {
        let mut state = self.lock();
        state.enter(Call::AclTokenCreate(token.name.clone()))?;
        if !token.accessor_id.is_empty() {
            return Err(ClientError::Api {
                status: 400,
                body: "accessor ID must not be set on create".into(),
            });
        }
        state.token_seq += 1;
        let seq = state.token_seq;
        let index = state.next_index();
        let created = AclToken {
            accessor_id: format!("accessor-{}", seq),
            secret_id: format!("secret-{}", seq),
            create_time: "2024-01-01T00:00:00Z".into(),
            create_index: index,
            modify_index: index,
            ..token.clone()
        };
        state
            .tokens
            .insert(created.accessor_id.clone(), created.clone());
        Ok(created)
    }

    async fn acl_token_update(&self, token: &AclToken) -> Result<AclToken, ClientError> {
        let mut state = self.lock();
        state.enter(Call::AclTokenUpdate(token.accessor_id.clone()))?;
        let index = state.next_index();
        let existing = state
            .tokens
            .get(&token.accessor_id)
            .cloned()
            .ok_or_else(|| not_found("ACL token", &token.accessor_id))?;
        let updated = AclToken {
            accessor_id: existing.accessor_id,
            secret_id: existing.secret_id,
            create_time: existing.create_time,
            create_index: existing.create_index,
            modify_index: index,
            ..token.clone()
        };
        state
            .tokens
            .insert(updated.accessor_id.clone(), updated.clone());
        Ok(updated)
    }

    async fn acl_token_delete(&self, accessor_id: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.enter(Call::AclTokenDelete(accessor_id.to_string()))?;
        state
            .tokens
            .remove(accessor_id)
            .map(|_| ())
            .ok_or_else(|| not_found("ACL token", accessor_id))
    }
}

impl QuotaApi for FakeBackend {
    async fn quota_info(&self, name: &str) -> Result<QuotaSpecification, ClientError> {
        let mut state = self.lock();
        state.enter(Call::QuotaInfo(name.to_string()))?;
        state
            .quotas
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("quota", name))
    }

    async fn quota_upsert(&self, spec: &QuotaSpecification) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.enter(Call::QuotaUpsert(spec.name.clone()))?;
        let index = state.next_index();
        let create_index = state
            .quotas
            .get(&spec.name)
            .map(|q| q.create_index)
            .unwrap_or(index);
        state.quotas.insert(
            spec.name.clone(),
            QuotaSpecification {
                create_index,
                modify_index: index,
                ..spec.clone()
            },
        );
        Ok(())
    }

    async fn quota_delete(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.enter(Call::QuotaDelete(name.to_string()))?;
        state
            .quotas
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("quota", name))
    }
}

impl JobApi for FakeBackend {
    async fn job_info(&self, id: &str, namespace: &str) -> Result<Job, ClientError> {
        let mut state = self.lock();
        state.enter(Call::JobInfo(id.to_string(), namespace.to_string()))?;
        state
            .jobs
            .get(&(namespace.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| not_found("job", id))
    }

    async fn job_register(&self, job: &Job) -> Result<JobRegisterResponse, ClientError> {
        let mut state = self.lock();
        state.enter(Call::JobRegister(job.id.clone(), job.namespace.clone()))?;
        let index = state.next_index();
        let key = (job.namespace.clone(), job.id.clone());
        let previous = state.jobs.get(&key).cloned();
        let stored = Job {
            status: "running".into(),
            status_description: String::new(),
            stop: false,
            version: previous.as_ref().map(|p| p.version + 1).unwrap_or(0),
            submit_time: 1_700_000_000_000_000_000,
            create_index: previous.as_ref().map(|p| p.create_index).unwrap_or(index),
            modify_index: index,
            job_modify_index: index,
            // The server never echoes the Vault token back.
            vault_token: None,
            ..job.clone()
        };
        state.jobs.insert(key, stored);
        Ok(JobRegisterResponse {
            eval_id: format!("eval-{}", index),
            job_modify_index: index,
            warnings: String::new(),
        })
    }

    async fn job_deregister(&self, id: &str, namespace: &str, purge: bool) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.enter(Call::JobDeregister(
            id.to_string(),
            namespace.to_string(),
            purge,
        ))?;
        let index = state.next_index();
        let key = (namespace.to_string(), id.to_string());
        if purge {
            return state
                .jobs
                .remove(&key)
                .map(|_| ())
                .ok_or_else(|| not_found("job", id));
        }
        let job = state
            .jobs
            .get_mut(&key)
            .ok_or_else(|| not_found("job", id))?;
        job.stop = true;
        job.status = "dead".into();
        job.modify_index = index;
        Ok(())
    }
}

/// A running deployment with one canary task group.
pub fn running_deployment(id: &str) -> Deployment {
    let mut task_groups = BTreeMap::new();
    task_groups.insert(
        "web".to_string(),
        DeploymentTaskGroup {
            auto_revert: true,
            promoted: false,
            placed_canaries: vec!["alloc-1".into()],
            desired_canaries: 1,
            desired_total: 3,
            placed_allocs: 2,
            healthy_allocs: 2,
            unhealthy_allocs: 0,
        },
    );
    Deployment {
        id: id.to_string(),
        namespace: DEFAULT_NAMESPACE.to_string(),
        job_id: "web".into(),
        job_version: 2,
        job_modify_index: 30,
        job_create_index: 10,
        task_groups,
        status: "running".into(),
        status_description: "Deployment is running".into(),
        create_index: 31,
        modify_index: 31,
    }
}
