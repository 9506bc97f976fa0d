//! Deployment adapter.
//!
//! Deployments are created by the scheduler, not by us. The only thing a
//! desired record can ask for is a transition: fail, pause, promote or
//! resume. Applying one issues exactly one remote call and sends no other
//! attribute. The resulting status is learned by reading back afterwards.

use crate::backend::DeploymentApi;
use crate::diff::FieldDrift;
use crate::error::ReconcileError;
use crate::resource::{existence, fetched, require_non_empty, ResourceAdapter};
use crate::types::{Deployment, EntityKind, Identity, Operation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Transition command carried in the desired record's `state` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentTransition {
    Fail,
    Pause,
    Promote,
    Resume,
}

impl DeploymentTransition {
    pub fn name(&self) -> &'static str {
        match self {
            DeploymentTransition::Fail => "fail",
            DeploymentTransition::Pause => "pause",
            DeploymentTransition::Promote => "promote",
            DeploymentTransition::Resume => "resume",
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            DeploymentTransition::Fail => Operation::Fail,
            DeploymentTransition::Pause => Operation::Pause,
            DeploymentTransition::Promote => Operation::Promote,
            DeploymentTransition::Resume => Operation::Resume,
        }
    }
}

impl fmt::Display for DeploymentTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeploymentTransition {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(DeploymentTransition::Fail),
            "pause" => Ok(DeploymentTransition::Pause),
            "promote" => Ok(DeploymentTransition::Promote),
            "resume" => Ok(DeploymentTransition::Resume),
            other => Err(ReconcileError::InvalidTransition(other.to_string())),
        }
    }
}

/// How to treat a `state` value outside the four known commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Log a warning and issue nothing.
    #[default]
    Ignore,
    /// Fail validation with [`ReconcileError::InvalidTransition`].
    Reject,
}

/// Desired state for a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    /// Deployment ID. Immutable.
    pub id: String,
    /// Transition command; write-only, never read back.
    pub state: String,
}

impl DeploymentSpec {
    pub fn new(id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: state.into(),
        }
    }
}

/// Observed deployment, flattened for tracking.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeploymentSnapshot {
    pub id: String,
    pub namespace: String,
    pub job_id: String,
    pub job_version: u64,
    pub job_modify_index: u64,
    pub job_create_index: u64,
    pub task_groups: Vec<TaskGroupProgress>,
    pub status: String,
    pub status_description: String,
    pub modify_index: u64,
    pub create_index: u64,
}

/// Rollout progress of one task group, ordered by name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskGroupProgress {
    pub name: String,
    pub placed_canaries: Vec<String>,
    pub auto_revert: bool,
    pub promoted: bool,
    pub desired_canaries: u32,
    pub desired_total: u32,
    pub placed_alloc: u32,
    pub healthy_alloc: u32,
    pub unhealthy_alloc: u32,
}

impl From<Deployment> for DeploymentSnapshot {
    fn from(dep: Deployment) -> Self {
        let task_groups = dep
            .task_groups
            .into_iter()
            .map(|(name, tg)| TaskGroupProgress {
                name,
                placed_canaries: tg.placed_canaries,
                auto_revert: tg.auto_revert,
                promoted: tg.promoted,
                desired_canaries: tg.desired_canaries,
                desired_total: tg.desired_total,
                placed_alloc: tg.placed_allocs,
                healthy_alloc: tg.healthy_allocs,
                unhealthy_alloc: tg.unhealthy_allocs,
            })
            .collect();

        Self {
            id: dep.id,
            namespace: dep.namespace,
            job_id: dep.job_id,
            job_version: dep.job_version,
            job_modify_index: dep.job_modify_index,
            job_create_index: dep.job_create_index,
            task_groups,
            status: dep.status,
            status_description: dep.status_description,
            modify_index: dep.modify_index,
            create_index: dep.create_index,
        }
    }
}

/// Adapter for deployments.
pub struct DeploymentAdapter<'a, B: DeploymentApi> {
    backend: &'a B,
    policy: TransitionPolicy,
}

impl<'a, B: DeploymentApi> DeploymentAdapter<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            policy: TransitionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Issue the transition named by `state` against deployment `id`.
    ///
    /// Returns the transition applied, or `None` when an unknown command
    /// was ignored. Never retries.
    pub async fn apply(
        &self,
        id: &str,
        state: &str,
    ) -> Result<Option<DeploymentTransition>, ReconcileError> {
        let transition = match state.parse::<DeploymentTransition>() {
            Ok(t) => t,
            Err(err) => match self.policy {
                TransitionPolicy::Ignore => {
                    warn!(id, state, "unknown deployment state; nothing applied");
                    return Ok(None);
                }
                TransitionPolicy::Reject => return Err(err),
            },
        };

        debug!(id, %transition, "applying deployment transition");
        let result = match transition {
            DeploymentTransition::Fail => self.backend.deployment_fail(id).await,
            DeploymentTransition::Pause => self.backend.deployment_pause(id, true).await,
            DeploymentTransition::Promote => self.backend.deployment_promote_all(id).await,
            DeploymentTransition::Resume => self.backend.deployment_pause(id, false).await,
        };

        let response = result.map_err(|e| {
            ReconcileError::remote(EntityKind::Deployment, id, transition.operation(), e)
        })?;
        info!(
            id,
            %transition,
            eval_id = %response.eval_id,
            "deployment transition applied"
        );
        Ok(Some(transition))
    }
}

impl<'a, B: DeploymentApi> ResourceAdapter for DeploymentAdapter<'a, B> {
    const KIND: EntityKind = EntityKind::Deployment;
    const TRANSITION_ONLY: bool = true;

    type Spec = DeploymentSpec;
    type Observed = DeploymentSnapshot;

    fn spec_identity(spec: &DeploymentSpec) -> Option<Identity> {
        Some(Identity::new(spec.id.clone()))
    }

    fn validate(&self, spec: &DeploymentSpec) -> Result<(), ReconcileError> {
        require_non_empty("id", &spec.id)?;
        if self.policy == TransitionPolicy::Reject {
            spec.state.parse::<DeploymentTransition>()?;
        }
        Ok(())
    }

    /// Deployments never drift: the only desired attribute is a command.
    fn drift(
        &self,
        _desired: &DeploymentSpec,
        _observed: &DeploymentSnapshot,
    ) -> Result<Vec<FieldDrift>, ReconcileError> {
        Ok(Vec::new())
    }

    async fn exists(&self, id: &Identity) -> Result<bool, ReconcileError> {
        debug!(%id, "checking if deployment exists");
        existence(
            Self::KIND,
            id,
            self.backend.deployment_info(&id.id).await,
        )
    }

    async fn read(&self, id: &Identity) -> Result<DeploymentSnapshot, ReconcileError> {
        debug!(%id, "reading deployment status");
        let dep = fetched(Self::KIND, id, self.backend.deployment_info(&id.id).await)?;
        Ok(dep.into())
    }

    /// Binding to a deployment is applying its first transition.
    async fn create(&self, spec: &DeploymentSpec) -> Result<Identity, ReconcileError> {
        self.validate(spec)?;
        self.apply(&spec.id, &spec.state).await?;
        Ok(Identity::new(spec.id.clone()))
    }

    /// `false` when an unknown state was ignored.
    async fn update(&self, id: &Identity, spec: &DeploymentSpec) -> Result<bool, ReconcileError> {
        self.validate(spec)?;
        Ok(self.apply(&id.id, &spec.state).await?.is_some())
    }

    /// Nomad cannot remove deployments. An active one is failed; a
    /// terminal or missing one needs nothing.
    async fn delete(&self, id: &Identity) -> Result<(), ReconcileError> {
        let dep = match self.backend.deployment_info(&id.id).await {
            Ok(dep) => dep,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => {
                return Err(ReconcileError::remote(
                    Self::KIND,
                    id.to_string(),
                    Operation::Delete,
                    e,
                ))
            }
        };

        if !dep.is_active() {
            debug!(%id, status = %dep.status, "deployment already terminal");
            return Ok(());
        }

        match self.backend.deployment_fail(&id.id).await {
            Ok(_) => {
                info!(%id, "failed active deployment on delete");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(ReconcileError::remote(
                Self::KIND,
                id.to_string(),
                Operation::Fail,
                e,
            )),
        }
    }
}
