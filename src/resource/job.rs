//! Job adapter.
//!
//! A job is registered as a whole: create and update both send the full
//! job document to the register endpoint. Identity is the job ID plus its
//! namespace. A job that has been stopped but not purged is treated as
//! gone, so a stop issued out of band shows up as a missing entity.

use crate::backend::JobApi;
use crate::diff::{diff_fields, FieldDrift};
use crate::error::ReconcileError;
use crate::resource::{deleted, existence, fetched, require_non_empty, ResourceAdapter};
use crate::types::{
    EntityKind, Identity, Job, Operation, Task, TaskGroup, TaskResources, DEFAULT_NAMESPACE,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

pub const DEFAULT_JOB_TYPE: &str = "service";
pub const DEFAULT_PRIORITY: u8 = 50;
const JOB_TYPES: [&str; 4] = ["service", "batch", "system", "sysbatch"];

/// Desired state for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Display name; the ID when unset.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(rename = "type", default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub all_at_once: Option<bool>,
    pub datacenters: Vec<String>,
    #[serde(default)]
    pub meta: Option<BTreeMap<String, String>>,
    pub task_groups: Vec<TaskGroupSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGroupSpec {
    pub name: String,
    /// Defaults to 1.
    #[serde(default)]
    pub count: Option<u32>,
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub meta: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub driver: String,
    /// Driver-specific configuration, passed through untouched.
    #[serde(default)]
    pub config: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub resources: Option<TaskResourcesSpec>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResourcesSpec {
    #[serde(default)]
    pub cpu: Option<u32>,
    #[serde(default)]
    pub memory_mb: Option<u32>,
}

impl JobSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            namespace: None,
            name: None,
            region: None,
            job_type: None,
            priority: None,
            all_at_once: None,
            datacenters: Vec::new(),
            meta: None,
            task_groups: Vec::new(),
        }
    }

    pub fn namespace_or_default(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenters.push(datacenter.into());
        self
    }

    pub fn with_task_group(mut self, group: TaskGroupSpec) -> Self {
        self.task_groups.push(group);
        self
    }
}

impl TaskGroupSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: None,
            tasks: Vec::new(),
            meta: None,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            config: None,
            env: None,
            resources: None,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn with_resources(mut self, cpu: u32, memory_mb: u32) -> Self {
        self.resources = Some(TaskResourcesSpec {
            cpu: Some(cpu),
            memory_mb: Some(memory_mb),
        });
        self
    }
}

// ═══════════════════════════════════════════════════════════════════
// OBSERVED PROJECTION
// ═══════════════════════════════════════════════════════════════════

/// `None` when the desired side exists and left the field unset.
fn keep<T, U>(want: Option<&Option<U>>, value: T) -> Option<T> {
    match want {
        Some(None) => None,
        _ => Some(value),
    }
}

/// Project an observed job into the desired shape, dropping every nested
/// field the desired record leaves to server defaults. Task groups and tasks
/// are matched by name; unmatched ones are projected in full.
fn observed_view(desired: &JobSpec, job: &Job) -> JobSpec {
    JobSpec {
        id: job.id.clone(),
        namespace: keep(Some(&desired.namespace), job.namespace.clone()),
        name: keep(Some(&desired.name), job.name.clone()),
        region: keep(Some(&desired.region), job.region.clone()),
        job_type: keep(Some(&desired.job_type), job.job_type.clone()),
        priority: keep(Some(&desired.priority), job.priority),
        all_at_once: keep(Some(&desired.all_at_once), job.all_at_once),
        datacenters: job.datacenters.clone(),
        meta: keep(Some(&desired.meta), job.meta.clone()),
        task_groups: job
            .task_groups
            .iter()
            .map(|tg| {
                let want = desired.task_groups.iter().find(|d| d.name == tg.name);
                group_view(want, tg)
            })
            .collect(),
    }
}

fn group_view(want: Option<&TaskGroupSpec>, tg: &TaskGroup) -> TaskGroupSpec {
    TaskGroupSpec {
        name: tg.name.clone(),
        count: keep(want.map(|w| &w.count), tg.count),
        tasks: tg
            .tasks
            .iter()
            .map(|task| {
                let want_task = want.and_then(|w| w.tasks.iter().find(|t| t.name == task.name));
                task_view(want_task, task)
            })
            .collect(),
        meta: keep(want.map(|w| &w.meta), tg.meta.clone()),
    }
}

fn task_view(want: Option<&TaskSpec>, task: &Task) -> TaskSpec {
    let want_resources = want.map(|w| &w.resources);
    let resources = keep(want_resources, ()).map(|_| {
        let inner = want_resources.and_then(|r| r.as_ref());
        TaskResourcesSpec {
            cpu: keep(inner.map(|r| &r.cpu), task.resources.cpu),
            memory_mb: keep(inner.map(|r| &r.memory_mb), task.resources.memory_mb),
        }
    });
    TaskSpec {
        name: task.name.clone(),
        driver: task.driver.clone(),
        config: keep(want.map(|w| &w.config), task.config.clone()),
        env: keep(want.map(|w| &w.env), task.env.clone()),
        resources,
    }
}

// ═══════════════════════════════════════════════════════════════════
// ADAPTER
// ═══════════════════════════════════════════════════════════════════

pub struct JobAdapter<'a, B: JobApi> {
    backend: &'a B,
    vault_token: Option<String>,
    purge_on_destroy: bool,
}

impl<'a, B: JobApi> JobAdapter<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            vault_token: None,
            purge_on_destroy: true,
        }
    }

    /// Vault token attached to every registration.
    pub fn with_vault_token(mut self, token: Option<String>) -> Self {
        self.vault_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Purge the job on delete instead of only stopping it.
    pub fn with_purge_on_destroy(mut self, purge: bool) -> Self {
        self.purge_on_destroy = purge;
        self
    }

    /// Full registration document, with defaults filled in.
    fn build_job(&self, id: &Identity, spec: &JobSpec) -> Job {
        Job {
            id: id.id.clone(),
            name: spec.name.clone().unwrap_or_else(|| id.id.clone()),
            namespace: id.namespace_or_default().to_string(),
            region: spec.region.clone().unwrap_or_default(),
            job_type: spec
                .job_type
                .clone()
                .unwrap_or_else(|| DEFAULT_JOB_TYPE.to_string()),
            priority: spec.priority.unwrap_or(DEFAULT_PRIORITY),
            all_at_once: spec.all_at_once.unwrap_or(false),
            datacenters: spec.datacenters.clone(),
            task_groups: spec.task_groups.iter().map(build_group).collect(),
            meta: spec.meta.clone().unwrap_or_default(),
            vault_token: self.vault_token.clone(),
            ..Default::default()
        }
    }

    async fn register(
        &self,
        id: &Identity,
        spec: &JobSpec,
        action: Operation,
    ) -> Result<(), ReconcileError> {
        self.validate(spec)?;
        let job = self.build_job(id, spec);
        let response = self
            .backend
            .job_register(&job)
            .await
            .map_err(|e| ReconcileError::remote(EntityKind::Job, id.to_string(), action, e))?;
        if !response.warnings.is_empty() {
            warn!(%id, warnings = %response.warnings, "job registered with warnings");
        }
        info!(
            %id,
            %action,
            eval_id = %response.eval_id,
            job_modify_index = response.job_modify_index,
            "job registered"
        );
        Ok(())
    }
}

fn build_group(group: &TaskGroupSpec) -> TaskGroup {
    TaskGroup {
        name: group.name.clone(),
        count: group.count.unwrap_or(1),
        tasks: group.tasks.iter().map(build_task).collect(),
        meta: group.meta.clone().unwrap_or_default(),
    }
}

fn build_task(task: &TaskSpec) -> Task {
    let resources = task.resources.unwrap_or_default();
    Task {
        name: task.name.clone(),
        driver: task.driver.clone(),
        config: task.config.clone().unwrap_or_default(),
        env: task.env.clone().unwrap_or_default(),
        resources: TaskResources {
            cpu: resources.cpu.unwrap_or(100),
            memory_mb: resources.memory_mb.unwrap_or(300),
        },
    }
}

fn invalid(msg: String) -> ReconcileError {
    ReconcileError::InvalidSpec(msg)
}

impl<'a, B: JobApi> ResourceAdapter for JobAdapter<'a, B> {
    const KIND: EntityKind = EntityKind::Job;

    type Spec = JobSpec;
    type Observed = Job;

    fn spec_identity(spec: &JobSpec) -> Option<Identity> {
        Some(Identity::namespaced(
            spec.id.clone(),
            spec.namespace_or_default(),
        ))
    }

    fn validate(&self, spec: &JobSpec) -> Result<(), ReconcileError> {
        require_non_empty("id", &spec.id)?;
        if spec.id.chars().any(char::is_whitespace) {
            return Err(invalid(format!("job ID {:?} contains whitespace", spec.id)));
        }
        if let Some(job_type) = &spec.job_type {
            if !JOB_TYPES.contains(&job_type.as_str()) {
                return Err(invalid(format!("unknown job type {:?}", job_type)));
            }
        }
        if let Some(priority) = spec.priority {
            if !(1..=100).contains(&priority) {
                return Err(invalid(format!("priority {} outside 1-100", priority)));
            }
        }
        if spec.datacenters.is_empty() {
            return Err(invalid("job needs at least one datacenter".into()));
        }
        if spec.task_groups.is_empty() {
            return Err(invalid("job needs at least one task group".into()));
        }

        let mut groups = BTreeSet::new();
        for group in &spec.task_groups {
            require_non_empty("task_groups.name", &group.name)?;
            if !groups.insert(group.name.as_str()) {
                return Err(invalid(format!("duplicate task group {:?}", group.name)));
            }
            if group.tasks.is_empty() {
                return Err(invalid(format!("task group {:?} has no tasks", group.name)));
            }
            let mut tasks = BTreeSet::new();
            for task in &group.tasks {
                require_non_empty("tasks.name", &task.name)?;
                require_non_empty("tasks.driver", &task.driver)?;
                if !tasks.insert(task.name.as_str()) {
                    return Err(invalid(format!(
                        "duplicate task {:?} in group {:?}",
                        task.name, group.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn drift(&self, desired: &JobSpec, observed: &Job) -> Result<Vec<FieldDrift>, ReconcileError> {
        diff_fields(desired, &observed_view(desired, observed))
    }

    async fn exists(&self, id: &Identity) -> Result<bool, ReconcileError> {
        match self
            .backend
            .job_info(&id.id, id.namespace_or_default())
            .await
        {
            Ok(job) if job.stop => {
                debug!(%id, "job is stopped; reporting absent");
                Ok(false)
            }
            other => existence(Self::KIND, id, other),
        }
    }

    async fn read(&self, id: &Identity) -> Result<Job, ReconcileError> {
        let job = fetched(
            Self::KIND,
            id,
            self.backend.job_info(&id.id, id.namespace_or_default()).await,
        )?;
        if job.stop {
            debug!(%id, status = %job.status, "job is stopped; reporting absent");
            return Err(ReconcileError::NotFound {
                kind: Self::KIND,
                id: id.to_string(),
                action: Operation::Read,
            });
        }
        Ok(job)
    }

    async fn create(&self, spec: &JobSpec) -> Result<Identity, ReconcileError> {
        let id = Identity::namespaced(spec.id.clone(), spec.namespace_or_default());
        self.register(&id, spec, Operation::Create).await?;
        Ok(id)
    }

    async fn update(&self, id: &Identity, spec: &JobSpec) -> Result<bool, ReconcileError> {
        self.register(id, spec, Operation::Update).await?;
        Ok(true)
    }

    async fn delete(&self, id: &Identity) -> Result<(), ReconcileError> {
        deleted(
            Self::KIND,
            id,
            self.backend
                .job_deregister(&id.id, id.namespace_or_default(), self.purge_on_destroy)
                .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeBackend};
    use serde_json::json;

    fn web() -> JobSpec {
        JobSpec::new("web").with_datacenter("dc1").with_task_group(
            TaskGroupSpec::new("frontend").with_count(2).with_task(
                TaskSpec::new("nginx", "docker").with_config("image", json!("nginx:1.25")),
            ),
        )
    }

    #[test]
    fn test_defaults_fill_registration() {
        let backend = FakeBackend::new();
        let adapter = JobAdapter::new(&backend);
        let job = adapter.build_job(&Identity::namespaced("web", "default"), &web());
        assert_eq!(job.name, "web");
        assert_eq!(job.namespace, "default");
        assert_eq!(job.job_type, "service");
        assert_eq!(job.priority, 50);
        assert_eq!(job.task_groups[0].count, 2);
        assert_eq!(job.task_groups[0].tasks[0].resources.cpu, 100);
        assert!(job.vault_token.is_none());
    }

    #[test]
    fn test_vault_token_is_attached() {
        let backend = FakeBackend::new();
        let adapter = JobAdapter::new(&backend).with_vault_token(Some("s.abc".into()));
        let job = adapter.build_job(&Identity::namespaced("web", "default"), &web());
        assert_eq!(job.vault_token.as_deref(), Some("s.abc"));

        let adapter = JobAdapter::new(&backend).with_vault_token(Some(String::new()));
        let job = adapter.build_job(&Identity::namespaced("web", "default"), &web());
        assert!(job.vault_token.is_none());
    }

    #[test]
    fn test_job_validation() {
        let backend = FakeBackend::new();
        let adapter = JobAdapter::new(&backend);
        assert!(adapter.validate(&web()).is_ok());

        let mut spec = web();
        spec.datacenters.clear();
        assert!(adapter.validate(&spec).is_err());

        let mut spec = web();
        spec.priority = Some(0);
        assert!(adapter.validate(&spec).is_err());

        let mut spec = web();
        spec.job_type = Some("daemon".into());
        assert!(adapter.validate(&spec).is_err());

        let spec = web().with_task_group(TaskGroupSpec::new("frontend").with_task(TaskSpec::new("x", "exec")));
        let err = adapter.validate(&spec).unwrap_err();
        assert!(err.to_string().contains("duplicate task group"));

        let spec = web().with_task_group(TaskGroupSpec::new("api"));
        assert!(adapter.validate(&spec).is_err());
    }

    #[tokio::test]
    async fn test_register_then_read_has_no_drift() {
        let backend = FakeBackend::new();
        let adapter = JobAdapter::new(&backend);

        let id = adapter.create(&web()).await.unwrap();
        assert_eq!(id, Identity::namespaced("web", "default"));

        let job = adapter.read(&id).await.unwrap();
        assert_eq!(job.status, "running");
        assert_eq!(job.version, 0);
        // server-filled resources are not compared when left unset
        assert!(adapter.drift(&web(), &job).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_band_scale_is_drift() {
        let backend = FakeBackend::new();
        let adapter = JobAdapter::new(&backend);
        let id = adapter.create(&web()).await.unwrap();

        backend.edit_job("web", "default", |job| job.task_groups[0].count = 5);
        let job = adapter.read(&id).await.unwrap();
        let drift = adapter.drift(&web(), &job).unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].field, "task_groups");
    }

    #[tokio::test]
    async fn test_update_reregisters_same_identity() {
        let backend = FakeBackend::new();
        let adapter = JobAdapter::new(&backend);
        let id = adapter.create(&web()).await.unwrap();

        let mut desired = web();
        desired.task_groups[0].count = Some(4);
        adapter.update(&id, &desired).await.unwrap();

        let job = adapter.read(&id).await.unwrap();
        assert_eq!(job.version, 1);
        assert_eq!(job.task_groups[0].count, 4);
    }

    #[tokio::test]
    async fn test_delete_purges_by_default() {
        let backend = FakeBackend::new();
        let adapter = JobAdapter::new(&backend);
        let id = adapter.create(&web()).await.unwrap();

        adapter.delete(&id).await.unwrap();
        assert!(backend.job("web", "default").is_none());
        assert!(backend
            .mutations()
            .contains(&Call::JobDeregister("web".into(), "default".into(), true)));

        adapter.delete(&id).await.unwrap();
        assert!(!adapter.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_stopped_job_reads_as_absent() {
        let backend = FakeBackend::new();
        let adapter = JobAdapter::new(&backend).with_purge_on_destroy(false);
        let id = adapter.create(&web()).await.unwrap();

        adapter.delete(&id).await.unwrap();
        assert!(backend.job("web", "default").unwrap().stop);
        assert!(!adapter.exists(&id).await.unwrap());
        assert!(adapter.read(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_namespaced_identity() {
        let backend = FakeBackend::new();
        let adapter = JobAdapter::new(&backend);
        let id = adapter.create(&web().with_namespace("prod")).await.unwrap();
        assert_eq!(id.to_string(), "prod/web");
        assert!(backend.job("web", "prod").is_some());
        assert!(backend.job("web", "default").is_none());
    }
}
