//! End-to-end reconcile passes against the recording fake backend.

use nomad_reconcile::testing::{running_deployment, Call, FakeBackend};
use nomad_reconcile::{
    AclPolicy, AclPolicyAdapter, AclPolicySpec, AclTokenAdapter, AclTokenSpec, ClientError,
    DeploymentAdapter, DeploymentSpec, EntityKind, Identity, JobAdapter, JobSpec,
    MemoryStateStore, Phase, PlanAction, QuotaAdapter, QuotaSpec, ReconcileConfig,
    ReconcileError, Reconciler, ResourceAdapter, StateStore, TaskGroupSpec, TaskSpec,
};

fn admin_policy() -> AclPolicy {
    AclPolicy {
        name: "admin".into(),
        description: "operators".into(),
        rules: r#"namespace "*" { policy = "write" }"#.into(),
        create_index: 5,
        modify_index: 5,
    }
}

#[tokio::test]
async fn test_resume_running_deployment_issues_single_unpause() {
    let backend = FakeBackend::new().with_deployment(running_deployment("dep-1"));
    let reconciler = Reconciler::new(DeploymentAdapter::new(&backend), Default::default());

    let mut tracked = reconciler.track(DeploymentSpec::new("dep-1", "resume")).unwrap();
    let outcome = reconciler.reconcile(&mut tracked).await.unwrap();

    assert_eq!(outcome.action, PlanAction::Create);
    assert_eq!(outcome.identity, Identity::new("dep-1"));
    assert_eq!(
        backend.mutations(),
        vec![Call::DeploymentPause("dep-1".into(), false)]
    );

    let observed = tracked.observed.as_ref().unwrap();
    assert_eq!(observed.id, "dep-1");
    assert_eq!(observed.status, "running");
    assert_eq!(observed.job_id, "web");
    assert_eq!(observed.task_groups[0].name, "web");
}

#[tokio::test]
async fn test_exists_on_missing_deployment_is_false() {
    let backend = FakeBackend::new();
    let adapter = DeploymentAdapter::new(&backend);

    let exists = adapter.exists(&Identity::new("dep-404")).await.unwrap();
    assert!(!exists);
    assert_eq!(backend.calls(), vec![Call::DeploymentInfo("dep-404".into())]);
}

#[tokio::test]
async fn test_delete_policy_removed_out_of_band() {
    let backend = FakeBackend::new().with_policy(admin_policy());
    let reconciler = Reconciler::new(AclPolicyAdapter::new(&backend), Default::default());

    let mut tracked = reconciler
        .track(
            AclPolicySpec::new("admin", r#"namespace "*" { policy = "write" }"#)
                .with_description("operators"),
        )
        .unwrap();
    tracked.bind(Identity::new("admin"), admin_policy());

    backend.remove_policy("admin");
    reconciler.delete(&mut tracked).await.unwrap();

    assert_eq!(tracked.phase, Phase::Absent);
    assert!(tracked.observed.is_none());
}

#[tokio::test]
async fn test_remote_errors_carry_context() {
    let backend = FakeBackend::new();
    let reconciler = Reconciler::new(QuotaAdapter::new(&backend), Default::default());
    let mut tracked = reconciler
        .track(QuotaSpec::new("team-a").with_limit("global", Some(2500), Some(1024)))
        .unwrap();

    backend.fail_next(ClientError::Api {
        status: 403,
        body: "Permission denied".into(),
    });
    let err = reconciler.reconcile(&mut tracked).await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("team-a"), "{message}");
    assert!(message.contains("Permission denied"), "{message}");
    assert!(!err.is_recoverable());
    assert_eq!(tracked.phase, Phase::Unbound);
}

#[tokio::test]
async fn test_all_kinds_share_one_backend() {
    let backend = FakeBackend::new();
    let store = MemoryStateStore::new();

    let policies =
        Reconciler::new(AclPolicyAdapter::new(&backend), Default::default()).with_store(&store);
    let tokens =
        Reconciler::new(AclTokenAdapter::new(&backend), Default::default()).with_store(&store);
    let quotas =
        Reconciler::new(QuotaAdapter::new(&backend), Default::default()).with_store(&store);
    let jobs = Reconciler::new(JobAdapter::new(&backend), Default::default()).with_store(&store);

    let mut policy = policies
        .track(AclPolicySpec::new("readonly", r#"namespace "*" { policy = "read" }"#))
        .unwrap();
    let mut token = tokens
        .track(AclTokenSpec::client(["readonly"]).with_name("ci"))
        .unwrap();
    let mut quota = quotas
        .track(QuotaSpec::new("team-a").with_limit("global", Some(2500), None))
        .unwrap();
    let mut job = jobs
        .track(
            JobSpec::new("web").with_datacenter("dc1").with_task_group(
                TaskGroupSpec::new("web").with_task(TaskSpec::new("server", "docker")),
            ),
        )
        .unwrap();

    assert_eq!(policies.reconcile(&mut policy).await.unwrap().action, PlanAction::Create);
    assert_eq!(tokens.reconcile(&mut token).await.unwrap().action, PlanAction::Create);
    assert_eq!(quotas.reconcile(&mut quota).await.unwrap().action, PlanAction::Create);
    assert_eq!(jobs.reconcile(&mut job).await.unwrap().action, PlanAction::Create);
    assert_eq!(store.len().await, 4);

    // A second pass over everything is quiet.
    backend.clear_calls();
    assert_eq!(policies.reconcile(&mut policy).await.unwrap().action, PlanAction::Noop);
    assert_eq!(tokens.reconcile(&mut token).await.unwrap().action, PlanAction::Noop);
    assert_eq!(quotas.reconcile(&mut quota).await.unwrap().action, PlanAction::Noop);
    assert_eq!(jobs.reconcile(&mut job).await.unwrap().action, PlanAction::Noop);
    assert!(backend.mutations().is_empty());

    // The token's identity came from the server.
    let accessor = token.identity.clone().unwrap();
    assert!(backend.token(&accessor.id).is_some());
    let stored = store.load(EntityKind::AclToken, &accessor).await.unwrap();
    assert!(stored.is_some());
}

#[tokio::test]
async fn test_forget_vanished_job_when_recreation_disabled() {
    let backend = FakeBackend::new();
    let reconciler = Reconciler::new(
        JobAdapter::new(&backend),
        ReconcileConfig {
            recreate_missing: false,
        },
    );
    let mut tracked = reconciler
        .track(
            JobSpec::new("batch-1")
                .with_datacenter("dc1")
                .with_task_group(
                    TaskGroupSpec::new("work").with_task(TaskSpec::new("run", "exec")),
                ),
        )
        .unwrap();
    reconciler.reconcile(&mut tracked).await.unwrap();

    backend.remove_job("batch-1", "default");
    backend.clear_calls();

    let outcome = reconciler.reconcile(&mut tracked).await.unwrap();
    assert_eq!(outcome.action, PlanAction::Forget);
    assert!(backend.mutations().is_empty());

    let err = reconciler.update(&mut tracked).await.unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidState(_)));
}

#[cfg(feature = "file-storage")]
#[tokio::test]
async fn test_restore_from_file_store() {
    use nomad_reconcile::FileStateStore;

    let root = std::env::temp_dir().join(format!("nomad-reconcile-it-{}", rand::random::<u32>()));
    let store = FileStateStore::new(root.clone()).await.unwrap();
    let backend = FakeBackend::new();

    {
        let reconciler =
            Reconciler::new(AclPolicyAdapter::new(&backend), Default::default()).with_store(&store);
        let mut tracked = reconciler.track(AclPolicySpec::new("admin", "r1")).unwrap();
        reconciler.reconcile(&mut tracked).await.unwrap();
    }

    // A later run picks up where the first one stopped.
    let reconciler =
        Reconciler::new(AclPolicyAdapter::new(&backend), Default::default()).with_store(&store);
    let mut restored = reconciler
        .restore(&Identity::new("admin"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.phase, Phase::BoundClean);

    restored.set_desired(AclPolicySpec::new("admin", "r2")).unwrap();
    let outcome = reconciler.reconcile(&mut restored).await.unwrap();
    assert_eq!(outcome.action, PlanAction::Update);
    assert_eq!(backend.policy("admin").unwrap().rules, "r2");

    let _ = tokio::fs::remove_dir_all(root).await;
}
