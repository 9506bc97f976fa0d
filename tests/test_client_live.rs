//! Live integration tests for NomadClient.
//!
//! These tests need a reachable Nomad agent. Set `NOMAD_ADDR` (and
//! `NOMAD_TOKEN` when ACLs are on) in `.env` or the environment to run them.
//! Without an address, tests skip gracefully. Nothing here mutates the
//! cluster.

#![cfg(feature = "default-client")]

use nomad_reconcile::{
    ClientConfig, DeploymentAdapter, Identity, JobAdapter, NomadClient, ResourceAdapter,
};

/// Load .env and build a client, or None to skip.
fn live_client() -> Option<NomadClient> {
    dotenvy::dotenv().ok();
    match std::env::var("NOMAD_ADDR") {
        Ok(addr) if !addr.trim().is_empty() => {}
        _ => {
            eprintln!("NOMAD_ADDR not set, skipping live test");
            return None;
        }
    }
    let config = ClientConfig::from_env();
    Some(NomadClient::new(&config).expect("client config from environment"))
}

fn random_id() -> String {
    format!("nomad-reconcile-missing-{:08x}", rand::random::<u32>())
}

#[tokio::test]
async fn test_missing_deployment_does_not_exist() -> anyhow::Result<()> {
    let Some(client) = live_client() else {
        return Ok(());
    };
    let adapter = DeploymentAdapter::new(&client);
    let id = Identity::new(random_id());

    assert!(!adapter.exists(&id).await?);

    let err = adapter.read(&id).await.unwrap_err();
    assert!(err.is_not_found(), "expected not found, got {err}");
    Ok(())
}

#[tokio::test]
async fn test_missing_job_does_not_exist() -> anyhow::Result<()> {
    let Some(client) = live_client() else {
        return Ok(());
    };
    let adapter = JobAdapter::new(&client);
    let id = Identity::namespaced(random_id(), "default");

    assert!(!adapter.exists(&id).await?);
    Ok(())
}
