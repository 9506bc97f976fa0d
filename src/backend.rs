//! The remote control client, as the adapters see it.
//!
//! One capability trait per entity kind. The adapters only ever talk to
//! these traits. They don't know about HTTP, TLS, tokens, or regions. The
//! reqwest client in [`crate::client`] is one implementation; the recording
//! fake in [`crate::testing`] is another.
//!
//! Every call returns a [`ClientError`] on failure, and absence MUST be
//! reported as [`ClientError::NotFound`] so adapters can tell it apart from
//! an unreachable server.

use crate::error::ClientError;
use crate::types::*;
use std::future::Future;

/// Deployment queries and state transitions.
///
/// Deployments are created by the scheduler when a job is registered. They
/// can only be moved between phases, never replaced or removed.
pub trait DeploymentApi: Send + Sync {
    /// `GET /v1/deployment/:id`
    fn deployment_info(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Deployment, ClientError>> + Send;

    /// Mark the deployment failed.
    fn deployment_fail(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<DeploymentUpdateResponse, ClientError>> + Send;

    /// Pause (`true`) or resume (`false`) the deployment.
    fn deployment_pause(
        &self,
        id: &str,
        pause: bool,
    ) -> impl Future<Output = Result<DeploymentUpdateResponse, ClientError>> + Send;

    /// Promote canaries in every task group.
    fn deployment_promote_all(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<DeploymentUpdateResponse, ClientError>> + Send;
}

/// ACL policy CRUD. Policies are addressed by name; upsert creates or replaces.
pub trait AclPolicyApi: Send + Sync {
    fn acl_policy_info(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<AclPolicy, ClientError>> + Send;

    fn acl_policy_upsert(
        &self,
        policy: &AclPolicy,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn acl_policy_delete(&self, name: &str) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// ACL token CRUD. The server assigns accessor and secret IDs on create.
pub trait AclTokenApi: Send + Sync {
    fn acl_token_info(
        &self,
        accessor_id: &str,
    ) -> impl Future<Output = Result<AclToken, ClientError>> + Send;

    /// Create a token. `accessor_id` must be empty; the response carries it.
    fn acl_token_create(
        &self,
        token: &AclToken,
    ) -> impl Future<Output = Result<AclToken, ClientError>> + Send;

    /// Replace an existing token addressed by `token.accessor_id`.
    fn acl_token_update(
        &self,
        token: &AclToken,
    ) -> impl Future<Output = Result<AclToken, ClientError>> + Send;

    fn acl_token_delete(
        &self,
        accessor_id: &str,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Quota specification CRUD (Nomad Enterprise).
pub trait QuotaApi: Send + Sync {
    fn quota_info(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<QuotaSpecification, ClientError>> + Send;

    fn quota_upsert(
        &self,
        spec: &QuotaSpecification,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn quota_delete(&self, name: &str) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Job registration. Register is an upsert keyed by job ID and namespace.
pub trait JobApi: Send + Sync {
    fn job_info(
        &self,
        id: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<Job, ClientError>> + Send;

    fn job_register(
        &self,
        job: &Job,
    ) -> impl Future<Output = Result<JobRegisterResponse, ClientError>> + Send;

    /// Stop the job; `purge` also removes it from the state store.
    fn job_deregister(
        &self,
        id: &str,
        namespace: &str,
        purge: bool,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Everything a full reconciler needs.
pub trait NomadBackend: DeploymentApi + AclPolicyApi + AclTokenApi + QuotaApi + JobApi {}

impl<T> NomadBackend for T where T: DeploymentApi + AclPolicyApi + AclTokenApi + QuotaApi + JobApi {}
