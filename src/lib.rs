//! Nomad Reconcile Library
//!
//! Trait-based desired-state reconciliation for HashiCorp Nomad: deployments,
//! ACL policies, ACL tokens, quota specifications and jobs.
//!
//! # Design
//!
//! The library holds the reconciliation logic without coupling to a specific
//! transport or persistence. Remote calls go through the [`backend`] traits;
//! [`NomadClient`] implements them over the HTTP API, and you can bring your
//! own. Each entity kind has a [`ResourceAdapter`], and the [`Reconciler`]
//! drives a [`TrackedResource`] through Unbound, BoundClean, BoundDirty and
//! Absent.
//!
//! # Usage
//!
//! ```ignore
//! use nomad_reconcile::{
//!     ClientConfig, DeploymentAdapter, DeploymentSpec, NomadClient, PlanAction, Reconciler,
//! };
//!
//! let client = NomadClient::new(&ClientConfig::from_env())?;
//! let reconciler = Reconciler::new(DeploymentAdapter::new(&client), Default::default());
//!
//! let mut tracked = reconciler.track(DeploymentSpec::new("dep-1", "resume"))?;
//! let outcome = reconciler.reconcile(&mut tracked).await?;
//! assert_eq!(outcome.action, PlanAction::Create);
//!
//! // Later: ask for a different transition.
//! tracked.set_desired(DeploymentSpec::new("dep-1", "pause"))?;
//! reconciler.reconcile(&mut tracked).await?;
//! ```

pub mod backend;
pub mod canonical;
pub mod config;
pub mod diff;
pub mod error;
pub mod reconcile;
pub mod resource;
pub mod state;
pub mod store;
pub mod types;

#[cfg(feature = "default-client")]
pub mod client;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export the main types at crate root for convenience
pub use backend::{AclPolicyApi, AclTokenApi, DeploymentApi, JobApi, NomadBackend, QuotaApi};
pub use canonical::{fingerprint, to_canonical_json};
pub use config::{ClientConfig, ReconcileConfig};
pub use diff::{FieldDrift, PlanAction};
pub use error::{ClientError, ReconcileError};
pub use reconcile::{Outcome, Reconciler};
pub use resource::{
    AclPolicyAdapter, AclPolicySpec, AclTokenAdapter, AclTokenSpec, DeploymentAdapter,
    DeploymentSnapshot, DeploymentSpec, DeploymentTransition, JobAdapter, JobSpec,
    QuotaAdapter, QuotaLimitSpec, QuotaResourcesSpec, QuotaSpec, ResourceAdapter,
    TaskGroupProgress, TaskGroupSpec, TaskResourcesSpec, TaskSpec, TokenType, TransitionPolicy,
};
pub use state::{Phase, Tracked, TrackedResource};
#[cfg(feature = "file-storage")]
pub use store::FileStateStore;
pub use store::{MemoryStateStore, StateStore, StoredRecord};
pub use types::*;

#[cfg(feature = "default-client")]
pub use client::NomadClient;
