//! Reconciliation driver.
//!
//! The driver walks one tracked identity through its lifecycle using an
//! adapter. It holds no state of its own between calls: everything lives in
//! the [`TrackedResource`] the caller passes in, and optionally in a
//! [`StateStore`] that is written after every successful step.

use crate::config::ReconcileConfig;
use crate::diff::{FieldDrift, PlanAction};
use crate::error::ReconcileError;
use crate::resource::ResourceAdapter;
use crate::state::{Phase, Tracked, TrackedResource};
use crate::store::{StateStore, StoredRecord};
use crate::types::{Identity, Operation};
use tracing::{debug, info, warn};

/// What one reconcile pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub action: PlanAction,
    /// Identity after the pass. A recreated token carries its new accessor.
    pub identity: Identity,
    /// Attributes that disagreed before the pass.
    pub drift: Vec<FieldDrift>,
}

impl Outcome {
    fn new(action: PlanAction, identity: &Identity) -> Self {
        Self {
            action,
            identity: identity.clone(),
            drift: Vec::new(),
        }
    }

    fn with_drift(mut self, drift: Vec<FieldDrift>) -> Self {
        self.drift = drift;
        self
    }
}

/// Drives one entity kind.
///
/// Parameterized by the adapter, which in turn borrows the backend.
pub struct Reconciler<'s, A: ResourceAdapter> {
    adapter: A,
    config: ReconcileConfig,
    store: Option<&'s dyn StateStore>,
}

impl<'s, A: ResourceAdapter> Reconciler<'s, A> {
    pub fn new(adapter: A, config: ReconcileConfig) -> Self {
        Self {
            adapter,
            config,
            store: None,
        }
    }

    /// Persist bound records to `store` after every successful step.
    pub fn with_store(mut self, store: &'s dyn StateStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Validate a desired record and start tracking it, unbound.
    pub fn track(&self, desired: A::Spec) -> Result<Tracked<A>, ReconcileError> {
        self.adapter.validate(&desired)?;
        TrackedResource::new(A::KIND, desired)
    }

    /// Load a previously stored record.
    ///
    /// Returns `None` without a store, or when nothing is stored under
    /// `identity`.
    pub async fn restore(&self, identity: &Identity) -> Result<Option<Tracked<A>>, ReconcileError> {
        let Some(store) = self.store else {
            return Ok(None);
        };
        match store.load(A::KIND, identity).await? {
            Some(record) => Ok(Some(record.to_tracked()?)),
            None => Ok(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // FULL PASS
    // ═══════════════════════════════════════════════════════════════

    /// Run one full pass: create, update, transition or leave alone.
    ///
    /// Errors leave `tracked` as it was, so the caller can retry the pass.
    pub async fn reconcile(&self, tracked: &mut Tracked<A>) -> Result<Outcome, ReconcileError> {
        match tracked.phase {
            Phase::Absent => Err(self.deleted_error(tracked)),
            Phase::Unbound => {
                let id = self.create(tracked).await?;
                Ok(Outcome::new(PlanAction::Create, &id))
            }
            Phase::BoundClean | Phase::BoundDirty => self.reconcile_bound(tracked).await,
        }
    }

    async fn reconcile_bound(&self, tracked: &mut Tracked<A>) -> Result<Outcome, ReconcileError> {
        self.check_identity(tracked)?;
        let id = tracked.require_identity()?.clone();

        // The read doubles as the existence check.
        let observed = match self.adapter.read(&id).await {
            Ok(observed) => observed,
            Err(e) if e.is_not_found() => return self.handle_missing(tracked, id).await,
            Err(e) => return Err(e),
        };

        if A::TRANSITION_ONLY {
            if !tracked.is_dirty() {
                tracked.observe(observed);
                self.persist(tracked).await?;
                debug!(kind = %A::KIND, %id, "no transition requested; status refreshed");
                return Ok(Outcome::new(PlanAction::Noop, &id));
            }
            if !self.apply_update(tracked, &id).await? {
                debug!(kind = %A::KIND, %id, "nothing to apply");
                return Ok(Outcome::new(PlanAction::Noop, &id));
            }
            info!(kind = %A::KIND, %id, action = "transition", "reconciled");
            return Ok(Outcome::new(PlanAction::Transition, &id));
        }

        let drift = self.adapter.drift(&tracked.desired, &observed)?;

        if drift.is_empty() {
            // Already matches; a dirty record only needed confirming.
            tracked.settle(observed);
            self.persist(tracked).await?;
            debug!(kind = %A::KIND, %id, "in sync");
            return Ok(Outcome::new(PlanAction::Noop, &id));
        }

        for d in &drift {
            debug!(kind = %A::KIND, %id, field = %d.field, "drift");
        }
        self.apply_update(tracked, &id).await?;
        info!(kind = %A::KIND, %id, fields = drift.len(), action = "update", "reconciled");
        Ok(Outcome::new(PlanAction::Update, &id).with_drift(drift))
    }

    async fn handle_missing(
        &self,
        tracked: &mut Tracked<A>,
        id: Identity,
    ) -> Result<Outcome, ReconcileError> {
        if A::TRANSITION_ONLY || !self.config.recreate_missing {
            warn!(kind = %A::KIND, %id, "gone out of band; forgetting");
            tracked.mark_absent();
            self.forget(&id).await?;
            return Ok(Outcome::new(PlanAction::Forget, &id));
        }

        warn!(kind = %A::KIND, %id, "gone out of band; recreating");
        self.adapter.validate(&tracked.desired)?;
        let new_id = self.adapter.create(&tracked.desired).await?;
        if new_id != id {
            self.forget(&id).await?;
        }
        self.bind_created(tracked, new_id.clone()).await?;
        info!(kind = %A::KIND, id = %new_id, action = "recreate", "reconciled");
        Ok(Outcome::new(PlanAction::Recreate, &new_id))
    }

    // ═══════════════════════════════════════════════════════════════
    // SINGLE OPERATIONS
    // ═══════════════════════════════════════════════════════════════

    /// Create the entity and bind its identity. Unbound records only.
    pub async fn create(&self, tracked: &mut Tracked<A>) -> Result<Identity, ReconcileError> {
        if tracked.phase != Phase::Unbound {
            return Err(ReconcileError::InvalidState(format!(
                "{} {} is {}; only unbound records can be created",
                A::KIND,
                tracked.identity_label(),
                tracked.phase.name()
            )));
        }
        self.adapter.validate(&tracked.desired)?;

        let id = self.adapter.create(&tracked.desired).await?;
        self.bind_created(tracked, id.clone()).await?;
        info!(kind = %A::KIND, %id, action = "create", "reconciled");
        Ok(id)
    }

    /// Refresh the observed snapshot. Absence is an error, including for a
    /// record this driver already deleted.
    pub async fn read(&self, tracked: &mut Tracked<A>) -> Result<A::Observed, ReconcileError> {
        if tracked.phase == Phase::Absent {
            return Err(ReconcileError::NotFound {
                kind: A::KIND,
                id: tracked.identity_label(),
                action: Operation::Read,
            });
        }
        let id = self.require_bound(tracked)?;
        let observed = self.adapter.read(&id).await?;
        tracked.observe(observed.clone());
        self.persist(tracked).await?;
        Ok(observed)
    }

    /// Apply the current desired record to a bound entity.
    pub async fn update(&self, tracked: &mut Tracked<A>) -> Result<(), ReconcileError> {
        let id = self.require_bound(tracked)?;
        self.check_identity(tracked)?;
        self.apply_update(tracked, &id).await?;
        info!(kind = %A::KIND, %id, action = "update", "applied");
        Ok(())
    }

    /// Delete the entity. Already gone counts as deleted, and deleting an
    /// absent record issues no call.
    pub async fn delete(&self, tracked: &mut Tracked<A>) -> Result<(), ReconcileError> {
        if tracked.phase == Phase::Absent {
            debug!(kind = %A::KIND, id = %tracked.identity_label(), "already absent");
            return Ok(());
        }
        let id = self.require_bound(tracked)?;
        self.adapter.delete(&id).await?;
        tracked.mark_absent();
        self.forget(&id).await?;
        info!(kind = %A::KIND, %id, action = "delete", "applied");
        Ok(())
    }

    /// Whether the tracked entity exists remotely. Unbound and absent
    /// records never do.
    pub async fn exists(&self, tracked: &Tracked<A>) -> Result<bool, ReconcileError> {
        match (&tracked.phase, &tracked.identity) {
            (Phase::Absent, _) | (_, None) => Ok(false),
            (_, Some(id)) => self.adapter.exists(id).await,
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════

    /// Returns whether the adapter sent anything.
    async fn apply_update(&self, tracked: &mut Tracked<A>, id: &Identity) -> Result<bool, ReconcileError> {
        self.adapter.validate(&tracked.desired)?;
        let applied = self.adapter.update(id, &tracked.desired).await?;
        let observed = self.adapter.read(id).await?;
        tracked.settle(observed);
        self.persist(tracked).await?;
        Ok(applied)
    }

    /// Read back a freshly created entity and bind it.
    ///
    /// If the read fails the identity is still kept, so the next pass does
    /// not create a duplicate.
    async fn bind_created(&self, tracked: &mut Tracked<A>, id: Identity) -> Result<(), ReconcileError> {
        match self.adapter.read(&id).await {
            Ok(observed) => {
                tracked.bind(id, observed);
                self.persist(tracked).await
            }
            Err(e) => {
                warn!(kind = %A::KIND, %id, error = %e, "created but read-back failed");
                tracked.bind_pending(id);
                self.persist(tracked).await?;
                Err(e)
            }
        }
    }

    fn require_bound(&self, tracked: &Tracked<A>) -> Result<Identity, ReconcileError> {
        match tracked.phase {
            Phase::BoundClean | Phase::BoundDirty => Ok(tracked.require_identity()?.clone()),
            Phase::Absent => Err(self.deleted_error(tracked)),
            Phase::Unbound => Err(ReconcileError::InvalidState(format!(
                "{} is not created yet",
                A::KIND
            ))),
        }
    }

    /// The desired record must still name the bound entity.
    fn check_identity(&self, tracked: &Tracked<A>) -> Result<(), ReconcileError> {
        let (Some(want), Some(have)) = (A::spec_identity(&tracked.desired), &tracked.identity) else {
            return Ok(());
        };
        if &want != have {
            return Err(ReconcileError::InvalidState(format!(
                "{} identity is immutable: tracked {}, desired {}",
                A::KIND,
                have,
                want
            )));
        }
        Ok(())
    }

    fn deleted_error(&self, tracked: &Tracked<A>) -> ReconcileError {
        ReconcileError::InvalidState(format!(
            "{} {} was deleted; start a new record",
            A::KIND,
            tracked.identity_label()
        ))
    }

    async fn persist(&self, tracked: &Tracked<A>) -> Result<(), ReconcileError> {
        if let Some(store) = self.store {
            store.save(&StoredRecord::from_tracked(tracked)?).await?;
        }
        Ok(())
    }

    async fn forget(&self, id: &Identity) -> Result<(), ReconcileError> {
        if let Some(store) = self.store {
            store.delete(A::KIND, id).await?;
        }
        Ok(())
    }
}
