//! SyncController - the main interface for bidsync.
//!
//! This module provides [`SyncController`], the long-lived object a UI (or
//! the CLI) holds for the duration of a session.
//!
//! # Architecture
//!
//! ```text
//! Consumer → SyncController ─┬→ Hydrator ────────┐
//!                            ├→ MutationGateway ─┼→ DataBackend
//!                            └→ Coalescer ───────┴→ DocumentIntegration
//!                                    ↓
//!                     sync-core (generations, merges, throttle)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use bidsync_client::{ClientConfig, LoggingIntegration, MockBackend, SyncController};
//!
//! let controller = SyncController::new(MockBackend::new(), LoggingIntegration, ClientConfig::default());
//! controller.bootstrap().await?;
//! controller.add_category(&project, LineCategory::new("c1", "Elektro")).await?;
//! let snapshot = controller.snapshot();
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use sync_core::{Admission, LoadMode};
use sync_types::{
    Aggregate, AggregateId, AggregateStatus, Bid, BidId, BidStatus, CategoryId, ContactEntity,
    ContactId, DetailPatch, Generation, LineCategory, Mutation, Notice, Snapshot, StatusConfig,
    SyncRequest,
};

use crate::backend::DataBackend;
use crate::coalescer::{ExternalSyncCoalescer, ShutdownReport};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::gateway::MutationGateway;
use crate::hydrator::{Hydrator, LoadOutcome};
use crate::integration::DocumentIntegration;
use crate::state::SharedState;

/// Client-side controller for one session.
///
/// Cloning is cheap and shares everything, so a refresh can be spawned
/// while another load or a mutation is in flight.
pub struct SyncController<B, I> {
    inner: Arc<ControllerInner<B, I>>,
}

struct ControllerInner<B, I> {
    backend: Arc<B>,
    config: ClientConfig,
    state: SharedState,
    hydrator: Arc<Hydrator<B>>,
    gateway: MutationGateway<B, I>,
    coalescer: ExternalSyncCoalescer<I>,
    selected: Mutex<Option<AggregateId>>,
}

impl<B, I> Clone for SyncController<B, I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: DataBackend, I: DocumentIntegration> SyncController<B, I> {
    /// Create a controller. Nothing is loaded until [`bootstrap`](Self::bootstrap).
    pub fn new(backend: B, integration: I, config: ClientConfig) -> Self {
        let backend = Arc::new(backend);
        let state = SharedState::new();
        let hydrator = Arc::new(Hydrator::new(
            Arc::clone(&backend),
            state.clone(),
            config.clone(),
        ));
        let coalescer = ExternalSyncCoalescer::new(
            Arc::new(integration),
            state.clone(),
            config.external_sync.policy(),
        );
        let gateway = MutationGateway::new(
            Arc::clone(&backend),
            state.clone(),
            Arc::clone(&hydrator),
            coalescer.clone(),
            config.writes.policy(),
        );

        Self {
            inner: Arc::new(ControllerInner {
                backend,
                config,
                state,
                hydrator,
                gateway,
                coalescer,
                selected: Mutex::new(None),
            }),
        }
    }

    /// The storage backend.
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// The active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// First load: blocks the board until the aggregate list is in.
    pub async fn bootstrap(&self) -> Result<LoadOutcome, ClientError> {
        self.load(LoadMode::Bootstrap).await
    }

    /// Reload everything. A silent refresh keeps the current state visible
    /// and reports failures as background warnings.
    pub async fn refresh(&self, silent: bool) -> Result<LoadOutcome, ClientError> {
        let mode = if silent {
            LoadMode::SilentRefresh
        } else {
            LoadMode::Bootstrap
        };
        self.load(mode).await
    }

    async fn load(&self, mode: LoadMode) -> Result<LoadOutcome, ClientError> {
        let priority = self.selected();
        self.inner.hydrator.load(mode, priority.as_ref()).await
    }

    /// Mark the aggregate the user is looking at; the next load hydrates it first.
    pub fn select_aggregate(&self, id: Option<AggregateId>) {
        *self
            .inner
            .selected
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = id;
    }

    /// The selected aggregate, if any.
    pub fn selected(&self) -> Option<AggregateId> {
        self.inner
            .selected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Generation of the most recent load.
    pub fn generation(&self) -> Generation {
        self.inner.hydrator.sequencer().current()
    }

    /// Read-only copy of the current state.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.state.snapshot()
    }

    /// Receive alerts, warnings and informational notices.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.state.subscribe()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Apply a mutation optimistically and write it to the store.
    pub async fn mutate(&self, mutation: Mutation) -> Result<(), ClientError> {
        self.inner.gateway.mutate(mutation).await
    }

    /// Create a project; it is listed first.
    pub async fn add_aggregate(
        &self,
        name: &str,
        location: &str,
    ) -> Result<AggregateId, ClientError> {
        let aggregate = Aggregate::new(AggregateId::generate(), name, location);
        let id = aggregate.id.clone();
        self.mutate(Mutation::AddAggregate { aggregate }).await?;
        Ok(id)
    }

    /// Delete a project and everything under it.
    pub async fn delete_aggregate(&self, id: &AggregateId) -> Result<(), ClientError> {
        self.mutate(Mutation::DeleteAggregate {
            aggregate_id: id.clone(),
        })
        .await
    }

    /// Change a project's pipeline status.
    pub async fn set_aggregate_status(
        &self,
        id: &AggregateId,
        status: AggregateStatus,
    ) -> Result<(), ClientError> {
        self.mutate(Mutation::SetAggregateStatus {
            aggregate_id: id.clone(),
            status,
        })
        .await
    }

    /// Archive a project, or bring an archived one back to realization.
    pub async fn toggle_archived(&self, id: &AggregateId) -> Result<AggregateStatus, ClientError> {
        let current = self
            .inner
            .state
            .read(|s| s.data.aggregate(id).map(|a| a.status))
            .ok_or_else(|| ClientError::NotFound {
                what: format!("project {id}"),
            })?;
        let next = match current {
            AggregateStatus::Archived => AggregateStatus::Realization,
            _ => AggregateStatus::Archived,
        };
        self.set_aggregate_status(id, next).await?;
        Ok(next)
    }

    /// Patch contract terms, financials, integration settings or naming.
    pub async fn update_detail(
        &self,
        id: &AggregateId,
        patch: DetailPatch,
    ) -> Result<(), ClientError> {
        self.mutate(Mutation::UpdateDetail {
            aggregate_id: id.clone(),
            patch,
        })
        .await
    }

    /// Add a demand category.
    pub async fn add_category(
        &self,
        aggregate_id: &AggregateId,
        category: LineCategory,
    ) -> Result<(), ClientError> {
        self.mutate(Mutation::AddCategory {
            aggregate_id: aggregate_id.clone(),
            category,
        })
        .await
    }

    /// Replace a demand category's fields.
    pub async fn edit_category(
        &self,
        aggregate_id: &AggregateId,
        category: LineCategory,
    ) -> Result<(), ClientError> {
        self.mutate(Mutation::EditCategory {
            aggregate_id: aggregate_id.clone(),
            category,
        })
        .await
    }

    /// Delete a demand category and its bids.
    pub async fn delete_category(
        &self,
        aggregate_id: &AggregateId,
        category_id: &CategoryId,
    ) -> Result<(), ClientError> {
        self.mutate(Mutation::DeleteCategory {
            aggregate_id: aggregate_id.clone(),
            category_id: category_id.clone(),
        })
        .await
    }

    /// Insert or replace a bid.
    pub async fn upsert_bid(&self, aggregate_id: &AggregateId, bid: Bid) -> Result<(), ClientError> {
        self.mutate(Mutation::UpsertBid {
            aggregate_id: aggregate_id.clone(),
            bid,
        })
        .await
    }

    /// Move a bid through the pipeline.
    pub async fn set_bid_status(
        &self,
        aggregate_id: &AggregateId,
        bid_id: &BidId,
        status: BidStatus,
    ) -> Result<(), ClientError> {
        let mut bid = self.bid(aggregate_id, bid_id)?;
        bid.status = status;
        self.upsert_bid(aggregate_id, bid).await
    }

    /// Mark a bid's contract as signed or unsigned.
    pub async fn set_bid_signed(
        &self,
        aggregate_id: &AggregateId,
        bid_id: &BidId,
        signed: bool,
    ) -> Result<(), ClientError> {
        let mut bid = self.bid(aggregate_id, bid_id)?;
        bid.signed = signed;
        self.upsert_bid(aggregate_id, bid).await
    }

    fn bid(&self, aggregate_id: &AggregateId, bid_id: &BidId) -> Result<Bid, ClientError> {
        self.inner
            .state
            .read(|s| {
                s.data
                    .detail(aggregate_id)
                    .and_then(|d| d.bid(bid_id))
                    .cloned()
            })
            .ok_or_else(|| ClientError::NotFound {
                what: format!("bid {bid_id} in project {aggregate_id}"),
            })
    }

    /// Add a subcontractor.
    pub async fn add_contact(&self, contact: ContactEntity) -> Result<(), ClientError> {
        self.mutate(Mutation::AddContact { contact }).await
    }

    /// Replace a subcontractor.
    pub async fn update_contact(&self, contact: ContactEntity) -> Result<(), ClientError> {
        self.mutate(Mutation::UpdateContact { contact }).await
    }

    /// Remove subcontractors.
    pub async fn delete_contacts(&self, ids: Vec<ContactId>) -> Result<(), ClientError> {
        self.mutate(Mutation::DeleteContacts { ids }).await
    }

    /// Merge imported contacts into the current list.
    ///
    /// `reconcile` gets the latest committed contacts and the incoming ones
    /// and returns the contacts to upsert.
    pub async fn import_contacts<F>(
        &self,
        incoming: Vec<ContactEntity>,
        reconcile: F,
    ) -> Result<usize, ClientError>
    where
        F: FnOnce(&[ContactEntity], Vec<ContactEntity>) -> Vec<ContactEntity>,
    {
        let current = self.inner.state.read(|s| s.data.contacts.clone());
        let contacts = reconcile(&current, incoming);
        let count = contacts.len();
        self.mutate(Mutation::UpsertContacts { contacts }).await?;
        Ok(count)
    }

    /// Replace the contact status taxonomy.
    pub async fn set_statuses(&self, statuses: Vec<StatusConfig>) -> Result<(), ClientError> {
        self.mutate(Mutation::SetStatuses { statuses }).await
    }

    // =========================================================================
    // External sync
    // =========================================================================

    /// Ask the document integration to sync one category, throttled.
    ///
    /// Returns `None` when the project's integration is not connected.
    pub fn request_external_sync(&self, request: SyncRequest) -> Option<Admission> {
        self.inner.coalescer.request(request)
    }

    /// Deferred integration calls waiting for their cooldown.
    pub fn scheduled_syncs(&self) -> usize {
        self.inner.coalescer.scheduled()
    }

    /// Abort deferred integration calls and wait up to `grace` for running ones.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.inner.coalescer.shutdown(grace).await
    }
}
