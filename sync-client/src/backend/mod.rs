//! Storage backends for bidsync-client.
//!
//! The controller talks to one [`DataBackend`], chosen once at construction:
//! - [`SqliteBackend`] - relational store standing in for the hosted database
//! - [`LocalBlobBackend`] - single JSON blob for offline and demo sessions
//! - [`MockBackend`] - scripted delays and failures for tests
//!
//! Reads are fine-grained so the hydrator can issue them in parallel and
//! retry each one on its own. Writes take a whole [`Mutation`].

mod dataset;
mod local;
mod mock;
mod sqlite;

pub use local::{LocalBlobBackend, DEMO_EMAIL};
pub use mock::{BackendCall, MockBackend};
pub use sqlite::SqliteBackend;

use async_trait::async_trait;
use sync_types::{
    AggregateId, AggregateRecord, Amendment, Bid, ContactEntity, ContractTerms,
    FinancialSummary, LineCategory, Mutation, PermissionMetadata, Session, StatusConfig,
};

use crate::error::StoreError;

/// Trait for remote data stores.
#[async_trait]
pub trait DataBackend: Send + Sync + 'static {
    /// The signed-in user, or `None` when nobody is signed in.
    async fn current_session(&self) -> Result<Option<Session>, StoreError>;

    /// All aggregates visible to the session, with their integration settings.
    async fn list_aggregates(&self) -> Result<Vec<AggregateRecord>, StoreError>;

    /// Ownership and sharing metadata for every visible aggregate.
    async fn list_permissions(&self) -> Result<Vec<PermissionMetadata>, StoreError>;

    /// Demand categories of one aggregate.
    async fn list_categories(&self, id: &AggregateId) -> Result<Vec<LineCategory>, StoreError>;

    /// Contract terms of one aggregate, if recorded.
    async fn get_contract(&self, id: &AggregateId) -> Result<Option<ContractTerms>, StoreError>;

    /// Financial summary of one aggregate, without amendments.
    async fn get_financials(
        &self,
        id: &AggregateId,
    ) -> Result<Option<FinancialSummary>, StoreError>;

    /// Amendments of one aggregate.
    async fn list_amendments(&self, id: &AggregateId) -> Result<Vec<Amendment>, StoreError>;

    /// Every bid, across all aggregates.
    async fn list_bids(&self) -> Result<Vec<Bid>, StoreError>;

    /// Every contact.
    async fn list_contacts(&self) -> Result<Vec<ContactEntity>, StoreError>;

    /// The contact status taxonomy.
    async fn list_statuses(&self) -> Result<Vec<StatusConfig>, StoreError>;

    /// Persist one mutation.
    async fn write(&self, mutation: &Mutation) -> Result<(), StoreError>;

    /// Whether writes go to a local blob rather than a remote store.
    fn is_local(&self) -> bool {
        false
    }
}
