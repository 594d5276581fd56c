//! Mock backend for testing.
//!
//! Serves reads from a seeded [`Dataset`], applies successful writes to it,
//! and records every call. Delays and failures can be scripted per operation
//! or per aggregate.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sync_core::apply_mutation;
use sync_types::{
    AggregateId, AggregateRecord, Amendment, Bid, ContactEntity, ContractTerms, Dataset,
    FinancialSummary, LineCategory, Mutation, PermissionMetadata, Role, Session, StatusConfig,
};

use super::{dataset, DataBackend};
use crate::error::StoreError;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// `current_session`
    Session,
    /// `list_aggregates`
    ListAggregates,
    /// `list_permissions`
    ListPermissions,
    /// `list_categories`
    ListCategories(AggregateId),
    /// `get_contract`
    GetContract(AggregateId),
    /// `get_financials`
    GetFinancials(AggregateId),
    /// `list_amendments`
    ListAmendments(AggregateId),
    /// `list_bids`
    ListBids,
    /// `list_contacts`
    ListContacts,
    /// `list_statuses`
    ListStatuses,
    /// `write`, with the mutation label.
    Write(&'static str),
}

impl BackendCall {
    /// Operation name used to script delays and failures.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Session => "current_session",
            Self::ListAggregates => "list_aggregates",
            Self::ListPermissions => "list_permissions",
            Self::ListCategories(_) => "list_categories",
            Self::GetContract(_) => "get_contract",
            Self::GetFinancials(_) => "get_financials",
            Self::ListAmendments(_) => "list_amendments",
            Self::ListBids => "list_bids",
            Self::ListContacts => "list_contacts",
            Self::ListStatuses => "list_statuses",
            Self::Write(_) => "write",
        }
    }

    /// Aggregate targeted by a per-aggregate read.
    pub fn aggregate(&self) -> Option<&AggregateId> {
        match self {
            Self::ListCategories(id)
            | Self::GetContract(id)
            | Self::GetFinancials(id)
            | Self::ListAmendments(id) => Some(id),
            _ => None,
        }
    }
}

/// Mock backend for testing.
///
/// Cloning shares the underlying state, so a test can keep a handle to
/// script failures after handing the backend to a controller.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<MockBackendInner>>,
}

#[derive(Debug, Default)]
struct MockBackendInner {
    session: Option<Session>,
    data: Dataset,
    permissions: Vec<PermissionMetadata>,
    calls: Vec<BackendCall>,
    delays: HashMap<&'static str, Duration>,
    aggregate_delays: HashMap<AggregateId, Duration>,
    fail_next: HashMap<&'static str, VecDeque<String>>,
    fail_always: HashMap<&'static str, String>,
    failing_aggregates: HashSet<AggregateId>,
}

impl MockBackend {
    /// Create a mock with a signed-in user and an empty dataset.
    pub fn new() -> Self {
        Self::with_data(Dataset::default())
    }

    /// Create a mock with a signed-in user serving `data`.
    pub fn with_data(data: Dataset) -> Self {
        let mock = Self::default();
        {
            let mut inner = mock.lock();
            inner.session = Some(Session {
                user_id: "user-1".to_string(),
                email: "tester@example.com".to_string(),
                role: Role::User,
            });
            inner.data = data;
        }
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockBackendInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the stored dataset.
    pub fn set_data(&self, data: Dataset) {
        self.lock().data = data;
    }

    /// Current stored dataset.
    pub fn data(&self) -> Dataset {
        self.lock().data.clone()
    }

    /// Edit the stored dataset in place.
    pub fn update_data(&self, f: impl FnOnce(&mut Dataset)) {
        f(&mut self.lock().data);
    }

    /// Replace the session (`None` = signed out).
    pub fn set_session(&self, session: Option<Session>) {
        self.lock().session = session;
    }

    /// Replace the permission metadata.
    pub fn set_permissions(&self, permissions: Vec<PermissionMetadata>) {
        self.lock().permissions = permissions;
    }

    /// Delay every call of `op` by `delay`.
    pub fn set_delay(&self, op: &'static str, delay: Duration) {
        self.lock().delays.insert(op, delay);
    }

    /// Delay every per-aggregate read of `id` by `delay`.
    pub fn set_aggregate_delay(&self, id: impl Into<AggregateId>, delay: Duration) {
        self.lock().aggregate_delays.insert(id.into(), delay);
    }

    /// Cause the next call of `op` to fail with `message`.
    pub fn fail_next(&self, op: &'static str, message: &str) {
        self.lock()
            .fail_next
            .entry(op)
            .or_default()
            .push_back(message.to_string());
    }

    /// Cause every call of `op` to fail with `message`.
    pub fn fail_always(&self, op: &'static str, message: &str) {
        self.lock().fail_always.insert(op, message.to_string());
    }

    /// Cause every per-aggregate read of `id` to fail.
    pub fn fail_aggregate(&self, id: impl Into<AggregateId>) {
        self.lock().failing_aggregates.insert(id.into());
    }

    /// Remove all scripted failures.
    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.fail_next.clear();
        inner.fail_always.clear();
        inner.failing_aggregates.clear();
    }

    /// All calls so far, in order of entry.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Calls of one operation.
    pub fn calls_of(&self, op: &str) -> Vec<BackendCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .cloned()
            .collect()
    }

    /// Aggregates whose categories were requested, in order.
    pub fn category_requests(&self) -> Vec<AggregateId> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::ListCategories(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Record the call, snapshot the answer, then wait out the scripted delay.
    ///
    /// The answer is taken at entry, so a delayed call returns the data as
    /// it was when the call started.
    async fn serve<T>(
        &self,
        call: BackendCall,
        read: impl FnOnce(&MockBackendInner) -> T,
    ) -> Result<T, StoreError> {
        let (answer, delay) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let op = call.op();
            let failure = state
                .fail_next
                .get_mut(op)
                .and_then(VecDeque::pop_front)
                .or_else(|| state.fail_always.get(op).cloned())
                .or_else(|| {
                    call.aggregate()
                        .filter(|id| state.failing_aggregates.contains(*id))
                        .map(|id| format!("{op} failed for {id}"))
                });
            let delay = call
                .aggregate()
                .and_then(|id| state.aggregate_delays.get(id).copied())
                .or_else(|| state.delays.get(op).copied());
            state.calls.push(call);
            let answer = match failure {
                Some(message) => Err(StoreError::transport(message)),
                None => Ok(read(state)),
            };
            (answer, delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        answer
    }
}

#[async_trait]
impl DataBackend for MockBackend {
    async fn current_session(&self) -> Result<Option<Session>, StoreError> {
        self.serve(BackendCall::Session, |inner| inner.session.clone())
            .await
    }

    async fn list_aggregates(&self) -> Result<Vec<AggregateRecord>, StoreError> {
        self.serve(BackendCall::ListAggregates, |inner| {
            dataset::records(&inner.data)
        })
        .await
    }

    async fn list_permissions(&self) -> Result<Vec<PermissionMetadata>, StoreError> {
        self.serve(BackendCall::ListPermissions, |inner| {
            inner.permissions.clone()
        })
        .await
    }

    async fn list_categories(&self, id: &AggregateId) -> Result<Vec<LineCategory>, StoreError> {
        self.serve(BackendCall::ListCategories(id.clone()), |inner| {
            dataset::categories(&inner.data, id)
        })
        .await
    }

    async fn get_contract(&self, id: &AggregateId) -> Result<Option<ContractTerms>, StoreError> {
        self.serve(BackendCall::GetContract(id.clone()), |inner| {
            dataset::contract(&inner.data, id)
        })
        .await
    }

    async fn get_financials(
        &self,
        id: &AggregateId,
    ) -> Result<Option<FinancialSummary>, StoreError> {
        self.serve(BackendCall::GetFinancials(id.clone()), |inner| {
            dataset::financials(&inner.data, id)
        })
        .await
    }

    async fn list_amendments(&self, id: &AggregateId) -> Result<Vec<Amendment>, StoreError> {
        self.serve(BackendCall::ListAmendments(id.clone()), |inner| {
            dataset::amendments(&inner.data, id)
        })
        .await
    }

    async fn list_bids(&self) -> Result<Vec<Bid>, StoreError> {
        self.serve(BackendCall::ListBids, |inner| dataset::bids(&inner.data))
            .await
    }

    async fn list_contacts(&self) -> Result<Vec<ContactEntity>, StoreError> {
        self.serve(BackendCall::ListContacts, |inner| inner.data.contacts.clone())
            .await
    }

    async fn list_statuses(&self) -> Result<Vec<StatusConfig>, StoreError> {
        self.serve(BackendCall::ListStatuses, |inner| inner.data.statuses.clone())
            .await
    }

    async fn write(&self, mutation: &Mutation) -> Result<(), StoreError> {
        self.serve(BackendCall::Write(mutation.label()), |_| ())
            .await?;
        let mut inner = self.lock();
        apply_mutation(&mut inner.data, mutation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{Aggregate, AggregateDetail};

    fn seeded() -> MockBackend {
        let aggregate = Aggregate::new("p1", "Hala", "Brno");
        let mut detail = AggregateDetail::empty(&aggregate);
        detail.categories.push(LineCategory::new("c1", "Elektro"));
        let mut data = Dataset::default();
        data.details_by_id.insert(aggregate.id.clone(), detail);
        data.aggregates.push(aggregate);
        MockBackend::with_data(data)
    }

    // ===========================================
    // MockBackend Basic Tests
    // ===========================================

    #[tokio::test]
    async fn serves_seeded_data_and_records_calls() {
        let backend = seeded();
        let list = backend.list_aggregates().await.unwrap();
        assert_eq!(list.len(), 1);
        let categories = backend.list_categories(&"p1".into()).await.unwrap();
        assert_eq!(categories.len(), 1);

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::ListAggregates,
                BackendCall::ListCategories("p1".into())
            ]
        );
    }

    #[tokio::test]
    async fn fail_next_fails_once() {
        let backend = seeded();
        backend.fail_next("list_bids", "boom");
        assert!(backend.list_bids().await.is_err());
        assert!(backend.list_bids().await.is_ok());
    }

    #[tokio::test]
    async fn failing_aggregate_fails_only_its_reads() {
        let backend = seeded();
        backend.fail_aggregate("p1");
        assert!(backend.get_contract(&"p1".into()).await.is_err());
        assert!(backend.get_contract(&"p2".into()).await.is_ok());
        assert!(backend.list_aggregates().await.is_ok());
    }

    #[tokio::test]
    async fn successful_write_updates_store() {
        let backend = seeded();
        backend
            .write(&Mutation::DeleteCategory {
                aggregate_id: "p1".into(),
                category_id: "c1".into(),
            })
            .await
            .unwrap();
        assert!(backend.list_categories(&"p1".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_write_leaves_store_untouched() {
        let backend = seeded();
        backend.fail_next("write", "503");
        let before = backend.data();
        let result = backend
            .write(&Mutation::DeleteCategory {
                aggregate_id: "p1".into(),
                category_id: "c1".into(),
            })
            .await;
        assert!(result.is_err());
        assert_eq!(backend.data(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_call_returns_data_from_entry() {
        let backend = seeded();
        backend.set_delay("list_aggregates", Duration::from_secs(5));

        let slow = tokio::spawn({
            let backend = backend.clone();
            async move { backend.list_aggregates().await }
        });
        tokio::task::yield_now().await;
        backend.update_data(|data| data.aggregates.clear());

        let list = slow.await.unwrap().unwrap();
        assert_eq!(list.len(), 1);
    }
}
