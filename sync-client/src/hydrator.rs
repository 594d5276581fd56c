//! Progressive hydration.
//!
//! A load runs in phases, each committing into shared state as soon as it
//! resolves:
//!
//! 1. session check, then aggregate list + permissions (parallel). Clears
//!    the bootstrap flag.
//! 2. per-aggregate detail, strictly sequential in queue order. The four
//!    nested reads of one aggregate run in parallel and commit together.
//! 3. the whole bid collection, partitioned over the hydrated categories.
//! 4. contacts and statuses, concurrently with phase 3.
//!
//! Every commit is gated on the load's generation token. Once the token is
//! stale the hydrator stops issuing requests for it.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use sync_core::{
    build_detail, commit_bids, commit_detail, commit_list, hydration_queue, merge_permissions,
    partition_bids, DetailParts, GenerationToken, LoadMode, LoadSequencer,
};
use sync_types::{AggregateId, AggregateRecord, Dataset};

use crate::backend::DataBackend;
use crate::config::ClientConfig;
use crate::error::{ClientError, StoreError};
use crate::retry::run_with_retry;
use crate::state::{AppState, SharedState};

const PROGRESS_SESSION: u8 = 0;
const PROGRESS_LIST: u8 = 10;
const PROGRESS_LIST_COMMITTED: u8 = 20;
const PROGRESS_DETAILS_SPAN: u8 = 70;
const PROGRESS_COLLECTIONS: u8 = 95;
const PROGRESS_DONE: u8 = 100;

/// How a load ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The load ran to the end.
    Completed(HydrationReport),
    /// A newer load started; remaining work was dropped.
    Superseded,
}

/// Summary of a completed load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    /// Aggregates in hydration order.
    pub order: Vec<AggregateId>,
    /// Aggregates whose detail was committed.
    pub hydrated: usize,
    /// Aggregates whose detail failed to load.
    pub failed: Vec<AggregateId>,
    /// Bids dropped because their category is unknown.
    pub orphan_bids: usize,
    /// Non-fatal failures, in order.
    pub warnings: Vec<String>,
}

/// Runs loads against one backend.
pub(crate) struct Hydrator<B> {
    backend: Arc<B>,
    state: SharedState,
    sequencer: LoadSequencer,
    config: ClientConfig,
}

impl<B: DataBackend> Hydrator<B> {
    pub fn new(backend: Arc<B>, state: SharedState, config: ClientConfig) -> Self {
        Self {
            backend,
            state,
            sequencer: LoadSequencer::new(),
            config,
        }
    }

    pub fn sequencer(&self) -> &LoadSequencer {
        &self.sequencer
    }

    /// Apply `f` only if `token` is still current, inside the write lock.
    fn commit_if_current<R>(
        &self,
        token: &GenerationToken,
        f: impl FnOnce(&mut AppState) -> R,
    ) -> Option<R> {
        self.state.write(|state| {
            if self.sequencer.is_current(token) {
                Some(f(state))
            } else {
                trace!(generation = token.generation().value(), "Stale result discarded");
                None
            }
        })
    }

    /// Run one full load.
    pub async fn load(
        &self,
        mode: LoadMode,
        priority: Option<&AggregateId>,
    ) -> Result<LoadOutcome, ClientError> {
        let token = self.sequencer.begin_load(mode);
        info!(generation = token.generation().value(), ?mode, "Load started");

        self.state.write(|state| {
            if mode.is_bootstrap() {
                state.load.is_bootstrap_loading = true;
                state.load.bootstrap_error = None;
                state.load.background_warning = None;
                state.set_progress(PROGRESS_SESSION, "Checking session");
            }
            state.load.is_background_hydrating = true;
        });

        // Phase 1
        let backend = &*self.backend;
        let policy = self.config.bootstrap.policy();
        let session = run_with_retry("current_session", &policy, move || {
            backend.current_session()
        })
        .await;
        match session {
            Ok(Some(session)) => debug!(email = %session.email, "Session ok"),
            Ok(None) => {
                let err = ClientError::Permission("no active session".into());
                return self.fail_bootstrap(&token, err);
            }
            Err(e) => {
                let err = ClientError::Permission(e.to_string());
                return self.fail_bootstrap(&token, err);
            }
        }

        if !self.sequencer.is_current(&token) {
            return Ok(LoadOutcome::Superseded);
        }
        if mode.is_bootstrap() {
            self.state.write(|s| s.set_progress(PROGRESS_LIST, "Loading projects"));
        }

        let (records, permissions) = tokio::join!(
            run_with_retry("list_aggregates", &policy, move || backend.list_aggregates()),
            run_with_retry("list_permissions", &policy, move || backend.list_permissions()),
        );
        let (records, permissions) = match (records, permissions) {
            (Ok(records), Ok(permissions)) => (records, permissions),
            (Err(e), _) | (_, Err(e)) => return self.fail_bootstrap(&token, e.into()),
        };

        let aggregates = merge_permissions(&records, &permissions);
        let ids: Vec<AggregateId> = aggregates.iter().map(|a| a.id.clone()).collect();
        let committed = self.commit_if_current(&token, |state| {
            commit_list(&mut state.data, aggregates);
            state.load.is_bootstrap_loading = false;
            state.load.bootstrap_error = None;
            state.set_progress(PROGRESS_LIST_COMMITTED, "Loading project details");
        });
        if committed.is_none() {
            return Ok(LoadOutcome::Superseded);
        }
        info!(count = ids.len(), "Aggregate list committed");

        // Phase 2
        let by_id: HashMap<&AggregateId, &AggregateRecord> =
            records.iter().map(|r| (&r.aggregate.id, r)).collect();
        let order = hydration_queue(&ids, priority);
        let mut report = HydrationReport {
            order: order.clone(),
            ..Default::default()
        };
        let total = order.len();

        for (index, id) in order.iter().enumerate() {
            if !self.sequencer.is_current(&token) {
                debug!(aggregate = %id, "Load superseded, stopping detail hydration");
                return Ok(LoadOutcome::Superseded);
            }
            let Some(record) = by_id.get(id) else {
                continue;
            };
            let percent = PROGRESS_LIST_COMMITTED
                + (usize::from(PROGRESS_DETAILS_SPAN) * (index + 1) / total.max(1)) as u8;

            match self.fetch_detail(id).await {
                Ok(parts) => {
                    let committed = self.commit_if_current(&token, |state| {
                        let detail = build_detail(record, parts, state.data.detail(id));
                        commit_detail(&mut state.data, detail);
                        state.set_progress(percent, "Loading project details");
                    });
                    if committed.is_none() {
                        return Ok(LoadOutcome::Superseded);
                    }
                    debug!(aggregate = %id, "Detail committed");
                    report.hydrated += 1;
                }
                Err(e) => {
                    let warning =
                        format!("Could not load project \"{}\": {e}", record.aggregate.name);
                    warn!(aggregate = %id, error = %e, "Detail hydration failed");
                    self.commit_if_current(&token, |state| {
                        state.load.background_warning = Some(warning.clone());
                        state.set_progress(percent, "Loading project details");
                    });
                    report.failed.push(id.clone());
                    report.warnings.push(warning);
                }
            }
        }

        // Phases 3 and 4
        if !self.sequencer.is_current(&token) {
            return Ok(LoadOutcome::Superseded);
        }
        self.commit_if_current(&token, |s| {
            s.set_progress(PROGRESS_COLLECTIONS, "Loading bids and contacts")
        });

        let collections = self.config.collections.policy();
        let (bids, (contacts, statuses)) = tokio::join!(
            run_with_retry("list_bids", &collections, move || backend.list_bids()),
            async {
                tokio::join!(
                    run_with_retry("list_contacts", &collections, move || {
                        backend.list_contacts()
                    }),
                    run_with_retry("list_statuses", &collections, move || {
                        backend.list_statuses()
                    }),
                )
            },
        );

        let mut collection_warnings = Vec::new();
        let outcome = self.commit_if_current(&token, |state| {
            match bids {
                Ok(bids) => {
                    let partition = partition_bids(&state.data, bids);
                    report.orphan_bids = partition.orphans;
                    commit_bids(&mut state.data, partition, None);
                }
                Err(e) => collection_warnings.push(format!("Could not load bids: {e}")),
            }
            match contacts {
                Ok(contacts) => state.data.contacts = contacts,
                Err(e) => collection_warnings.push(format!("Could not load contacts: {e}")),
            }
            match statuses {
                Ok(statuses) => state.data.statuses = statuses,
                Err(e) => collection_warnings.push(format!("Could not load statuses: {e}")),
            }
            if let Some(last) = collection_warnings.last() {
                state.load.background_warning = Some(last.clone());
            }
            state.load.is_background_hydrating = false;
            state.set_progress(PROGRESS_DONE, "Done");
        });
        if outcome.is_none() {
            return Ok(LoadOutcome::Superseded);
        }

        for warning in &collection_warnings {
            warn!(%warning, "Background hydration warning");
        }
        if report.orphan_bids > 0 {
            debug!(orphans = report.orphan_bids, "Bids with unknown category skipped");
        }
        report.warnings.extend(collection_warnings);
        info!(
            hydrated = report.hydrated,
            failed = report.failed.len(),
            "Load finished"
        );
        Ok(LoadOutcome::Completed(report))
    }

    /// Phase-1 failure: fatal for a bootstrap, a warning for a silent refresh.
    fn fail_bootstrap(
        &self,
        token: &GenerationToken,
        err: ClientError,
    ) -> Result<LoadOutcome, ClientError> {
        let message = err.to_string();
        // A refresh that supersedes a bootstrap before any list was committed
        // has nothing to keep, so it fails the same way.
        let committed = self.commit_if_current(token, |state| {
            state.load.is_background_hydrating = false;
            let fatal = token.mode().is_bootstrap() || state.load.is_bootstrap_loading;
            if fatal {
                state.load.is_bootstrap_loading = false;
                state.load.bootstrap_error = Some(message.clone());
                state.data = Dataset::default();
            } else {
                state.load.background_warning = Some(message.clone());
            }
            fatal
        });
        let Some(fatal) = committed else {
            return Ok(LoadOutcome::Superseded);
        };
        if fatal {
            error!(error = %message, "Bootstrap failed");
        } else {
            warn!(error = %message, "Silent refresh failed, keeping current state");
        }
        Err(err)
    }

    /// The four nested reads of one aggregate, in parallel.
    async fn fetch_detail(&self, id: &AggregateId) -> Result<DetailParts, StoreError> {
        let backend = &*self.backend;
        let policy = self.config.detail.policy();
        let (categories, contract, financials, amendments) = tokio::join!(
            run_with_retry("list_categories", &policy, move || backend.list_categories(id)),
            run_with_retry("get_contract", &policy, move || backend.get_contract(id)),
            run_with_retry("get_financials", &policy, move || backend.get_financials(id)),
            run_with_retry("list_amendments", &policy, move || backend.list_amendments(id)),
        );
        Ok(DetailParts {
            categories: categories?,
            contract: contract?,
            financials: financials?,
            amendments: amendments?,
        })
    }

    /// Re-fetch one aggregate's detail and bids outside any load generation.
    pub async fn hydrate_one(&self, id: &AggregateId) -> Result<(), ClientError> {
        let record = self
            .state
            .read(|state| {
                state.data.aggregate(id).map(|aggregate| AggregateRecord {
                    aggregate: aggregate.clone(),
                    integration: state
                        .data
                        .detail(id)
                        .map(|d| d.integration.clone())
                        .unwrap_or_default(),
                })
            })
            .ok_or_else(|| ClientError::NotFound {
                what: format!("project {id}"),
            })?;

        let parts = self.fetch_detail(id).await?;
        let backend = &*self.backend;
        let policy = self.config.collections.policy();
        let bids = run_with_retry("list_bids", &policy, move || backend.list_bids()).await?;

        let listed = self.state.write(|state| {
            if state.data.aggregate(id).is_none() {
                return false;
            }
            let detail = build_detail(&record, parts, None);
            commit_detail(&mut state.data, detail);
            let partition = partition_bids(&state.data, bids);
            commit_bids(&mut state.data, partition, Some(id));
            true
        });
        if listed {
            debug!(aggregate = %id, "Detail reloaded");
        } else {
            debug!(aggregate = %id, "Project left the list during reload, detail dropped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use sync_types::{
        Aggregate, AggregateDetail, Bid, ContactEntity, LineCategory, StatusConfig,
    };

    use crate::backend::MockBackend;

    fn dataset(ids: &[&str]) -> Dataset {
        let mut data = Dataset::default();
        for id in ids {
            let aggregate = Aggregate::new(*id, &format!("Project {id}"), "Praha");
            let mut detail = AggregateDetail::empty(&aggregate);
            let category = format!("{id}-c1");
            detail
                .categories
                .push(LineCategory::new(category.as_str(), "Elektro"));
            detail.bids.insert(
                category.as_str().into(),
                vec![Bid::new(format!("{id}-b1").as_str(), category.as_str(), "s1", "Elmont")],
            );
            sync_core::refresh_bid_counts(&mut detail);
            data.details_by_id.insert(aggregate.id.clone(), detail);
            data.aggregates.push(aggregate);
        }
        data.contacts.push(ContactEntity::new("s1", "Elmont"));
        data.statuses
            .push(StatusConfig::new("available", "Available", "green"));
        data
    }

    fn hydrator(backend: &MockBackend) -> Hydrator<MockBackend> {
        Hydrator::new(
            Arc::new(backend.clone()),
            SharedState::new(),
            ClientConfig::default(),
        )
    }

    // ===========================================
    // Phases
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn full_load_fills_every_slice() {
        let backend = MockBackend::with_data(dataset(&["1", "2"]));
        let hydrator = hydrator(&backend);

        let outcome = hydrator.load(LoadMode::Bootstrap, None).await.unwrap();
        let LoadOutcome::Completed(report) = outcome else {
            panic!("load superseded");
        };
        assert_eq!(report.hydrated, 2);

        let snapshot = hydrator.state.snapshot();
        assert!(!snapshot.load.is_bootstrap_loading);
        assert!(!snapshot.load.is_background_hydrating);
        assert_eq!(snapshot.load.bootstrap_progress.percent, 100);
        assert_eq!(snapshot.data, backend.data());
    }

    #[tokio::test(start_paused = true)]
    async fn priority_aggregate_hydrates_first() {
        let backend = MockBackend::with_data(dataset(&["1", "2", "3"]));
        let hydrator = hydrator(&backend);
        let priority = AggregateId::from("2");

        hydrator
            .load(LoadMode::Bootstrap, Some(&priority))
            .await
            .unwrap();

        let order: Vec<String> = backend
            .category_requests()
            .iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(order, vec!["2", "1", "3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_clears_before_details_arrive() {
        let backend = MockBackend::with_data(dataset(&["1"]));
        backend.set_delay("list_categories", Duration::from_secs(5));
        let hydrator = Arc::new(hydrator(&backend));

        let task = tokio::spawn({
            let hydrator = hydrator.clone();
            async move { hydrator.load(LoadMode::Bootstrap, None).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let snapshot = hydrator.state.snapshot();
        assert!(!snapshot.load.is_bootstrap_loading);
        assert!(snapshot.load.is_background_hydrating);
        assert_eq!(snapshot.data.aggregates.len(), 1);
        assert!(snapshot.data.details_by_id.is_empty());

        task.await.unwrap().unwrap();
        assert_eq!(hydrator.state.snapshot().data.details_by_id.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn orphan_bids_are_skipped() {
        let mut data = dataset(&["1"]);
        data.details_by_id
            .get_mut(&AggregateId::from("1"))
            .unwrap()
            .bids
            .insert("ghost".into(), vec![Bid::new("b9", "ghost", "s1", "Nobody")]);
        let backend = MockBackend::with_data(data);
        let hydrator = hydrator(&backend);

        let LoadOutcome::Completed(report) =
            hydrator.load(LoadMode::Bootstrap, None).await.unwrap()
        else {
            panic!("load superseded");
        };
        assert_eq!(report.orphan_bids, 1);
        let snapshot = hydrator.state.snapshot();
        let detail = snapshot.data.detail(&"1".into()).unwrap();
        assert_eq!(detail.bid_total(), 1);
        assert_eq!(detail.categories[0].bid_count, 1);
    }

    // ===========================================
    // Failures
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn bootstrap_session_failure_is_fatal() {
        let backend = MockBackend::with_data(dataset(&["1"]));
        backend.fail_always("current_session", "auth service down");
        let hydrator = hydrator(&backend);

        let result = hydrator.load(LoadMode::Bootstrap, None).await;
        assert!(matches!(result, Err(ClientError::Permission(_))));

        let snapshot = hydrator.state.snapshot();
        assert!(snapshot.load.bootstrap_error.is_some());
        assert!(!snapshot.load.is_bootstrap_loading);
        assert!(snapshot.data.aggregates.is_empty());
        assert!(backend.calls_of("list_aggregates").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn signed_out_bootstrap_is_fatal() {
        let backend = MockBackend::with_data(dataset(&["1"]));
        backend.set_session(None);
        let hydrator = hydrator(&backend);
        assert!(hydrator.load(LoadMode::Bootstrap, None).await.is_err());
        assert!(hydrator.state.snapshot().load.bootstrap_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_refresh_failure_keeps_state() {
        let backend = MockBackend::with_data(dataset(&["1"]));
        let hydrator = hydrator(&backend);
        hydrator.load(LoadMode::Bootstrap, None).await.unwrap();
        let before = hydrator.state.snapshot().data;

        backend.fail_always("list_aggregates", "connection reset");
        let result = hydrator.load(LoadMode::SilentRefresh, None).await;
        assert!(result.is_err());

        let snapshot = hydrator.state.snapshot();
        assert_eq!(snapshot.data, before);
        assert!(snapshot.load.bootstrap_error.is_none());
        assert!(snapshot.load.background_warning.is_some());
        assert!(!snapshot.load.is_background_hydrating);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failing_before_first_list_ends_bootstrap() {
        let backend = MockBackend::with_data(dataset(&["1"]));
        backend.set_delay("list_aggregates", Duration::from_secs(5));
        let hydrator = Arc::new(hydrator(&backend));

        let boot = tokio::spawn({
            let hydrator = hydrator.clone();
            async move { hydrator.load(LoadMode::Bootstrap, None).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(hydrator.state.snapshot().load.is_bootstrap_loading);

        backend.set_delay("list_aggregates", Duration::ZERO);
        backend.fail_always("list_aggregates", "connection reset");
        let result = hydrator.load(LoadMode::SilentRefresh, None).await;
        assert!(result.is_err());
        assert_eq!(boot.await.unwrap().unwrap(), LoadOutcome::Superseded);

        let snapshot = hydrator.state.snapshot();
        assert!(!snapshot.load.is_bootstrap_loading);
        assert!(!snapshot.load.is_background_hydrating);
        assert!(snapshot.load.bootstrap_error.is_some());
        assert!(snapshot.data.aggregates.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_aggregate_does_not_block_others() {
        let backend = MockBackend::with_data(dataset(&["1", "2", "3"]));
        backend.fail_aggregate("2");
        let hydrator = hydrator(&backend);

        let LoadOutcome::Completed(report) =
            hydrator.load(LoadMode::Bootstrap, None).await.unwrap()
        else {
            panic!("load superseded");
        };
        assert_eq!(report.hydrated, 2);
        assert_eq!(report.failed, vec![AggregateId::from("2")]);

        let snapshot = hydrator.state.snapshot();
        assert!(snapshot.data.detail(&"1".into()).is_some());
        assert!(snapshot.data.detail(&"2".into()).is_none());
        assert!(snapshot.data.detail(&"3".into()).is_some());
        let warning = snapshot.load.background_warning.unwrap();
        assert!(warning.contains("Project 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_detail_failure_is_retried() {
        let backend = MockBackend::with_data(dataset(&["1"]));
        backend.fail_next("get_contract", "timeout");
        let hydrator = hydrator(&backend);

        hydrator.load(LoadMode::Bootstrap, None).await.unwrap();
        assert_eq!(backend.calls_of("get_contract").len(), 2);
        assert!(hydrator.state.snapshot().load.background_warning.is_none());
    }

    // ===========================================
    // Generations
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn stale_load_never_commits() {
        let backend = MockBackend::with_data(dataset(&["1", "2"]));
        backend.set_aggregate_delay("1", Duration::from_secs(10));
        let hydrator = Arc::new(hydrator(&backend));

        let slow = tokio::spawn({
            let hydrator = hydrator.clone();
            async move { hydrator.load(LoadMode::Bootstrap, None).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        // The store changes and a newer load finishes first.
        backend.update_data(|data| {
            data.details_by_id
                .get_mut(&AggregateId::from("1"))
                .unwrap()
                .title = "Renamed".into();
            data.aggregates[0].name = "Renamed".into();
        });
        backend.set_aggregate_delay("1", Duration::ZERO);
        let fresh = hydrator.load(LoadMode::SilentRefresh, None).await.unwrap();
        assert!(matches!(fresh, LoadOutcome::Completed(_)));
        let after_fresh = hydrator.state.snapshot().data;

        assert_eq!(slow.await.unwrap().unwrap(), LoadOutcome::Superseded);
        assert_eq!(hydrator.state.snapshot().data, after_fresh);
        assert_eq!(after_fresh, backend.data());
        assert_eq!(hydrator.sequencer().current().value(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hydrate_one_touches_only_its_aggregate() {
        let backend = MockBackend::with_data(dataset(&["1", "2"]));
        let hydrator = hydrator(&backend);
        hydrator.load(LoadMode::Bootstrap, None).await.unwrap();
        let before = hydrator.state.snapshot().data;

        backend.update_data(|data| {
            for detail in data.details_by_id.values_mut() {
                detail.categories.push(LineCategory::new(
                    format!("{}-c2", detail.id).as_str(),
                    "ZTI",
                ));
            }
        });
        hydrator.hydrate_one(&"2".into()).await.unwrap();

        let after = hydrator.state.snapshot().data;
        assert_eq!(after.detail(&"1".into()), before.detail(&"1".into()));
        assert_eq!(after.detail(&"2".into()).unwrap().categories.len(), 2);
        assert_eq!(after.detail(&"2".into()).unwrap().bid_total(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hydrate_one_drops_detail_of_removed_aggregate() {
        let backend = MockBackend::with_data(dataset(&["1", "2"]));
        let hydrator = Arc::new(hydrator(&backend));
        hydrator.load(LoadMode::Bootstrap, None).await.unwrap();

        backend.set_delay("list_categories", Duration::from_secs(5));
        let reload = tokio::spawn({
            let hydrator = hydrator.clone();
            async move { hydrator.hydrate_one(&"2".into()).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let removed = AggregateId::from("2");
        hydrator.state.write(|state| {
            state.data.aggregates.retain(|a| a.id != removed);
            state.data.details_by_id.remove(&removed);
        });
        reload.await.unwrap().unwrap();

        let after = hydrator.state.snapshot().data;
        assert!(after.aggregate(&removed).is_none());
        assert!(after.detail(&removed).is_none());
        assert!(after.detail(&"1".into()).is_some());
    }

    #[tokio::test]
    async fn hydrate_one_unknown_aggregate() {
        let backend = MockBackend::new();
        let hydrator = hydrator(&backend);
        let result = hydrator.hydrate_one(&"missing".into()).await;
        assert!(matches!(result, Err(ClientError::NotFound { .. })));
    }
}
