//! Outbound integration throttling.
//!
//! Requests are fire-and-forget. Per aggregate, identical requests inside
//! the dedupe window are dropped, calls are spaced by the cooldown, and at
//! most one deferred call is scheduled; the first request to schedule it
//! supplies its payload. Admission decisions come from
//! [`sync_core::PendingSyncEntry`]; this module owns the timers and tasks.

use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use sync_core::{Admission, PendingSyncEntry, ThrottlePolicy};
use sync_types::{AggregateId, Notice, SyncRequest};

use crate::integration::DocumentIntegration;
use crate::state::SharedState;

/// What [`shutdown`](ExternalSyncCoalescer::shutdown) did with outstanding work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Deferred calls cancelled before they fired.
    pub aborted: usize,
    /// In-flight calls that finished within the grace period.
    pub completed: usize,
    /// In-flight calls cut off when the grace period ran out.
    pub abandoned: usize,
}

/// Per-aggregate throttle in front of a [`DocumentIntegration`].
pub(crate) struct ExternalSyncCoalescer<I> {
    inner: Arc<CoalescerInner<I>>,
}

struct CoalescerInner<I> {
    integration: Arc<I>,
    state: SharedState,
    policy: ThrottlePolicy,
    entries: DashMap<AggregateId, PendingSyncEntry>,
    timers: DashMap<AggregateId, JoinHandle<()>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl<I> Clone for ExternalSyncCoalescer<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: DocumentIntegration> ExternalSyncCoalescer<I> {
    pub fn new(integration: Arc<I>, state: SharedState, policy: ThrottlePolicy) -> Self {
        Self {
            inner: Arc::new(CoalescerInner {
                integration,
                state,
                policy,
                entries: DashMap::new(),
                timers: DashMap::new(),
                in_flight: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Offer one request. Returns `None` when the aggregate's integration is
    /// not enabled and connected.
    pub fn request(&self, request: SyncRequest) -> Option<Admission> {
        let inner = &self.inner;
        let ready = inner.state.read(|state| {
            state
                .data
                .detail(&request.aggregate_id)
                .is_some_and(|d| d.integration.is_ready())
        });
        if !ready {
            debug!(aggregate = %request.aggregate_id, "Integration not connected, skipping sync");
            return None;
        }

        let key = request.key();
        let admission = inner
            .entries
            .entry(request.aggregate_id.clone())
            .or_default()
            .admit(&key, Instant::now().into_std(), &inner.policy);

        match admission {
            Admission::RunNow => {
                debug!(%key, "Document sync running now");
                inner.spawn_call(request);
            }
            Admission::Schedule { delay } => {
                debug!(%key, ?delay, "Document sync deferred by cooldown");
                let id = request.aggregate_id.clone();
                let timer = Arc::clone(inner);
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    timer.fire(request, delay);
                });
                inner.timers.insert(id, handle);
            }
            Admission::Coalesced => debug!(%key, "Document sync coalesced into pending call"),
            Admission::Duplicate => debug!(%key, "Duplicate document sync dropped"),
        }
        Some(admission)
    }

    /// Number of deferred calls waiting for their cooldown.
    pub fn scheduled(&self) -> usize {
        self.inner
            .timers
            .iter()
            .filter(|timer| !timer.value().is_finished())
            .count()
    }

    /// Abort deferred calls and wait up to `grace` for in-flight ones.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let inner = &self.inner;
        let mut report = ShutdownReport::default();

        let ids: Vec<AggregateId> = inner.timers.iter().map(|t| t.key().clone()).collect();
        for id in ids {
            if let Some((_, handle)) = inner.timers.remove(&id) {
                if !handle.is_finished() {
                    handle.abort();
                    report.aborted += 1;
                }
                if let Some(mut entry) = inner.entries.get_mut(&id) {
                    entry.cancel_scheduled();
                }
            }
        }

        let handles = {
            let mut in_flight = inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *in_flight)
        };
        let deadline = Instant::now() + grace;
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(_) => report.completed += 1,
                Err(_) => {
                    handle.abort();
                    report.abandoned += 1;
                }
            }
        }

        info!(
            aborted = report.aborted,
            completed = report.completed,
            abandoned = report.abandoned,
            "Document sync shut down"
        );
        report
    }
}

impl<I: DocumentIntegration> CoalescerInner<I> {
    /// A deferred call's timer fired.
    fn fire(self: &Arc<Self>, request: SyncRequest, waited: Duration) {
        let id = request.aggregate_id.clone();
        if let Some(mut entry) = self.entries.get_mut(&id) {
            entry.fire(Instant::now().into_std());
        }
        self.timers.remove(&id);
        self.state.notify(Notice::info(
            "Document sync delayed",
            format!(
                "Folder changes for project {id} were sent after waiting {}s for the sync cooldown.",
                waited.as_secs()
            ),
        ));
        self.spawn_call(request);
    }

    fn spawn_call(self: &Arc<Self>, request: SyncRequest) {
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move { inner.perform(request).await });
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }

    async fn perform(&self, request: SyncRequest) {
        match self.integration.sync_category(&request).await {
            Ok(()) => debug!(key = %request.key(), "Document sync done"),
            Err(e) if e.is_rate_limited() => {
                info!(key = %request.key(), error = %e, "Document sync rate limited");
                self.state.notify(Notice::info(
                    "Document sync postponed",
                    "The document service is busy. Folders will catch up with the next change.",
                ));
            }
            Err(e) => {
                warn!(key = %request.key(), error = %e, "Document sync failed");
                self.state
                    .notify(Notice::warning("Document sync failed", e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{Aggregate, AggregateDetail, IntegrationSettings, NoticeLevel};

    use crate::integration::MockIntegration;

    fn connected_state(ids: &[&str]) -> SharedState {
        let state = SharedState::new();
        state.write(|s| {
            for id in ids {
                let aggregate = Aggregate::new(*id, "Hala", "Plzeň");
                let mut detail = AggregateDetail::empty(&aggregate);
                detail.integration = IntegrationSettings::connected("gdrive");
                s.data.details_by_id.insert(aggregate.id.clone(), detail);
                s.data.aggregates.push(aggregate);
            }
        });
        state
    }

    fn coalescer(state: &SharedState) -> (ExternalSyncCoalescer<MockIntegration>, MockIntegration) {
        let mock = MockIntegration::new();
        let coalescer = ExternalSyncCoalescer::new(
            Arc::new(mock.clone()),
            state.clone(),
            ThrottlePolicy::default(),
        );
        (coalescer, mock)
    }

    fn upsert(aggregate: &str, category: &str) -> SyncRequest {
        SyncRequest::upsert(aggregate.into(), category.into(), "Elektro")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // ===========================================
    // Admission
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn disconnected_integration_is_a_no_op() {
        let state = connected_state(&[]);
        state.write(|s| {
            let aggregate = Aggregate::new("p1", "Hala", "Plzeň");
            s.data
                .details_by_id
                .insert(aggregate.id.clone(), AggregateDetail::empty(&aggregate));
        });
        let (coalescer, mock) = coalescer(&state);

        assert_eq!(coalescer.request(upsert("p1", "c1")), None);
        assert_eq!(coalescer.request(upsert("unknown", "c1")), None);
        settle().await;
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_request_within_window_runs_once() {
        let state = connected_state(&["p1"]);
        let (coalescer, mock) = coalescer(&state);

        assert_eq!(coalescer.request(upsert("p1", "c1")), Some(Admission::RunNow));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            coalescer.request(upsert("p1", "c1")),
            Some(Admission::Duplicate)
        );
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_defers_second_call_to_sixty_seconds() {
        let state = connected_state(&["p1"]);
        let (coalescer, mock) = coalescer(&state);
        let mut notices = state.subscribe();

        coalescer.request(upsert("p1", "c1"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            coalescer.request(upsert("p1", "c2")),
            Some(Admission::Schedule {
                delay: Duration::from_secs(50)
            })
        );
        assert_eq!(coalescer.scheduled(), 1);

        tokio::time::sleep(Duration::from_secs(49)).await;
        assert_eq!(mock.call_count(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let times = mock.call_times();
        assert_eq!(times.len(), 2);
        let gap = times[1] - times[0];
        assert!(gap >= Duration::from_secs(60) && gap < Duration::from_secs(61));
        assert_eq!(coalescer.scheduled(), 0);

        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Info);
        assert_eq!(notice.title, "Document sync delayed");
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_category_creates_coalesces() {
        let state = connected_state(&["p1"]);
        let (coalescer, mock) = coalescer(&state);

        let mut admissions = Vec::new();
        for n in 0..5 {
            admissions.push(coalescer.request(upsert("p1", &format!("c{n}"))));
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        assert_eq!(admissions[0], Some(Admission::RunNow));
        assert!(matches!(admissions[1], Some(Admission::Schedule { .. })));
        assert!(admissions[2..]
            .iter()
            .all(|a| *a == Some(Admission::Coalesced)));

        tokio::time::sleep(Duration::from_secs(55)).await;
        assert_eq!(mock.call_count(), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        // The first request to schedule supplies the payload.
        assert_eq!(requests[1].category_id.as_str(), "c1");
    }

    #[tokio::test(start_paused = true)]
    async fn request_at_cooldown_expiry_keeps_spacing() {
        let state = connected_state(&["p1"]);
        let (coalescer, mock) = coalescer(&state);

        coalescer.request(upsert("p1", "c1"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        coalescer.request(upsert("p1", "c2"));
        tokio::time::sleep(Duration::from_secs(50)).await;

        // Lands on the same instant the deferred timer is due.
        let admission = coalescer.request(upsert("p1", "c3"));
        assert_ne!(admission, Some(Admission::RunNow));

        tokio::time::sleep(Duration::from_secs(59)).await;
        let times = mock.call_times();
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn aggregates_are_throttled_independently() {
        let state = connected_state(&["p1", "p2"]);
        let (coalescer, mock) = coalescer(&state);

        assert_eq!(coalescer.request(upsert("p1", "c1")), Some(Admission::RunNow));
        assert_eq!(coalescer.request(upsert("p2", "c1")), Some(Admission::RunNow));
        settle().await;
        assert_eq!(mock.call_count(), 2);
    }

    // ===========================================
    // Failures
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn rate_limit_is_informational() {
        let state = connected_state(&["p1", "p2"]);
        let (coalescer, mock) = coalescer(&state);
        let mut notices = state.subscribe();

        mock.fail_next("429 Too Many Requests");
        coalescer.request(upsert("p1", "c1"));
        settle().await;
        assert_eq!(notices.try_recv().unwrap().level, NoticeLevel::Info);

        mock.fail_next("folder missing");
        coalescer.request(upsert("p2", "c1"));
        settle().await;
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert!(notice.message.contains("folder missing"));
    }

    // ===========================================
    // Shutdown
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_timers_and_awaits_calls() {
        let state = connected_state(&["p1"]);
        let (coalescer, mock) = coalescer(&state);
        mock.set_delay(Duration::from_secs(2));

        coalescer.request(upsert("p1", "c1"));
        coalescer.request(upsert("p1", "c2"));
        settle().await;

        let report = coalescer.shutdown(Duration::from_secs(5)).await;
        assert_eq!(
            report,
            ShutdownReport {
                aborted: 1,
                completed: 1,
                abandoned: 0,
            }
        );
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_grace_is_bounded() {
        let state = connected_state(&["p1"]);
        let (coalescer, mock) = coalescer(&state);
        mock.set_delay(Duration::from_secs(30));

        coalescer.request(upsert("p1", "c1"));
        settle().await;

        let started = Instant::now();
        let report = coalescer.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report.abandoned, 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
