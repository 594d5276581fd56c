//! Optimistic mutations.
//!
//! A mutation is applied to the latest shared state before the remote write
//! is awaited. If the write fails the touched slices are either restored
//! from a snapshot captured under the same lock (rollback) or fetched again
//! from the store (reload), depending on [`Mutation::recovery`]. Category
//! changes are forwarded to the integration only after the write succeeded.

use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, warn};

use sync_core::{apply_mutation, SliceSnapshot};
use sync_types::{Mutation, Notice, Recovery};

use crate::backend::DataBackend;
use crate::coalescer::ExternalSyncCoalescer;
use crate::error::ClientError;
use crate::hydrator::Hydrator;
use crate::integration::DocumentIntegration;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::state::SharedState;

pub(crate) struct MutationGateway<B, I> {
    backend: Arc<B>,
    state: SharedState,
    hydrator: Arc<Hydrator<B>>,
    coalescer: ExternalSyncCoalescer<I>,
    policy: RetryPolicy,
}

impl<B: DataBackend, I: DocumentIntegration> MutationGateway<B, I> {
    pub fn new(
        backend: Arc<B>,
        state: SharedState,
        hydrator: Arc<Hydrator<B>>,
        coalescer: ExternalSyncCoalescer<I>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            state,
            hydrator,
            coalescer,
            policy,
        }
    }

    pub async fn mutate(&self, mutation: Mutation) -> Result<(), ClientError> {
        let label = mutation.label();

        let applied = self.state.write(|state| {
            let snapshot = SliceSnapshot::capture(&state.data, &mutation.affected());
            apply_mutation(&mut state.data, &mutation).map(|()| snapshot)
        });
        let snapshot = match applied {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(action = label, error = %e, "Mutation does not apply");
                self.state.notify(failure_notice(label, &e));
                return Err(e.into());
            }
        };
        debug!(action = label, slices = snapshot.len(), "Optimistic change applied");

        let written = if self.backend.is_local() {
            self.backend.write(&mutation).await
        } else {
            let backend = &*self.backend;
            let mutation = &mutation;
            run_with_retry(label, &self.policy, move || backend.write(mutation)).await
        };

        match written {
            Ok(()) => {
                if let Some(request) = mutation.external_sync() {
                    self.coalescer.request(request);
                }
                Ok(())
            }
            Err(err) => {
                error!(action = label, error = %err, "Mutation failed");
                self.recover(&mutation, snapshot).await;
                self.state.notify(failure_notice(label, &err));
                Err(err.into())
            }
        }
    }

    async fn recover(&self, mutation: &Mutation, snapshot: SliceSnapshot) {
        match (mutation.recovery(), mutation.aggregate_id()) {
            (Recovery::Reload, Some(id)) => {
                if let Err(e) = self.hydrator.hydrate_one(id).await {
                    warn!(aggregate = %id, error = %e, "Reload failed, rolling back instead");
                    self.state.write(|state| snapshot.restore(&mut state.data));
                }
            }
            _ => self.state.write(|state| snapshot.restore(&mut state.data)),
        }
    }
}

fn failure_notice(label: &str, err: &impl Display) -> Notice {
    Notice::error(format!("Could not {label}"), err.to_string())
}
