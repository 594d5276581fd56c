//! Local blob backend for offline and demo sessions.
//!
//! The whole dataset lives in one JSON file. It is read once when the backend
//! is opened and rewritten synchronously after every mutation, so the
//! optimistic apply and the "remote" write are the same operation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use sync_core::apply_mutation;
use sync_types::{
    AggregateId, AggregateRecord, Amendment, Bid, ContactEntity, ContractTerms, Dataset,
    FinancialSummary, LineCategory, Mutation, PermissionMetadata, Role, Session, StatusConfig,
};

use super::{dataset, DataBackend};
use crate::error::StoreError;

/// Email reported for the demo session.
pub const DEMO_EMAIL: &str = "demo@bidsync.local";

/// Dataset persisted as a single JSON blob.
#[derive(Debug)]
pub struct LocalBlobBackend {
    path: PathBuf,
    data: Mutex<Dataset>,
}

impl LocalBlobBackend {
    /// Open the blob at `path`; a missing file is an empty dataset.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let data = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Dataset::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "Opened local blob");
        Ok(Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        })
    }

    /// Create (or overwrite) the blob at `path` with `data`.
    pub fn create(path: &Path, data: Dataset) -> Result<Self, StoreError> {
        persist(path, &data)?;
        Ok(Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        })
    }

    /// Location of the blob.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Dataset> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn persist(path: &Path, data: &Dataset) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(data)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[async_trait]
impl DataBackend for LocalBlobBackend {
    async fn current_session(&self) -> Result<Option<Session>, StoreError> {
        Ok(Some(Session {
            user_id: "demo".to_string(),
            email: DEMO_EMAIL.to_string(),
            role: Role::Demo,
        }))
    }

    async fn list_aggregates(&self) -> Result<Vec<AggregateRecord>, StoreError> {
        Ok(dataset::records(&self.lock()))
    }

    async fn list_permissions(&self) -> Result<Vec<PermissionMetadata>, StoreError> {
        Ok(self
            .lock()
            .aggregates
            .iter()
            .map(|a| PermissionMetadata {
                aggregate_id: a.id.clone(),
                owner: DEMO_EMAIL.to_string(),
                shared_with: Vec::new(),
            })
            .collect())
    }

    async fn list_categories(&self, id: &AggregateId) -> Result<Vec<LineCategory>, StoreError> {
        Ok(dataset::categories(&self.lock(), id))
    }

    async fn get_contract(&self, id: &AggregateId) -> Result<Option<ContractTerms>, StoreError> {
        Ok(dataset::contract(&self.lock(), id))
    }

    async fn get_financials(
        &self,
        id: &AggregateId,
    ) -> Result<Option<FinancialSummary>, StoreError> {
        Ok(dataset::financials(&self.lock(), id))
    }

    async fn list_amendments(&self, id: &AggregateId) -> Result<Vec<Amendment>, StoreError> {
        Ok(dataset::amendments(&self.lock(), id))
    }

    async fn list_bids(&self) -> Result<Vec<Bid>, StoreError> {
        Ok(dataset::bids(&self.lock()))
    }

    async fn list_contacts(&self) -> Result<Vec<ContactEntity>, StoreError> {
        Ok(self.lock().contacts.clone())
    }

    async fn list_statuses(&self) -> Result<Vec<StatusConfig>, StoreError> {
        Ok(self.lock().statuses.clone())
    }

    async fn write(&self, mutation: &Mutation) -> Result<(), StoreError> {
        let mut data = self.lock();
        let mut next = data.clone();
        apply_mutation(&mut next, mutation)?;
        persist(&self.path, &next)?;
        *data = next;
        debug!(action = mutation.label(), "Local blob written");
        Ok(())
    }

    fn is_local(&self) -> bool {
        true
    }
}
