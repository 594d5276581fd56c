//! Document-organization integration.
//!
//! The controller only consumes success or failure of a call; folder layout
//! and naming are the integration's business.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

use sync_types::SyncRequest;

use crate::error::IntegrationError;

/// Outbound calls to the document-organization service.
#[async_trait]
pub trait DocumentIntegration: Send + Sync + 'static {
    /// Create, rename or archive the folder of one category.
    async fn sync_category(&self, request: &SyncRequest) -> Result<(), IntegrationError>;
}

/// Integration that only logs the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingIntegration;

#[async_trait]
impl DocumentIntegration for LoggingIntegration {
    async fn sync_category(&self, request: &SyncRequest) -> Result<(), IntegrationError> {
        info!(
            aggregate = %request.aggregate_id,
            category = %request.category_id,
            action = %request.action,
            title = request.category_title.as_deref().unwrap_or(""),
            "Document sync"
        );
        Ok(())
    }
}

/// Mock integration for testing.
///
/// Records every request with the tokio clock reading at entry. Cloning
/// shares the call log.
#[derive(Debug, Clone, Default)]
pub struct MockIntegration {
    inner: Arc<Mutex<MockIntegrationInner>>,
}

#[derive(Debug, Default)]
struct MockIntegrationInner {
    calls: Vec<(tokio::time::Instant, SyncRequest)>,
    fail_next: VecDeque<String>,
    delay: Option<Duration>,
}

impl MockIntegration {
    /// Create a mock that accepts every request.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockIntegrationInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cause the next call to fail with `message`.
    pub fn fail_next(&self, message: &str) {
        self.lock().fail_next.push_back(message.to_string());
    }

    /// Make every call take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.lock().calls.iter().map(|(_, r)| r.clone()).collect()
    }

    /// Clock readings at which requests arrived.
    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.lock().calls.iter().map(|(at, _)| *at).collect()
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }
}

#[async_trait]
impl DocumentIntegration for MockIntegration {
    async fn sync_category(&self, request: &SyncRequest) -> Result<(), IntegrationError> {
        let (failure, delay) = {
            let mut inner = self.lock();
            inner
                .calls
                .push((tokio::time::Instant::now(), request.clone()));
            (inner.fail_next.pop_front(), inner.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(message) => Err(IntegrationError::classify(message)),
            None => Ok(()),
        }
    }
}
