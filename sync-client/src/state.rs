//! Shared controller state and the notice channel.
//!
//! All writers go through [`SharedState::write`], a short synchronous
//! critical section that never spans an `.await`. Every commit therefore
//! sees the latest value and lands atomically.

use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use sync_types::{Dataset, LoadStatus, Notice, Progress, Snapshot};

/// Capacity of the notice channel; slow subscribers skip older notices.
const NOTICE_CAPACITY: usize = 64;

/// Dataset plus load flags.
#[derive(Debug, Clone, Default)]
pub(crate) struct AppState {
    pub data: Dataset,
    pub load: LoadStatus,
}

impl AppState {
    pub fn set_progress(&mut self, percent: u8, label: &str) {
        self.load.bootstrap_progress = Progress::new(percent, label);
    }
}

/// Handle to the single shared mutable resource.
#[derive(Debug, Clone)]
pub(crate) struct SharedState {
    inner: Arc<RwLock<AppState>>,
    notices: broadcast::Sender<Notice>,
}

impl SharedState {
    pub fn new() -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(AppState::default())),
            notices,
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.read(|state| Snapshot {
            data: state.data.clone(),
            load: state.load.clone(),
        })
    }

    /// Publish a notice. Nobody listening is fine.
    pub fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }
}
