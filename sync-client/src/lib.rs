//! # sync-client
//!
//! Client-side sync controller for bidsync.
//!
//! Keeps an in-memory view of projects, demand categories, bids and
//! subcontractors consistent with a slower remote store while the UI stays
//! responsive.
//!
//! ## Features
//!
//! - **Progressive Hydration**: the project list unblocks the board first,
//!   detail follows one project at a time, priority project first
//! - **Sequenced Loads**: results of superseded loads are never committed
//! - **Optimistic Mutations**: local apply first, rollback or reload on failure
//! - **Coalesced Integration Calls**: per-project dedupe and cooldown
//! - **Pluggable Storage**: SQLite, local JSON blob (offline/demo), mock
//!
//! ## Example
//!
//! ```ignore
//! use bidsync_client::{ClientConfig, LoggingIntegration, SqliteBackend, SyncController};
//!
//! let backend = SqliteBackend::open(path, Some("me@example.com".into())).await?;
//! let controller = SyncController::new(backend, LoggingIntegration, ClientConfig::default());
//!
//! controller.bootstrap().await?;
//! controller.set_bid_status(&project, &bid, BidStatus::Shortlist).await?;
//! controller.shutdown(Duration::from_secs(5)).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod error;
pub mod integration;
pub mod retry;

mod coalescer;
mod controller;
mod gateway;
mod hydrator;
mod state;

pub use backend::{BackendCall, DataBackend, LocalBlobBackend, MockBackend, SqliteBackend};
pub use coalescer::ShutdownReport;
pub use config::{CallConfig, ClientConfig, ConfigError, ExternalSyncConfig};
pub use controller::SyncController;
pub use error::{ClientError, IntegrationError, StoreError};
pub use hydrator::{HydrationReport, LoadOutcome};
pub use integration::{DocumentIntegration, LoggingIntegration, MockIntegration};
pub use retry::{run_with_retry, RetryPolicy};
