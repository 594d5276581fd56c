//! # bidsync-types
//!
//! Data model and payload types for the bidsync project pipeline controller.
//!
//! This crate provides the foundational types used across all bidsync crates:
//! - [`AggregateId`], [`CategoryId`], [`BidId`], [`ContactId`], [`Generation`] - Identity and ordering types
//! - [`Aggregate`], [`AggregateDetail`], [`LineCategory`], [`Bid`], [`ContactEntity`] - Domain records
//! - [`Mutation`] - User-initiated changes with their recovery metadata
//! - [`SyncRequest`] - Outbound document-integration payload
//! - [`Snapshot`] - Read-only consumer view
//! - [`ParseError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod model;
mod mutation;
mod snapshot;
mod sync;

pub use error::ParseError;
pub use ids::{AggregateId, BidId, CategoryId, ContactId, Generation};
pub use model::{
    Aggregate, AggregateDetail, AggregateRecord, AggregateStatus, Amendment, Bid, BidStatus,
    CategoryStatus, ContactEntity, ContactPerson, ContractTerms, FinancialSummary,
    IntegrationSettings, IntegrationStatus, LineCategory, PermissionMetadata, Role, Session,
    StatusConfig,
};
pub use mutation::{DetailPatch, Mutation, Recovery, Slice};
pub use snapshot::{Dataset, LoadStatus, Notice, NoticeLevel, Progress, Snapshot};
pub use sync::{SyncAction, SyncRequest};
