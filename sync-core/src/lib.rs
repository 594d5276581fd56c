//! # sync-core
//!
//! Pure logic for bidsync (no I/O, instant tests).
//!
//! This crate implements the decision logic of the sync controller without
//! any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`generation`] mints load generations and gates commits
//! - [`backoff`] computes retry delays
//! - [`hydration`] orders the detail queue and builds additive merges
//! - [`apply`] applies mutations locally and captures slices for rollback
//! - [`throttle`] decides whether an outbound integration call runs, waits or is dropped
//!
//! The actual I/O (store reads, writes, timers) is performed by `sync-client`,
//! which interprets the decisions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod apply;
pub mod backoff;
pub mod generation;
pub mod hydration;
pub mod throttle;

pub use apply::{apply_mutation, normalize_contact, ApplyError, SliceSnapshot};
pub use backoff::backoff_delay;
pub use generation::{Commit, GenerationToken, LoadMode, LoadSequencer};
pub use hydration::{
    build_detail, commit_bids, commit_detail, commit_list, hydration_queue, merge_permissions,
    partition_bids, refresh_bid_counts, BidPartition, DetailParts,
};
pub use throttle::{
    Admission, PendingSyncEntry, ThrottlePolicy, DEFAULT_COOLDOWN, DEFAULT_DEDUPE_WINDOW,
};
