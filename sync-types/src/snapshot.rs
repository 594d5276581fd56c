//! Shared dataset, load status and the consumer-facing snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{AggregateId, ContactId};
use crate::model::{Aggregate, AggregateDetail, ContactEntity, StatusConfig};

/// Everything the controller keeps in memory.
///
/// This is also the shape of the local persistence blob, hence the camelCase
/// keys: `{aggregates, detailsById, contacts, statuses}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// Listed projects, in list order.
    #[serde(default)]
    pub aggregates: Vec<Aggregate>,
    /// Hydrated project detail, keyed by project id.
    #[serde(default)]
    pub details_by_id: BTreeMap<AggregateId, AggregateDetail>,
    /// Subcontractors.
    #[serde(default)]
    pub contacts: Vec<ContactEntity>,
    /// Contact status taxonomy.
    #[serde(default)]
    pub statuses: Vec<StatusConfig>,
}

impl Dataset {
    /// Look up a listed project.
    pub fn aggregate(&self, id: &AggregateId) -> Option<&Aggregate> {
        self.aggregates.iter().find(|a| &a.id == id)
    }

    /// Look up a hydrated detail.
    pub fn detail(&self, id: &AggregateId) -> Option<&AggregateDetail> {
        self.details_by_id.get(id)
    }

    /// Look up a contact.
    pub fn contact(&self, id: &ContactId) -> Option<&ContactEntity> {
        self.contacts.iter().find(|c| &c.id == id)
    }
}

/// Bootstrap progress shown while the first load runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    /// Percent complete, 0..=100.
    pub percent: u8,
    /// What is being loaded.
    pub label: String,
}

impl Progress {
    /// Create a progress value, clamping `percent` to 100.
    pub fn new(percent: u8, label: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            label: label.into(),
        }
    }
}

/// Load flags that accompany the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStatus {
    /// True until the aggregate list has been committed.
    pub is_bootstrap_loading: bool,
    /// Fatal bootstrap failure, shown instead of the board.
    pub bootstrap_error: Option<String>,
    /// Progress of the current load.
    pub bootstrap_progress: Progress,
    /// True while detail, bids and collections are still hydrating.
    pub is_background_hydrating: bool,
    /// Latest non-fatal background failure.
    pub background_warning: Option<String>,
}

/// Read-only view handed to consumers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Entities.
    #[serde(flatten)]
    pub data: Dataset,
    /// Load flags.
    #[serde(flatten)]
    pub load: LoadStatus,
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Transient information.
    Info,
    /// Non-fatal problem.
    Warning,
    /// Failed user action.
    Error,
}

impl std::fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// A transient user-facing message (alert, toast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Short heading.
    pub title: String,
    /// Body text.
    pub message: String,
}

impl Notice {
    /// Informational notice.
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(NoticeLevel::Info, title, message)
    }

    /// Warning notice.
    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(NoticeLevel::Warning, title, message)
    }

    /// Error notice.
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(NoticeLevel::Error, title, message)
    }

    fn with_level(level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }
}
