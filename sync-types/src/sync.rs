//! Outbound request payload for the document-organization integration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::ids::{AggregateId, CategoryId};

/// What the integration should do with the category's folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    /// Create or rename the folder.
    Upsert,
    /// Move the folder to the archive.
    Archive,
}

impl SyncAction {
    /// Wire literal.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "archive" => Ok(Self::Archive),
            other => Err(ParseError::unknown("sync action", other)),
        }
    }
}

/// One request to the integration.
///
/// Serializes with camelCase keys, matching what the integration endpoint
/// accepts: `{aggregateId, categoryId, categoryTitle?, action}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Project whose folder tree is touched.
    pub aggregate_id: AggregateId,
    /// Category folder being created, renamed or archived.
    pub category_id: CategoryId,
    /// Folder title, sent for upserts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_title: Option<String>,
    /// Requested action.
    pub action: SyncAction,
}

impl SyncRequest {
    /// Request to create or rename a category folder.
    pub fn upsert(aggregate_id: AggregateId, category_id: CategoryId, title: &str) -> Self {
        Self {
            aggregate_id,
            category_id,
            category_title: Some(title.to_string()),
            action: SyncAction::Upsert,
        }
    }

    /// Request to archive a category folder.
    pub fn archive(aggregate_id: AggregateId, category_id: CategoryId) -> Self {
        Self {
            aggregate_id,
            category_id,
            category_title: None,
            action: SyncAction::Archive,
        }
    }

    /// Dedupe key: aggregate, action and target.
    ///
    /// The title is not part of the key, so a rename shortly after a create
    /// is treated as the same call.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.aggregate_id, self.action, self.category_id)
    }
}
