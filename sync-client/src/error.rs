//! Error types for bidsync-client.

use std::time::Duration;

use sync_core::ApplyError;

use crate::config::ConfigError;

/// Failure of one call against a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The call did not finish before its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Label of the timed-out call.
        operation: String,
        /// Deadline that was exceeded.
        after: Duration,
    },

    /// The store rejected the call.
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable message.
        message: String,
        /// Store-specific error code, if any.
        code: Option<String>,
        /// Additional structured detail, if any.
        details: Option<String>,
    },

    /// A record that must exist was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The mutation conflicts with stored data.
    #[error("rejected mutation: {0}")]
    Rejected(#[from] ApplyError),

    /// Encoding or decoding a stored record failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local file access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Transport error with only a message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            code: None,
            details: None,
        }
    }

    /// Whether this is a deadline failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Failure reported by the document-organization integration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrationError {
    /// The integration is throttling us.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Any other failure.
    #[error("integration call failed: {0}")]
    Failed(String),
}

impl IntegrationError {
    /// Classify a raw failure message.
    ///
    /// Messages containing `429` or `rate` (any case) are rate limits.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if lowered.contains("429") || lowered.contains("rate") {
            Self::RateLimited(message)
        } else {
            Self::Failed(message)
        }
    }

    /// Whether this is a rate-limit failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Main error type for controller operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Session lookup failed or returned no session.
    #[error("permission error: {0}")]
    Permission(String),

    /// Store call failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The mutation does not apply to the current state.
    #[error("cannot apply mutation: {0}")]
    Apply(#[from] ApplyError),

    /// Integration call failed.
    #[error("integration error: {0}")]
    Integration(#[from] IntegrationError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A referenced entity is not in the current state.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing entity.
        what: String,
    },
}
