//! Error types for bidsync-types.

use thiserror::Error;

/// Failure to parse one of the model's enumerated literals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The literal is not a known value of the named enum.
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// Which enum was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}

impl ParseError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.to_string(),
        }
    }
}
