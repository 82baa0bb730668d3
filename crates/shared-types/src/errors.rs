//! # Error Types
//!
//! Errors raised while decoding shared types.

use thiserror::Error;

/// Errors that can occur when parsing shared types from their wire form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The event type string is not part of the closed set.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}
