//! # Domain Errors
//!
//! Error taxonomy of the box engine.
//!
//! ## Design Principles
//!
//! - Callers branch on the class (`BadRequest`, `Forbidden`, ...), never on text
//! - `describe` adds context without changing the class
//! - Collaborator errors are translated at the port boundary

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why an authorization check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForbiddenReason {
    /// No access rule lets the identity in.
    NoAccess,
    NotMember,
    NotAdmin,
    /// Only the author of a message may edit it.
    NotAuthor,
    AdminCannotLeave,
    /// The event type is only produced by the engine itself.
    SystemOnly,
    /// File messages cannot be edited.
    NotEditable,
}

impl ForbiddenReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ForbiddenReason::NoAccess => "no_access",
            ForbiddenReason::NotMember => "not_member",
            ForbiddenReason::NotAdmin => "not_admin",
            ForbiddenReason::NotAuthor => "not_author",
            ForbiddenReason::AdminCannotLeave => "admin_cannot_leave",
            ForbiddenReason::SystemOnly => "system_only",
            ForbiddenReason::NotEditable => "not_editable",
        }
    }
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the box engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoxError {
    /// Malformed or invalid input.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Authorization failure.
    #[error("Forbidden ({reason}): {message}")]
    Forbidden {
        reason: ForbiddenReason,
        message: String,
    },

    /// Duplicate active state (member, access rule, box).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing box, event or referrer.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The target was already consumed (deleted message).
    #[error("Gone: {0}")]
    Gone(String),

    /// The request was cancelled by its caller.
    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BoxError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        BoxError::BadRequest(message.into())
    }

    pub fn forbidden(reason: ForbiddenReason, message: impl Into<String>) -> Self {
        BoxError::Forbidden {
            reason,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        BoxError::Conflict(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        BoxError::NotFound(message.into())
    }

    pub fn gone(message: impl Into<String>) -> Self {
        BoxError::Gone(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        BoxError::Internal(message.into())
    }

    /// Prefix the message with context, keeping the class.
    #[must_use]
    pub fn describe(self, context: impl fmt::Display) -> Self {
        match self {
            BoxError::BadRequest(m) => BoxError::BadRequest(format!("{context}: {m}")),
            BoxError::Forbidden { reason, message } => BoxError::Forbidden {
                reason,
                message: format!("{context}: {message}"),
            },
            BoxError::Conflict(m) => BoxError::Conflict(format!("{context}: {m}")),
            BoxError::NotFound(m) => BoxError::NotFound(format!("{context}: {m}")),
            BoxError::Gone(m) => BoxError::Gone(format!("{context}: {m}")),
            BoxError::Cancelled => BoxError::Cancelled,
            BoxError::Internal(m) => BoxError::Internal(format!("{context}: {m}")),
        }
    }

    /// Short class name, used as a metric label.
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            BoxError::BadRequest(_) => "bad_request",
            BoxError::Forbidden { .. } => "forbidden",
            BoxError::Conflict(_) => "conflict",
            BoxError::NotFound(_) => "not_found",
            BoxError::Gone(_) => "gone",
            BoxError::Cancelled => "cancelled",
            BoxError::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, BoxError::Forbidden { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, BoxError::NotFound(_))
    }

    #[must_use]
    pub fn forbidden_reason(&self) -> Option<ForbiddenReason> {
        match self {
            BoxError::Forbidden { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Errors raised by event store adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The query matched no row.
    #[error("No rows: {0}")]
    NotFound(String),

    /// An event with this id is already stored.
    #[error("Duplicate event id: {0}")]
    Duplicate(String),

    #[error("Transaction already committed")]
    AlreadyCommitted,

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for BoxError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(m) => BoxError::NotFound(m),
            other => BoxError::Internal(other.to_string()),
        }
    }
}

/// Errors raised by cache adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<CacheError> for BoxError {
    fn from(err: CacheError) -> Self {
        BoxError::Internal(err.to_string())
    }
}

/// Errors raised by collaborator repositories.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl From<RepoError> for BoxError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(m) => BoxError::NotFound(m),
            RepoError::Unavailable(m) => BoxError::Internal(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_keeps_class() {
        let err = BoxError::forbidden(ForbiddenReason::NotAdmin, "must be admin")
            .describe("checking admin");
        assert_eq!(err.forbidden_reason(), Some(ForbiddenReason::NotAdmin));
        assert_eq!(
            err.to_string(),
            "Forbidden (not_admin): checking admin: must be admin"
        );

        let err = BoxError::gone("deleted").describe("editing");
        assert_eq!(err, BoxError::Gone("editing: deleted".to_string()));
        assert_eq!(BoxError::Cancelled.describe("x"), BoxError::Cancelled);
    }

    #[test]
    fn test_store_errors_translate_at_boundary() {
        let err: BoxError = StoreError::NotFound("event".into()).into();
        assert!(err.is_not_found());

        let err: BoxError = StoreError::Backend("io".into()).into();
        assert_eq!(err.class(), "internal");
    }

    #[test]
    fn test_repo_errors_translate() {
        let err: BoxError = RepoError::NotFound("identity".into()).into();
        assert!(err.is_not_found());
        let err: BoxError = RepoError::Unavailable("down".into()).into();
        assert_eq!(err, BoxError::Internal("down".to_string()));
    }
}
