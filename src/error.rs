//! Error types for HiveWatch.
//!
//! Every layer reports failures through a `thiserror` enum. The store layer
//! produces `StoreError`, control inputs produce `ValidationError`, and the
//! outbound channel produces `NotificationError`. `HiveError` wraps them all
//! for callers of the control surface.

use thiserror::Error;

/// Errors reported by the remote store or by the blocking facade over it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The completion callback did not fire within the wait bound.
    #[error("Store operation on '{path}' timed out after {duration_ms}ms")]
    Timeout {
        path: String,
        duration_ms: u64,
    },

    /// The store reported a failure (permission denied, unavailable, ...).
    #[error("Remote store error on '{path}' ({code}): {message}")]
    Remote {
        path: String,
        code: String,
        message: String,
    },

    /// The completion callback was dropped without being invoked.
    #[error("Store completion for '{path}' was dropped")]
    Disconnected {
        path: String,
    },

    /// A document could not be decoded into the requested record type.
    #[error("Failed to decode document at '{path}': {message}")]
    Decode {
        path: String,
        message: String,
    },
}

impl StoreError {
    /// Creates a remote error with a permission-denied code.
    #[must_use]
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::Remote {
            path: path.into(),
            code: "permission-denied".to_string(),
            message: "client does not have permission to access the path".to_string(),
        }
    }

    /// Creates a remote error with an unavailable code.
    #[must_use]
    pub fn unavailable(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            path: path.into(),
            code: "unavailable".to_string(),
            message: message.into(),
        }
    }
}

/// Validation errors for control-surface inputs and configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Inhibition duration must be a positive number of hours, got {hours}")]
    NonPositiveDuration {
        hours: i64,
    },

    #[error("Inhibition duration of {hours}h exceeds the maximum of {max_hours}h")]
    DurationTooLong {
        hours: i64,
        max_hours: i64,
    },

    #[error("Entity id cannot be empty")]
    EmptyEntityId,

    #[error("Invalid store path '{path}': {reason}")]
    InvalidPath {
        path: String,
        reason: String,
    },

    #[error("Document written to '{path}' must be a JSON object")]
    NotAnObject {
        path: String,
    },

    #[error("Field '{field}' value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: String,
        min: String,
        max: String,
    },
}

/// Errors raised by an outbound notification channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("Notification transport failed: {message}")]
    Transport {
        message: String,
    },

    #[error("Invalid recipient address '{address}'")]
    InvalidRecipient {
        address: String,
    },
}

/// Top-level error type for HiveWatch.
#[derive(Debug, Error)]
pub enum HiveError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("{kind} not found: {id}")]
    NotFound {
        kind: &'static str,
        id: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },
}

impl HiveError {
    /// Creates a not-found error for a record kind.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a facade timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Store(StoreError::Timeout { .. }))
    }

    /// Returns true if this is a not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(StoreError::Timeout { .. } | StoreError::Disconnected { .. }) => true,
            Self::Store(StoreError::Remote { code, .. }) => code == "unavailable",
            Self::Notification(NotificationError::Transport { .. }) => true,
            _ => false,
        }
    }
}

/// Result type alias for HiveWatch operations.
pub type HiveResult<T> = Result<T, HiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_timeout_display() {
        let err = StoreError::Timeout {
            path: "hives/H1".to_string(),
            duration_ms: 30_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("hives/H1"));
        assert!(msg.contains("30000ms"));
    }

    #[test]
    fn test_validation_duration_display() {
        let err = ValidationError::NonPositiveDuration { hours: -3 };
        assert!(err.to_string().contains("-3"));
    }

    #[test]
    fn test_hive_error_from_validation() {
        let err: HiveError = ValidationError::EmptyEntityId.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_hive_error_timeout_is_retryable() {
        let err: HiveError = StoreError::Timeout {
            path: "p".to_string(),
            duration_ms: 10,
        }
        .into();
        assert!(err.is_timeout());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_permission_denied_not_retryable() {
        let err: HiveError = StoreError::permission_denied("readings").into();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("permission-denied"));

        let err: HiveError = StoreError::unavailable("readings", "offline").into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_found_display() {
        let err = HiveError::not_found("Hive", "H1");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Hive not found: H1");
    }
}
