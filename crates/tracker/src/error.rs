//! Error types for the tracker crate.

use thiserror::Error;

use crate::rbac::Permission;

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors raised by the tracker domain.
///
/// Each variant maps onto one HTTP status class in the web layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// Input failed validation.
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Entity does not exist (or is not visible to the caller's tenant).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller lacks a permission.
    #[error("permission denied: requires {permission}")]
    Forbidden { permission: Permission },

    /// The caller is denied for a reason other than a missing permission.
    #[error("operation not allowed: {reason}")]
    NotAllowed { reason: String },

    /// Missing, unknown, or expired credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Uniqueness violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Snapshot could not be written or read.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl TrackerError {
    /// Create a validation error.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a forbidden error for a missing permission.
    #[must_use]
    pub const fn forbidden(permission: Permission) -> Self {
        Self::Forbidden { permission }
    }

    /// Create an error for a rule that is not a plain permission check.
    pub fn not_allowed(reason: impl Into<String>) -> Self {
        Self::NotAllowed {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_names_permission() {
        let err = TrackerError::forbidden(Permission::TaskAssign);
        assert_eq!(err.to_string(), "permission denied: requires task:assign");
    }

    #[test]
    fn test_not_found_display() {
        let err = TrackerError::not_found("task", "01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert_eq!(err.to_string(), "task not found: 01ARZ3NDEKTSV4RRFFQ69G5FAV");
    }

    #[test]
    fn test_io_error_is_persistence() {
        let err: TrackerError = std::io::Error::other("disk full").into();
        assert!(matches!(err, TrackerError::Persistence(_)));
    }
}
