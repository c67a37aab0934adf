//! Reconciliation error types

use serde::Serialize;
use thiserror::Error;

use privsync_connector::ConnectorError;
use privsync_core::{CoreError, SecretError};

/// Errors returned by reconciliation operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconcileError {
    /// A precondition or input rule failed. Nothing was executed.
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    /// The requested change conflicts with the server's current state.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// The database server could not be reached or rejected a query.
    #[error("Server error: {message}")]
    Server {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    #[error("Secret store error: {message}")]
    Secret { message: String },

    #[error("Snapshot store error: {message}")]
    Store { message: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl ReconcileError {
    pub fn validation(message: impl Into<String>) -> Self {
        ReconcileError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        ReconcileError::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ReconcileError::Conflict {
            message: message.into(),
        }
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::Validation { .. } => "VALIDATION",
            ReconcileError::NotFound { .. } => "NOT_FOUND",
            ReconcileError::Conflict { .. } => "CONFLICT",
            ReconcileError::Server { .. } => "SERVER_ERROR",
            ReconcileError::Secret { .. } => "SECRET_ERROR",
            ReconcileError::Store { .. } => "STORE_ERROR",
            ReconcileError::Cancelled => "CANCELLED",
        }
    }

    /// Whether the caller got a precondition wrong, as opposed to a runtime failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ReconcileError::Validation { .. }
                | ReconcileError::NotFound { .. }
                | ReconcileError::Conflict { .. }
        )
    }
}

impl From<CoreError> for ReconcileError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { message } => ReconcileError::Validation { message },
            CoreError::NotFound { resource, id } => ReconcileError::NotFound {
                resource,
                id: id.unwrap_or_default(),
            },
            CoreError::Conflict { message } => ReconcileError::Conflict { message },
            CoreError::Store { message } => ReconcileError::Store { message },
        }
    }
}

impl From<ConnectorError> for ReconcileError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Validation { message } => ReconcileError::Validation { message },
            ConnectorError::Vendor { message, code } => ReconcileError::Server { message, code },
            ConnectorError::Cancelled => ReconcileError::Cancelled,
            other => ReconcileError::Server {
                message: other.to_string(),
                code: None,
            },
        }
    }
}

impl From<SecretError> for ReconcileError {
    fn from(err: SecretError) -> Self {
        ReconcileError::Secret {
            message: err.to_string(),
        }
    }
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_keep_their_category() {
        let err: ReconcileError = CoreError::not_found("Account", Some("a-1")).into();
        assert_eq!(err, ReconcileError::not_found("Account", "a-1"));
        assert!(err.is_client_error());

        let err: ReconcileError = CoreError::conflict("duplicate scope").into();
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[test]
    fn test_vendor_message_is_kept_verbatim() {
        let err: ReconcileError = ConnectorError::Vendor {
            message: "permission denied for schema sales".to_string(),
            code: Some("42501".to_string()),
        }
        .into();
        assert_eq!(
            err,
            ReconcileError::Server {
                message: "permission denied for schema sales".to_string(),
                code: Some("42501".to_string()),
            }
        );
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_transport_errors_become_server_errors() {
        let err: ReconcileError = ConnectorError::ConnectionTimeout { timeout_secs: 15 }.into();
        assert_eq!(err.error_code(), "SERVER_ERROR");
        assert!(err.to_string().contains("15 seconds"));
    }

    #[test]
    fn test_cancellation_maps_through() {
        let err: ReconcileError = ConnectorError::Cancelled.into();
        assert_eq!(err, ReconcileError::Cancelled);
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let json = serde_json::to_value(ReconcileError::validation("bad")).unwrap();
        assert_eq!(json["type"], "validation");
        assert_eq!(json["message"], "bad");
    }
}
