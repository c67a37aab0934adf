//! Connector error types
//!
//! Error definitions with transient/permanent classification.

use thiserror::Error;

/// SQLSTATE `insufficient_privilege`.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Error that can occur while probing or inspecting a database server.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Input rejected before any connection attempt.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Failed to establish a connection to the server.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection attempt did not complete in time.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// The server rejected a statement or query.
    #[error("{message}")]
    Vendor {
        message: String,
        /// SQLSTATE reported by the server, if any.
        code: Option<String>,
    },

    /// Cancellation was observed before the next step began.
    #[error("operation cancelled")]
    Cancelled,
}

impl ConnectorError {
    /// Check if this error is transient and the operation may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. } | ConnectorError::ConnectionTimeout { .. }
        )
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// The server refused for lack of privilege (SQLSTATE 42501).
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            ConnectorError::Vendor { code: Some(code), .. } if code == INSUFFICIENT_PRIVILEGE
        )
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::Validation { .. } => "VALIDATION",
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ConnectorError::Vendor { .. } => "VENDOR_ERROR",
            ConnectorError::Cancelled => "CANCELLED",
        }
    }

    // Convenience constructors

    pub fn validation(message: impl Into<String>) -> Self {
        ConnectorError::Validation {
            message: message.into(),
        }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn vendor(message: impl Into<String>) -> Self {
        ConnectorError::Vendor {
            message: message.into(),
            code: None,
        }
    }

    /// Classify a driver error raised while executing `context`.
    ///
    /// Server-side errors keep their message and SQLSTATE verbatim; transport
    /// errors become connection failures.
    pub fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => ConnectorError::Vendor {
                message: db.message().to_string(),
                code: db.code().map(|c| c.into_owned()),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => {
                ConnectorError::connection_failed_with_source(context.to_string(), err)
            }
            other => ConnectorError::Vendor {
                message: format!("{context}: {other}"),
                code: None,
            },
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
