//! Error Types
//!
//! Errors raised by the declarative model: grant command validation, snapshot
//! lookups and the snapshot store.
//!
//! # Example
//!
//! ```
//! use privsync_core::{CoreError, Result};
//!
//! fn find_account(name: &str) -> Result<String> {
//!     if name.is_empty() {
//!         return Err(CoreError::not_found("Account", None::<String>));
//!     }
//!     Ok(format!("Account {}", name))
//! }
//! ```

use serde::Serialize;
use thiserror::Error;

/// Standardized error type for the declarative model.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreError {
    /// Input failed a validation rule.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the validation failure
        message: String,
    },

    /// Requested entity does not exist in the snapshot.
    #[error("{resource} not found{}", id.as_ref().map(|i| format!(": {i}")).unwrap_or_default())]
    NotFound {
        /// Kind of entity (e.g. "Integration", "Account")
        resource: String,
        /// Optional identifier of the entity
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// The change would violate a uniqueness rule.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflict
        message: String,
    },

    /// The snapshot store failed to load or persist.
    #[error("Snapshot store error: {message}")]
    Store {
        /// Description of the failure
        message: String,
    },
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: Option<impl ToString>) -> Self {
        CoreError::NotFound {
            resource: resource.into(),
            id: id.map(|i| i.to_string()),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        CoreError::Conflict {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        CoreError::Store {
            message: message.into(),
        }
    }
}

/// Type alias for Results using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_with_id() {
        let error = CoreError::not_found("Account", Some("abc"));
        assert_eq!(error.to_string(), "Account not found: abc");
    }

    #[test]
    fn test_not_found_display_without_id() {
        let error = CoreError::not_found("Integration", None::<String>);
        assert_eq!(error.to_string(), "Integration not found");
    }

    #[test]
    fn test_validation_display() {
        let error = CoreError::validation("privileges must not be empty");
        assert_eq!(
            error.to_string(),
            "Validation error: privileges must not be empty"
        );
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let error = CoreError::conflict("duplicate scope");
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["type"], "conflict");
        assert_eq!(json["message"], "duplicate scope");
    }

    #[test]
    fn test_is_std_error() {
        let error = CoreError::store("disk full");
        let _: &dyn std::error::Error = &error;
    }
}
