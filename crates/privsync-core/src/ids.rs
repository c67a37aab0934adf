//! Strongly Typed Identifiers
//!
//! Newtype identifiers for every entity of the declarative model. Passing an
//! `AccountId` where an `IntegrationId` is expected does not compile.
//!
//! # Example
//!
//! ```
//! use privsync_core::{AccountId, IntegrationId};
//!
//! let integration = IntegrationId::new();
//! let account = AccountId::new();
//!
//! fn requires_integration(id: IntegrationId) -> String {
//!     id.to_string()
//! }
//!
//! let result = requires_integration(integration);
//! // requires_integration(account); // This would not compile!
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse
    pub id_type: &'static str,
    /// The underlying UUID parse error message
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Identifier of a database integration (one external server connection).
    IntegrationId
);

define_id!(
    /// Identifier of a declared account.
    AccountId
);

define_id!(
    /// Identifier of a data store an integration points at.
    DataStoreId
);

define_id!(
    /// Identifier of an application an account may belong to.
    ApplicationId
);

define_id!(
    /// Identifier of a configured secret provider.
    SecretProviderId
);

define_id!(
    /// Identifier of a configured grant within an account.
    GrantId
);
