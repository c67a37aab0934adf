//! privsync Core Library
//!
//! Shared vocabulary and declarative model for privsync.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers
//! - [`privilege`] - Privilege, PrivilegeSet and the normalized GrantScope key
//! - [`grant`] - Configured and observed grants, comparisons, SyncStatus
//! - [`capability`] - Read/Write/Create capability bits
//! - [`model`] - Integrations, accounts and the immutable Snapshot
//! - [`commands`] - Grant commands
//! - [`store`] - Snapshot store trait and in-memory implementation
//! - [`secrets`] - Secret store trait and environment-backed implementation
//! - [`audit`] - Audit sink trait and tracing-backed implementation
//! - [`error`] - CoreError
//!
//! # Example
//!
//! ```
//! use privsync_core::{GrantScope, Privilege, PrivilegeSet};
//!
//! let scope = GrantScope::new(Some("orders"), Some("   "));
//! assert_eq!(scope, GrantScope::database("orders"));
//!
//! let set = PrivilegeSet::from([Privilege::Select, Privilege::Update]);
//! assert!(set.contains(Privilege::Update));
//! ```

pub mod audit;
pub mod capability;
pub mod commands;
pub mod error;
pub mod grant;
pub mod ids;
pub mod model;
pub mod privilege;
pub mod secrets;
pub mod store;

pub use audit::{AuditAction, AuditEntry, AuditSink, TracingAuditSink};
pub use capability::Capabilities;
pub use commands::{GrantCommands, GrantInput};
pub use error::{CoreError, Result};
pub use grant::{ActualGrant, Grant, PermissionComparison, PrincipalPermissions, SyncStatus};
pub use ids::{AccountId, ApplicationId, DataStoreId, GrantId, IntegrationId, SecretProviderId};
pub use model::{
    Account, AccountTarget, AccountType, Application, DataStore, Integration, SecretBinding,
    SecretProviderRef, Snapshot,
};
pub use privilege::{GrantScope, Privilege, PrivilegeSet};
pub use secrets::{EnvSecretStore, Password, SecretError, SecretStore};
pub use store::{InMemorySnapshotStore, SnapshotMutator, SnapshotStore};
