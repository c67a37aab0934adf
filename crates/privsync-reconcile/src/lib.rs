//! privsync Reconciliation
//!
//! Compares each account's configured grants with what the server reports,
//! fixes the difference on request, and keeps a cache of the results.
//!
//! # Modules
//!
//! - [`diff`] - Pure grant comparison and status derivation
//! - [`overview`] - Per-integration overview with orphan principals
//! - [`orchestrator`] - Resolve drift, create accounts, import permissions
//! - [`bulk`] - Reconcile every account of an integration
//! - [`integration`] - Capability verification and connection changes
//! - [`cache`] - Background-refreshed permissions cache
//! - [`error`] - `ReconcileError`
//!
//! # Example
//!
//! ```
//! use privsync_core::{ActualGrant, Grant, GrantScope, Privilege, PrivilegeSet};
//! use privsync_reconcile::diff::build_comparisons;
//!
//! let configured = vec![Grant::new(
//!     GrantScope::schema("orders", "public"),
//!     PrivilegeSet::from([Privilege::Select, Privilege::Update]),
//! )];
//! let actual = vec![ActualGrant::new(
//!     GrantScope::schema("orders", "public"),
//!     PrivilegeSet::from([Privilege::Select, Privilege::Insert]),
//! )];
//!
//! let comparisons = build_comparisons(&configured, &actual);
//! assert_eq!(comparisons[0].missing, PrivilegeSet::from([Privilege::Update]));
//! assert_eq!(comparisons[0].extra, PrivilegeSet::from([Privilege::Insert]));
//! ```

pub mod bulk;
pub mod cache;
pub mod diff;
pub mod error;
pub mod integration;
pub mod orchestrator;
pub mod overview;

pub use bulk::{BulkAccountOutcome, BulkAction, BulkReconcileResult};
pub use cache::{CacheConfig, CachedAccountStatus, CachedOverview, PermissionsCache, RefreshReport};
pub use error::{ReconcileError, ReconcileResult};
pub use integration::{ConnectionUpdate, IntegrationService};
pub use orchestrator::{
    AccountCreation, DriftResolution, PasswordSource, PermissionImport, ReconciliationOrchestrator,
};
pub use overview::{
    AccountPermissionStatus, IntegrationOverview, OrphanPrincipal, OverviewBuilder, OverviewSummary,
};
