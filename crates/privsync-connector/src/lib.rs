//! privsync Connector
//!
//! Talks to the database server on behalf of the reconciliation engine:
//! probes what the integration's login may do, inspects principals and their
//! grants, creates principals and applies grant/revoke changes.
//!
//! # Modules
//!
//! - [`traits`] - `CapabilityProber` and `PrincipalInspector`
//! - [`operation`] - Per-step operation records and probe outcomes
//! - [`mapping`] - Vendor permission name to `Privilege` table
//! - [`statements`] - GRANT/REVOKE/CREATE ROLE builders
//! - [`postgres`] - PostgreSQL implementation
//! - [`config`] - Connection settings and parsed targets
//! - [`error`] - `ConnectorError`

pub mod config;
pub mod error;
pub mod mapping;
pub mod operation;
pub mod postgres;
pub mod statements;
pub mod traits;

pub use config::{ConnectionSettings, ConnectionTarget};
pub use error::{ConnectorError, ConnectorResult};
pub use operation::{OperationKind, OperationLog, OperationRecord, ProbeOutcome};
pub use postgres::{PostgresCapabilityProber, PostgresInspector};
pub use traits::{CapabilityProber, PrincipalInspector};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::operation::{OperationKind, OperationLog, OperationRecord, ProbeOutcome};
    pub use crate::traits::{CapabilityProber, PrincipalInspector};
}
