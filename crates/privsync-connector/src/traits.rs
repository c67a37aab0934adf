//! Connector traits
//!
//! The two seams between the reconciliation engine and a database server.
//! Everything upstream is tested against fakes of these traits.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use privsync_core::{Integration, Password, PermissionComparison, PrincipalPermissions};

use crate::error::ConnectorResult;
use crate::operation::{OperationLog, ProbeOutcome};

/// Determines what the integration's own login may do on the server.
#[async_trait]
pub trait CapabilityProber: Send + Sync {
    /// Probe Read, Write and Create capability.
    ///
    /// Never fails: connection or query problems clear the affected bits and
    /// are reported in the outcome.
    async fn probe(&self, connection_string: &str, cancel: &CancellationToken) -> ProbeOutcome;
}

/// Reads and changes principals and their grants on the server.
#[async_trait]
pub trait PrincipalInspector: Send + Sync {
    /// Database that grants configured without one apply to.
    ///
    /// Inspected grants always name their database, so configured scopes are
    /// qualified with this before they are compared. `None` leaves them as
    /// configured.
    fn default_database(&self, _integration: &Integration) -> Option<String> {
        None
    }

    /// Existence and actual grants of one principal.
    ///
    /// A principal that does not exist is a successful inspection with
    /// `exists == false`.
    async fn get_principal_permissions(
        &self,
        integration: &Integration,
        principal_name: &str,
        cancel: &CancellationToken,
    ) -> ConnectorResult<PrincipalPermissions>;

    /// Every login principal on the server with its grants.
    async fn get_all_principals(
        &self,
        integration: &Integration,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Vec<PrincipalPermissions>>;

    /// Create a login principal able to connect to `databases`.
    async fn create_principal(
        &self,
        integration: &Integration,
        principal_name: &str,
        password: &Password,
        databases: &[String],
        cancel: &CancellationToken,
    ) -> ConnectorResult<OperationLog>;

    /// Grant every missing and revoke every extra privilege in `comparisons`.
    async fn apply_permission_changes(
        &self,
        integration: &Integration,
        principal_name: &str,
        comparisons: &[PermissionComparison],
        cancel: &CancellationToken,
    ) -> ConnectorResult<OperationLog>;
}
