//! Overview builder
//!
//! Inspects every account declared against an integration's data store and
//! lists the principals on the server that no account accounts for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use privsync_connector::PrincipalInspector;
use privsync_core::{
    Account, AccountId, AccountType, ActualGrant, Capabilities, Integration, IntegrationId,
    PermissionComparison, PrincipalPermissions, Snapshot, SyncStatus,
};

use crate::diff::{build_comparisons, compute_status, qualify_grants};
use crate::error::{ReconcileError, ReconcileResult};

/// Status of one declared account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPermissionStatus {
    pub account_id: AccountId,
    pub account_name: String,
    pub principal_name: Option<String>,
    pub status: SyncStatus,
    pub comparisons: Vec<PermissionComparison>,
    /// Why the account was not inspected, or the inspection error.
    pub message: Option<String>,
}

impl AccountPermissionStatus {
    fn not_applicable(account: &Account, message: impl Into<String>) -> Self {
        Self {
            account_id: account.id,
            account_name: account.name.clone(),
            principal_name: account.mapped_principal().map(str::to_string),
            status: SyncStatus::NotApplicable,
            comparisons: Vec::new(),
            message: Some(message.into()),
        }
    }
}

/// A principal on the server that no declared account maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanPrincipal {
    pub principal_name: String,
    pub grants: Vec<ActualGrant>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewSummary {
    pub total_accounts: usize,
    pub in_sync: usize,
    pub drift_detected: usize,
    pub missing_principal: usize,
    pub error: usize,
    pub not_applicable: usize,
    pub orphans: usize,
}

impl OverviewSummary {
    /// Tally account statuses.
    #[must_use]
    pub fn tally(accounts: &[AccountPermissionStatus], orphans: usize) -> Self {
        let mut summary = Self {
            total_accounts: accounts.len(),
            orphans,
            ..Self::default()
        };
        for account in accounts {
            match account.status {
                SyncStatus::InSync => summary.in_sync += 1,
                SyncStatus::DriftDetected => summary.drift_detected += 1,
                SyncStatus::MissingPrincipal => summary.missing_principal += 1,
                SyncStatus::Error => summary.error += 1,
                SyncStatus::NotApplicable => summary.not_applicable += 1,
            }
        }
        summary
    }
}

/// Permission overview of one integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationOverview {
    pub integration_id: IntegrationId,
    pub integration_name: String,
    pub capabilities: Capabilities,
    pub accounts: Vec<AccountPermissionStatus>,
    pub orphans: Vec<OrphanPrincipal>,
    pub summary: OverviewSummary,
    /// Set when the overview is incomplete.
    pub message: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl IntegrationOverview {
    fn unreadable(integration: &Integration) -> Self {
        Self {
            integration_id: integration.id,
            integration_name: integration.name.clone(),
            capabilities: integration.capabilities,
            accounts: Vec::new(),
            orphans: Vec::new(),
            summary: OverviewSummary::default(),
            message: Some(format!(
                "Integration '{}' lacks Read capability; verify its capabilities before \
                 inspecting permissions",
                integration.name
            )),
            generated_at: Utc::now(),
        }
    }
}

/// Builds overviews and single-account statuses through a [`PrincipalInspector`].
#[derive(Clone)]
pub struct OverviewBuilder {
    inspector: Arc<dyn PrincipalInspector>,
}

impl OverviewBuilder {
    pub fn new(inspector: Arc<dyn PrincipalInspector>) -> Self {
        Self { inspector }
    }

    /// Inspect one account. Inspection failures become an `Error` status.
    pub async fn account_status(
        &self,
        integration: &Integration,
        account: &Account,
        cancel: &CancellationToken,
    ) -> AccountPermissionStatus {
        if account.account_type != AccountType::Database {
            return AccountPermissionStatus::not_applicable(
                account,
                format!(
                    "Account type '{}' is not reconciled against database servers",
                    account.account_type.as_str()
                ),
            );
        }

        let Some(principal) = account.mapped_principal() else {
            return AccountPermissionStatus::not_applicable(
                account,
                "Account has no mapped principal name",
            );
        };

        let (status, comparisons, message) = match self
            .inspector
            .get_principal_permissions(integration, principal, cancel)
            .await
        {
            Ok(permissions) => {
                let configured = qualify_grants(
                    &account.grants,
                    self.inspector.default_database(integration).as_deref(),
                );
                let comparisons = build_comparisons(&configured, &permissions.grants);
                (compute_status(&permissions, &comparisons), comparisons, None)
            }
            Err(e) => {
                debug!(
                    account_id = %account.id,
                    principal = %principal,
                    error = %e,
                    "Account inspection failed"
                );
                (SyncStatus::Error, Vec::new(), Some(e.to_string()))
            }
        };

        AccountPermissionStatus {
            account_id: account.id,
            account_name: account.name.clone(),
            principal_name: Some(principal.to_string()),
            status,
            comparisons,
            message,
        }
    }

    /// Build the overview of `integration` from the accounts in `snapshot`.
    ///
    /// Fails only when cancellation is observed.
    #[instrument(skip_all, fields(integration_id = %integration.id))]
    pub async fn build(
        &self,
        snapshot: &Snapshot,
        integration: &Integration,
        cancel: &CancellationToken,
    ) -> ReconcileResult<IntegrationOverview> {
        if !integration.capabilities.contains(Capabilities::READ) {
            debug!("Skipping inspection of integration without Read capability");
            return Ok(IntegrationOverview::unreadable(integration));
        }

        let mut accounts = Vec::new();
        for account in snapshot.accounts_for(integration) {
            if cancel.is_cancelled() {
                return Err(ReconcileError::Cancelled);
            }
            accounts.push(self.account_status(integration, account, cancel).await);
        }

        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        let managed: HashSet<String> = snapshot
            .accounts_for(integration)
            .filter_map(Account::mapped_principal)
            .map(str::to_lowercase)
            .collect();

        let (orphans, message) = match self.inspector.get_all_principals(integration, cancel).await
        {
            Ok(principals) => (find_orphans(principals, &managed), None),
            Err(e) => {
                warn!(error = %e, "Principal enumeration failed; orphans not reported");
                (
                    Vec::new(),
                    Some(format!("Failed to enumerate principals: {e}")),
                )
            }
        };

        let summary = OverviewSummary::tally(&accounts, orphans.len());
        info!(
            accounts = summary.total_accounts,
            in_sync = summary.in_sync,
            drift_detected = summary.drift_detected,
            missing_principal = summary.missing_principal,
            errors = summary.error,
            orphans = summary.orphans,
            "Built permissions overview"
        );

        Ok(IntegrationOverview {
            integration_id: integration.id,
            integration_name: integration.name.clone(),
            capabilities: integration.capabilities,
            accounts,
            orphans,
            summary,
            message,
            generated_at: Utc::now(),
        })
    }
}

/// Principals whose lowercased name is not in `managed`, once each, sorted by name.
fn find_orphans(
    principals: Vec<PrincipalPermissions>,
    managed: &HashSet<String>,
) -> Vec<OrphanPrincipal> {
    let mut orphans: BTreeMap<String, Vec<ActualGrant>> = BTreeMap::new();
    for principal in principals {
        if managed.contains(&principal.principal_name.to_lowercase()) {
            continue;
        }
        orphans
            .entry(principal.principal_name)
            .or_default()
            .extend(principal.grants);
    }

    orphans
        .into_iter()
        .map(|(principal_name, grants)| OrphanPrincipal {
            principal_name,
            grants,
        })
        .collect()
}
