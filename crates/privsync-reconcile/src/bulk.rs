//! Bulk reconciliation
//!
//! Creates every missing principal that has a secret binding and resolves
//! every drifted one, for all accounts of one integration.
//!
//! Accounts without a secret binding are always skipped: bulk mode never
//! takes a manual password, so those accounts must be created one at a time
//! through [`ReconciliationOrchestrator::create_sql_account`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use privsync_connector::OperationRecord;
use privsync_core::{AccountId, AuditAction, Capabilities, IntegrationId, Snapshot, SyncStatus};

use crate::error::ReconcileResult;
use crate::orchestrator::{
    require_capabilities, resolve_target, validate_password_source, PasswordSource,
    ReconciliationOrchestrator, Target,
};

/// What bulk reconciliation attempted for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Create,
    ResolveDrift,
    Skip,
}

/// Outcome for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkAccountOutcome {
    pub account_id: AccountId,
    pub account_name: String,
    pub principal_name: Option<String>,
    pub action: BulkAction,
    pub initial_status: SyncStatus,
    pub created: bool,
    pub drift_resolved: bool,
    pub skipped: bool,
    pub failed: bool,
    pub final_status: Option<SyncStatus>,
    /// Every step executed for this account, in order.
    pub operations: Vec<OperationRecord>,
    pub message: Option<String>,
}

impl BulkAccountOutcome {
    fn new(
        account_id: AccountId,
        account_name: &str,
        principal_name: Option<&str>,
        action: BulkAction,
        initial_status: SyncStatus,
    ) -> Self {
        Self {
            account_id,
            account_name: account_name.to_string(),
            principal_name: principal_name.map(str::to_string),
            action,
            initial_status,
            created: false,
            drift_resolved: false,
            skipped: false,
            failed: false,
            final_status: None,
            operations: Vec::new(),
            message: None,
        }
    }

    fn fail(&mut self, message: impl Into<String>) {
        self.failed = true;
        self.message = Some(message.into());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReconcileResult {
    pub integration_id: IntegrationId,
    pub accounts_created: usize,
    pub drifts_resolved: usize,
    pub skipped: usize,
    pub failed: usize,
    /// True when no account failed. A run with nothing to do succeeds.
    pub success: bool,
    /// Cancellation stopped the run before every account was attempted.
    pub cancelled: bool,
    pub outcomes: Vec<BulkAccountOutcome>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl BulkReconcileResult {
    fn from_outcomes(
        integration_id: IntegrationId,
        outcomes: Vec<BulkAccountOutcome>,
        cancelled: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        let count = |f: fn(&BulkAccountOutcome) -> bool| outcomes.iter().filter(|o| f(o)).count();
        let accounts_created = count(|o| o.created);
        let drifts_resolved = count(|o| o.drift_resolved);
        let skipped = count(|o| o.skipped);
        let failed = count(|o| o.failed);

        Self {
            integration_id,
            accounts_created,
            drifts_resolved,
            skipped,
            failed,
            success: failed == 0,
            cancelled,
            outcomes,
            started_at,
            completed_at: Utc::now(),
        }
    }
}

impl ReconciliationOrchestrator {
    /// Reconcile every account of an integration.
    ///
    /// Requires Read, Write and Create capability; without them nothing is
    /// inspected and the error names the missing capabilities.
    #[instrument(skip(self, actor, cancel))]
    pub async fn bulk_reconcile(
        &self,
        integration_id: IntegrationId,
        actor: &str,
        cancel: &CancellationToken,
    ) -> ReconcileResult<BulkReconcileResult> {
        let snapshot = self.store.get().await?;
        let integration = snapshot.require_integration(integration_id)?;
        require_capabilities(integration, Capabilities::ALL, "Bulk reconciliation")?;

        let result = self.bulk_reconcile_for(&snapshot, integration_id, cancel).await;
        self.record(AuditAction::BulkReconcile, actor, integration_id, &result)
            .await;
        result
    }

    async fn bulk_reconcile_for(
        &self,
        snapshot: &Snapshot,
        integration_id: IntegrationId,
        cancel: &CancellationToken,
    ) -> ReconcileResult<BulkReconcileResult> {
        let started_at = Utc::now();
        let integration = snapshot.require_integration(integration_id)?;
        let overview = self.overview.build(snapshot, integration, cancel).await?;

        let mut outcomes = Vec::new();
        let mut cancelled = false;

        for status in &overview.accounts {
            let action = match status.status {
                SyncStatus::MissingPrincipal => BulkAction::Create,
                SyncStatus::DriftDetected => BulkAction::ResolveDrift,
                SyncStatus::InSync | SyncStatus::Error | SyncStatus::NotApplicable => continue,
            };

            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let mut outcome = BulkAccountOutcome::new(
                status.account_id,
                &status.account_name,
                status.principal_name.as_deref(),
                action,
                status.status,
            );

            match resolve_target(snapshot, integration_id, status.account_id) {
                Ok(target) => match action {
                    BulkAction::Create => {
                        self.bulk_create(snapshot, &target, &mut outcome, cancel)
                            .await;
                    }
                    BulkAction::ResolveDrift => {
                        self.bulk_resolve(&target, &mut outcome, cancel).await;
                    }
                    BulkAction::Skip => {}
                },
                Err(e) => outcome.fail(e.to_string()),
            }

            debug!(
                account_id = %outcome.account_id,
                action = ?outcome.action,
                failed = outcome.failed,
                "Bulk account step finished"
            );
            outcomes.push(outcome);
        }

        let cancelled = cancelled || cancel.is_cancelled();
        let result =
            BulkReconcileResult::from_outcomes(integration_id, outcomes, cancelled, started_at);
        info!(
            accounts_created = result.accounts_created,
            drifts_resolved = result.drifts_resolved,
            skipped = result.skipped,
            failed = result.failed,
            cancelled = result.cancelled,
            "Bulk reconciliation completed"
        );
        Ok(result)
    }

    async fn bulk_create(
        &self,
        snapshot: &Snapshot,
        target: &Target,
        outcome: &mut BulkAccountOutcome,
        cancel: &CancellationToken,
    ) {
        if target.account.secret_binding.is_none() {
            outcome.action = BulkAction::Skip;
            outcome.skipped = true;
            outcome.message = Some(
                "Account has no secret binding; create it individually with a password"
                    .to_string(),
            );
            return;
        }

        if let Err(e) =
            validate_password_source(snapshot, &target.account, &PasswordSource::SecretBinding)
        {
            outcome.fail(e.to_string());
            return;
        }

        let creation = match self
            .create_account_for(target, PasswordSource::SecretBinding, cancel)
            .await
        {
            Ok(creation) => creation,
            Err(e) => {
                warn!(
                    account_id = %target.account.id,
                    error = %e,
                    "Bulk account creation failed"
                );
                outcome.fail(e.to_string());
                return;
            }
        };

        outcome.operations.extend(creation.operations);
        outcome.final_status = Some(creation.status);
        if !creation.success {
            outcome.fail(
                creation
                    .message
                    .unwrap_or_else(|| "Account creation did not complete".to_string()),
            );
            return;
        }
        outcome.created = true;

        if creation.status == SyncStatus::DriftDetected {
            self.bulk_resolve(target, outcome, cancel).await;
        }
    }

    async fn bulk_resolve(
        &self,
        target: &Target,
        outcome: &mut BulkAccountOutcome,
        cancel: &CancellationToken,
    ) {
        match self.resolve_drift_for(target, cancel).await {
            Ok(resolution) => {
                outcome.operations.extend(resolution.operations);
                outcome.final_status = Some(resolution.status);
                if resolution.success {
                    outcome.drift_resolved = true;
                } else {
                    outcome.fail(
                        resolution
                            .message
                            .unwrap_or_else(|| "Drift resolution did not complete".to_string()),
                    );
                }
            }
            Err(e) => {
                warn!(
                    account_id = %target.account.id,
                    error = %e,
                    "Bulk drift resolution failed"
                );
                outcome.fail(e.to_string());
            }
        }
    }
}
