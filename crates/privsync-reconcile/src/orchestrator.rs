//! Reconciliation orchestrator
//!
//! Single-account operations: resolve drift, create the principal for an
//! account, and import the principal's actual grants into the account.
//! Bulk reconciliation lives in [`crate::bulk`].
//!
//! Every operation validates its preconditions against the snapshot before
//! any call to the server, and writes one audit entry once they have passed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use privsync_connector::{OperationRecord, PrincipalInspector};
use privsync_core::commands::replace_with_actual;
use privsync_core::{
    Account, AccountId, AccountTarget, AccountType, AuditAction, AuditEntry, AuditSink,
    Capabilities, Integration, IntegrationId, Password, PermissionComparison, SecretBinding,
    SecretError, SecretProviderId, SecretStore, Snapshot, SnapshotStore, SyncStatus,
};

use crate::diff::{build_comparisons, compute_status, has_drift, qualify_grants};
use crate::error::{ReconcileError, ReconcileResult};
use crate::overview::OverviewBuilder;

/// Where the password of a new principal comes from.
#[derive(Debug, Clone)]
pub enum PasswordSource {
    /// Reveal the secret bound to the account.
    SecretBinding,
    /// Use a password supplied by the caller.
    Manual { password: Password },
    /// Use a password supplied by the caller and store it as a new secret,
    /// binding it to the account.
    ManualAndStore {
        password: Password,
        provider_id: SecretProviderId,
        secret_name: String,
    },
}

impl PasswordSource {
    fn as_str(&self) -> &'static str {
        match self {
            PasswordSource::SecretBinding => "secret_binding",
            PasswordSource::Manual { .. } => "manual",
            PasswordSource::ManualAndStore { .. } => "manual_and_store",
        }
    }
}

/// Result of resolving drift for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftResolution {
    pub integration_id: IntegrationId,
    pub account_id: AccountId,
    pub principal_name: String,
    /// Whether every apply step succeeded.
    pub success: bool,
    pub cancelled: bool,
    pub operations: Vec<OperationRecord>,
    /// Status after the change, from a fresh inspection.
    pub status: SyncStatus,
    pub comparisons: Vec<PermissionComparison>,
    pub message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Result of creating the principal for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreation {
    pub integration_id: IntegrationId,
    pub account_id: AccountId,
    pub principal_name: String,
    /// Whether every creation step succeeded.
    pub success: bool,
    pub cancelled: bool,
    pub operations: Vec<OperationRecord>,
    /// Whether the password was stored as a new secret.
    pub secret_stored: bool,
    pub status: SyncStatus,
    pub comparisons: Vec<PermissionComparison>,
    pub message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Result of importing a principal's actual grants into its account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionImport {
    pub integration_id: IntegrationId,
    pub account_id: AccountId,
    pub principal_name: String,
    pub imported_grants: usize,
    pub completed_at: DateTime<Utc>,
}

/// Status from a re-inspection after a change.
struct Reinspection {
    status: SyncStatus,
    comparisons: Vec<PermissionComparison>,
    error: Option<String>,
}

/// Integration, account and principal an operation acts on.
pub(crate) struct Target {
    pub(crate) integration: Integration,
    pub(crate) account: Account,
    pub(crate) principal: String,
}

/// Check that `account` is a database account of `integration`'s data store
/// with a mapped principal.
pub(crate) fn resolve_target(
    snapshot: &Snapshot,
    integration_id: IntegrationId,
    account_id: AccountId,
) -> ReconcileResult<Target> {
    let integration = snapshot.require_integration(integration_id)?;
    let account = snapshot.require_account(account_id)?;

    if account.account_type != AccountType::Database {
        return Err(ReconcileError::validation(format!(
            "Account '{}' is a {} account; only database accounts can be reconciled",
            account.name,
            account.account_type.as_str()
        )));
    }

    match &account.target {
        AccountTarget::DataStore(id) if *id == integration.data_store_id => {}
        AccountTarget::DataStore(_) => {
            return Err(ReconcileError::validation(format!(
                "Account '{}' targets a different data store than integration '{}'",
                account.name, integration.name
            )));
        }
        AccountTarget::Application(_) | AccountTarget::External { .. } => {
            return Err(ReconcileError::validation(format!(
                "Account '{}' does not target a data store",
                account.name
            )));
        }
    }

    let principal = account.mapped_principal().ok_or_else(|| {
        ReconcileError::validation(format!(
            "Account '{}' has no mapped principal name",
            account.name
        ))
    })?;

    Ok(Target {
        integration: integration.clone(),
        account: account.clone(),
        principal: principal.to_string(),
    })
}

/// Fail with a validation error naming the capabilities `integration` lacks.
pub(crate) fn require_capabilities(
    integration: &Integration,
    required: Capabilities,
    operation: &str,
) -> ReconcileResult<()> {
    let missing = integration.capabilities.missing(required);
    if missing.is_empty() {
        return Ok(());
    }
    Err(ReconcileError::validation(format!(
        "{operation} requires {required} capability on integration '{}'; missing: {missing}",
        integration.name
    )))
}

/// Validate a password source against the snapshot without touching any store.
pub(crate) fn validate_password_source(
    snapshot: &Snapshot,
    account: &Account,
    source: &PasswordSource,
) -> ReconcileResult<()> {
    let require_provider = |provider_id: SecretProviderId| {
        snapshot
            .secret_provider(provider_id)
            .map(|_| ())
            .ok_or_else(|| ReconcileError::not_found("SecretProvider", provider_id))
    };

    match source {
        PasswordSource::SecretBinding => {
            let binding = account.secret_binding.as_ref().ok_or_else(|| {
                ReconcileError::validation(format!(
                    "Account '{}' has no secret binding",
                    account.name
                ))
            })?;
            if binding.secret_name.trim().is_empty() {
                return Err(ReconcileError::validation(
                    "Secret binding has a blank secret name",
                ));
            }
            require_provider(binding.provider_id)
        }
        PasswordSource::Manual { password } => {
            if password.is_blank() {
                return Err(ReconcileError::validation("Password must not be blank"));
            }
            Ok(())
        }
        PasswordSource::ManualAndStore {
            password,
            provider_id,
            secret_name,
        } => {
            if password.is_blank() {
                return Err(ReconcileError::validation("Password must not be blank"));
            }
            if secret_name.trim().is_empty() {
                return Err(ReconcileError::validation("Secret name must not be blank"));
            }
            require_provider(*provider_id)
        }
    }
}

/// Drift resolution, account creation and permission import.
pub struct ReconciliationOrchestrator {
    pub(crate) store: Arc<dyn SnapshotStore>,
    pub(crate) inspector: Arc<dyn PrincipalInspector>,
    pub(crate) secrets: Arc<dyn SecretStore>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) overview: OverviewBuilder,
}

impl ReconciliationOrchestrator {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        inspector: Arc<dyn PrincipalInspector>,
        secrets: Arc<dyn SecretStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let overview = OverviewBuilder::new(inspector.clone());
        Self {
            store,
            inspector,
            secrets,
            audit,
            overview,
        }
    }

    /// Bring the principal's grants in line with the account's configured grants.
    ///
    /// Requires Write capability and an existing principal. With no drift
    /// this returns success without executing anything.
    #[instrument(skip(self, actor, cancel))]
    pub async fn resolve_drift(
        &self,
        integration_id: IntegrationId,
        account_id: AccountId,
        actor: &str,
        cancel: &CancellationToken,
    ) -> ReconcileResult<DriftResolution> {
        let snapshot = self.store.get().await?;
        let target = resolve_target(&snapshot, integration_id, account_id)?;
        require_capabilities(&target.integration, Capabilities::WRITE, "Drift resolution")?;

        let result = self.resolve_drift_for(&target, cancel).await;
        self.record(AuditAction::ResolveDrift, actor, account_id, &result)
            .await;
        result
    }

    pub(crate) async fn resolve_drift_for(
        &self,
        target: &Target,
        cancel: &CancellationToken,
    ) -> ReconcileResult<DriftResolution> {
        let Target {
            integration,
            account,
            principal,
        } = target;

        let current = self
            .inspector
            .get_principal_permissions(integration, principal, cancel)
            .await?;
        if !current.exists {
            return Err(ReconcileError::validation(format!(
                "Principal '{principal}' does not exist; create the account instead"
            )));
        }

        let configured = qualify_grants(
            &account.grants,
            self.inspector.default_database(integration).as_deref(),
        );
        let comparisons = build_comparisons(&configured, &current.grants);
        if !has_drift(&comparisons) {
            info!(principal = %principal, "No drift to resolve");
            return Ok(DriftResolution {
                integration_id: integration.id,
                account_id: account.id,
                principal_name: principal.clone(),
                success: true,
                cancelled: false,
                operations: Vec::new(),
                status: SyncStatus::InSync,
                comparisons,
                message: None,
                completed_at: Utc::now(),
            });
        }

        let log = self
            .inspector
            .apply_permission_changes(integration, principal, &comparisons, cancel)
            .await?;
        let success = log.success();
        let first_error = log.first_error().map(str::to_string);

        let after = self.reinspect(target, cancel).await;
        info!(
            principal = %principal,
            success,
            operations = log.operations.len(),
            failed = log.failed_count(),
            status = %after.status,
            "Drift resolution completed"
        );

        Ok(DriftResolution {
            integration_id: integration.id,
            account_id: account.id,
            principal_name: principal.clone(),
            success,
            cancelled: log.cancelled,
            operations: log.operations,
            status: after.status,
            comparisons: after.comparisons,
            message: first_error.or(after.error),
            completed_at: Utc::now(),
        })
    }

    /// Create the principal of an account on the server.
    ///
    /// Requires Create capability. An existing principal is a conflict;
    /// use [`Self::resolve_drift`] for it instead.
    #[instrument(skip(self, source, actor, cancel), fields(source = source.as_str()))]
    pub async fn create_sql_account(
        &self,
        integration_id: IntegrationId,
        account_id: AccountId,
        source: PasswordSource,
        actor: &str,
        cancel: &CancellationToken,
    ) -> ReconcileResult<AccountCreation> {
        let snapshot = self.store.get().await?;
        let target = resolve_target(&snapshot, integration_id, account_id)?;
        require_capabilities(&target.integration, Capabilities::CREATE, "Account creation")?;
        validate_password_source(&snapshot, &target.account, &source)?;

        let result = self.create_account_for(&target, source, cancel).await;
        self.record(AuditAction::CreateAccount, actor, account_id, &result)
            .await;
        result
    }

    pub(crate) async fn create_account_for(
        &self,
        target: &Target,
        source: PasswordSource,
        cancel: &CancellationToken,
    ) -> ReconcileResult<AccountCreation> {
        let Target {
            integration,
            account,
            principal,
        } = target;

        let current = self
            .inspector
            .get_principal_permissions(integration, principal, cancel)
            .await?;
        if current.exists {
            return Err(ReconcileError::conflict(format!(
                "Principal '{principal}' already exists; resolve drift instead"
            )));
        }

        let (password, secret_stored) = self.obtain_password(account, source).await?;

        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        let log = self
            .inspector
            .create_principal(
                integration,
                principal,
                &password,
                &account.connect_databases(),
                cancel,
            )
            .await?;
        let success = log.success();
        let first_error = log.first_error().map(str::to_string);

        let after = self.reinspect(target, cancel).await;
        info!(
            principal = %principal,
            success,
            operations = log.operations.len(),
            status = %after.status,
            "Account creation completed"
        );

        Ok(AccountCreation {
            integration_id: integration.id,
            account_id: account.id,
            principal_name: principal.clone(),
            success,
            cancelled: log.cancelled,
            operations: log.operations,
            secret_stored,
            status: after.status,
            comparisons: after.comparisons,
            message: first_error.or(after.error),
            completed_at: Utc::now(),
        })
    }

    /// Resolve the password, storing and binding it first if asked to.
    async fn obtain_password(
        &self,
        account: &Account,
        source: PasswordSource,
    ) -> ReconcileResult<(Password, bool)> {
        match source {
            PasswordSource::SecretBinding => {
                let binding = account.secret_binding.as_ref().ok_or_else(|| {
                    ReconcileError::validation(format!(
                        "Account '{}' has no secret binding",
                        account.name
                    ))
                })?;
                let password = self
                    .secrets
                    .reveal(
                        binding.provider_id,
                        &binding.secret_name,
                        binding.version.as_deref(),
                    )
                    .await?;
                if password.is_blank() {
                    return Err(SecretError::InvalidValue {
                        name: binding.secret_name.clone(),
                        detail: "secret is empty".to_string(),
                    }
                    .into());
                }
                Ok((password, false))
            }
            PasswordSource::Manual { password } => Ok((password, false)),
            PasswordSource::ManualAndStore {
                password,
                provider_id,
                secret_name,
            } => {
                self.secrets
                    .create(provider_id, &secret_name, &password)
                    .await?;

                let account_id = account.id;
                let binding = SecretBinding {
                    provider_id,
                    secret_name,
                    version: None,
                };
                self.store
                    .update(Box::new(move |current: &Snapshot| {
                        let mut next = current.clone();
                        next.account_mut(account_id)?.secret_binding = Some(binding);
                        Ok(next)
                    }))
                    .await?;
                Ok((password, true))
            }
        }
    }

    /// Replace the account's configured grants with the principal's actual grants.
    ///
    /// Requires Read capability and an existing principal.
    #[instrument(skip(self, actor, cancel))]
    pub async fn import_permissions(
        &self,
        integration_id: IntegrationId,
        account_id: AccountId,
        actor: &str,
        cancel: &CancellationToken,
    ) -> ReconcileResult<PermissionImport> {
        let snapshot = self.store.get().await?;
        let target = resolve_target(&snapshot, integration_id, account_id)?;
        require_capabilities(&target.integration, Capabilities::READ, "Permission import")?;

        let result = self.import_for(&target, cancel).await;
        self.record(AuditAction::ImportPermissions, actor, account_id, &result)
            .await;
        result
    }

    async fn import_for(
        &self,
        target: &Target,
        cancel: &CancellationToken,
    ) -> ReconcileResult<PermissionImport> {
        let current = self
            .inspector
            .get_principal_permissions(&target.integration, &target.principal, cancel)
            .await?;
        if !current.exists {
            return Err(ReconcileError::validation(format!(
                "Principal '{}' does not exist; nothing to import",
                target.principal
            )));
        }

        let account_id = target.account.id;
        let observed = current.grants;
        let updated = self
            .store
            .update(Box::new(move |snapshot: &Snapshot| {
                replace_with_actual(snapshot, account_id, &observed)
            }))
            .await?;
        let imported_grants = updated
            .account(account_id)
            .map(|a| a.grants.len())
            .unwrap_or_default();

        info!(
            principal = %target.principal,
            imported_grants,
            "Imported actual permissions"
        );

        Ok(PermissionImport {
            integration_id: target.integration.id,
            account_id,
            principal_name: target.principal.clone(),
            imported_grants,
            completed_at: Utc::now(),
        })
    }

    /// Inspect again after a change. Failures are reported as status `Error`.
    async fn reinspect(&self, target: &Target, cancel: &CancellationToken) -> Reinspection {
        match self
            .inspector
            .get_principal_permissions(&target.integration, &target.principal, cancel)
            .await
        {
            Ok(permissions) => {
                let configured = qualify_grants(
                    &target.account.grants,
                    self.inspector
                        .default_database(&target.integration)
                        .as_deref(),
                );
                let comparisons = build_comparisons(&configured, &permissions.grants);
                Reinspection {
                    status: compute_status(&permissions, &comparisons),
                    comparisons,
                    error: None,
                }
            }
            Err(e) => {
                warn!(principal = %target.principal, error = %e, "Re-inspection failed");
                Reinspection {
                    status: SyncStatus::Error,
                    comparisons: Vec::new(),
                    error: Some(format!("Re-inspection failed: {e}")),
                }
            }
        }
    }

    /// Write the audit entry for a completed operation.
    pub(crate) async fn record<T: Serialize>(
        &self,
        action: AuditAction,
        actor: &str,
        entity_id: impl ToString,
        result: &ReconcileResult<T>,
    ) {
        let details = match result {
            Ok(outcome) => serde_json::to_value(outcome).unwrap_or_default(),
            Err(e) => json!({
                "success": false,
                "error": e.to_string(),
                "error_code": e.error_code(),
            }),
        };
        self.audit
            .log(AuditEntry::new(action, actor, entity_id, details))
            .await;
    }
}
