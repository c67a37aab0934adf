//! Permissions cache
//!
//! Keeps the latest overview of every integration, and the status of every
//! account in it, so callers can read them without a round-trip to the
//! server. A background task refreshes all integrations on a fixed interval;
//! callers may also force a refresh of one integration or account.
//!
//! Refreshes of the same integration are not serialized against each other.
//! The last one to finish wins, and every entry carries the time it was
//! computed at.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use privsync_connector::PrincipalInspector;
use privsync_core::{AccountId, Capabilities, IntegrationId, Snapshot, SnapshotStore};

use crate::error::{ReconcileError, ReconcileResult};
use crate::overview::{AccountPermissionStatus, IntegrationOverview, OverviewBuilder};

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds between background refreshes.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_refresh_interval() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn with_refresh_interval(mut self, secs: u64) -> Self {
        self.refresh_interval_secs = secs;
        self
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn validate(&self) -> ReconcileResult<()> {
        if self.refresh_interval_secs == 0 {
            return Err(ReconcileError::validation(
                "refresh_interval_secs must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedOverview {
    pub overview: IntegrationOverview,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccountStatus {
    pub integration_id: IntegrationId,
    pub status: AccountPermissionStatus,
    pub cached_at: DateTime<Utc>,
}

/// Counts from one pass over all integrations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
    pub pruned: usize,
    pub cancelled: bool,
}

pub struct PermissionsCache {
    store: Arc<dyn SnapshotStore>,
    builder: OverviewBuilder,
    config: CacheConfig,
    overviews: DashMap<IntegrationId, CachedOverview>,
    accounts: DashMap<AccountId, CachedAccountStatus>,
}

impl PermissionsCache {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        inspector: Arc<dyn PrincipalInspector>,
        config: CacheConfig,
    ) -> ReconcileResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            builder: OverviewBuilder::new(inspector),
            config,
            overviews: DashMap::new(),
            accounts: DashMap::new(),
        })
    }

    #[must_use]
    pub fn overview(&self, integration_id: IntegrationId) -> Option<CachedOverview> {
        self.overviews.get(&integration_id).map(|e| e.value().clone())
    }

    #[must_use]
    pub fn account_status(&self, account_id: AccountId) -> Option<CachedAccountStatus> {
        self.accounts.get(&account_id).map(|e| e.value().clone())
    }

    /// Drop the overview of an integration and the statuses of its accounts.
    pub fn invalidate_integration(&self, integration_id: IntegrationId) {
        self.overviews.remove(&integration_id);
        self.accounts
            .retain(|_, cached| cached.integration_id != integration_id);
    }

    pub fn invalidate_account(&self, account_id: AccountId) {
        self.accounts.remove(&account_id);
    }

    fn store_overview(&self, overview: IntegrationOverview) -> CachedOverview {
        let cached_at = Utc::now();
        self.accounts
            .retain(|_, cached| cached.integration_id != overview.integration_id);
        for status in &overview.accounts {
            self.accounts.insert(
                status.account_id,
                CachedAccountStatus {
                    integration_id: overview.integration_id,
                    status: status.clone(),
                    cached_at,
                },
            );
        }

        let cached = CachedOverview {
            overview,
            cached_at,
        };
        self.overviews
            .insert(cached.overview.integration_id, cached.clone());
        cached
    }

    /// Rebuild the overview of one integration now.
    #[instrument(skip(self, cancel))]
    pub async fn refresh_integration(
        &self,
        integration_id: IntegrationId,
        cancel: &CancellationToken,
    ) -> ReconcileResult<CachedOverview> {
        let snapshot = self.store.get().await?;
        let integration = snapshot.require_integration(integration_id)?;
        let overview = self.builder.build(&snapshot, integration, cancel).await?;
        Ok(self.store_overview(overview))
    }

    /// Re-inspect one account now.
    #[instrument(skip(self, cancel))]
    pub async fn refresh_account(
        &self,
        integration_id: IntegrationId,
        account_id: AccountId,
        cancel: &CancellationToken,
    ) -> ReconcileResult<CachedAccountStatus> {
        let snapshot = self.store.get().await?;
        let integration = snapshot.require_integration(integration_id)?;
        let account = snapshot.require_account(account_id)?;
        if !integration.capabilities.contains(Capabilities::READ) {
            return Err(ReconcileError::validation(format!(
                "Integration '{}' lacks Read capability",
                integration.name
            )));
        }
        if !account.targets_data_store(integration.data_store_id) {
            return Err(ReconcileError::validation(format!(
                "Account '{}' does not belong to integration '{}'",
                account.name, integration.name
            )));
        }

        let status = self
            .builder
            .account_status(integration, account, cancel)
            .await;
        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        let cached = CachedAccountStatus {
            integration_id,
            status,
            cached_at: Utc::now(),
        };
        self.accounts.insert(account_id, cached.clone());
        Ok(cached)
    }

    /// Refresh every integration, one at a time, then prune vanished entries.
    ///
    /// A failure for one integration is logged and the pass continues.
    pub async fn refresh_all(&self, cancel: &CancellationToken) -> ReconcileResult<RefreshReport> {
        let snapshot = self.store.get().await?;
        let mut report = RefreshReport::default();

        for integration in &snapshot.integrations {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.builder.build(&snapshot, integration, cancel).await {
                Ok(overview) => {
                    self.store_overview(overview);
                    report.refreshed += 1;
                }
                Err(ReconcileError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        integration_id = %integration.id,
                        error = %e,
                        "Failed to refresh permissions overview"
                    );
                    report.failed += 1;
                }
            }
        }

        report.pruned = self.prune(&snapshot);
        Ok(report)
    }

    /// Remove entries whose integration or account is no longer declared.
    fn prune(&self, snapshot: &Snapshot) -> usize {
        let integrations: HashSet<IntegrationId> =
            snapshot.integrations.iter().map(|i| i.id).collect();
        let accounts: HashSet<AccountId> = snapshot.accounts.iter().map(|a| a.id).collect();

        let pruned_overviews = retain_counting(&self.overviews, |id, _| integrations.contains(id));
        let pruned_accounts = retain_counting(&self.accounts, |id, cached| {
            accounts.contains(id) && integrations.contains(&cached.integration_id)
        });
        pruned_overviews + pruned_accounts
    }

    /// Run the refresh loop until `shutdown` is cancelled.
    ///
    /// The first refresh starts immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = time::interval(self.config.refresh_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            refresh_interval_secs = self.config.refresh_interval_secs,
            "Permissions cache started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    match self.refresh_all(&shutdown).await {
                        Ok(report) => debug!(
                            refreshed = report.refreshed,
                            failed = report.failed,
                            pruned = report.pruned,
                            "Permissions cache refreshed"
                        ),
                        Err(e) => warn!(error = %e, "Permissions cache refresh failed"),
                    }
                }
            }
        }

        info!("Permissions cache stopped");
    }

    /// Spawn [`Self::run`] on the runtime.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

/// `DashMap::retain` returning how many entries were removed.
///
/// Inserts made by other tasks meanwhile do not affect the count.
fn retain_counting<K, V>(map: &DashMap<K, V>, mut keep: impl FnMut(&K, &V) -> bool) -> usize
where
    K: Eq + Hash,
{
    let mut removed = 0;
    map.retain(|key, value| {
        let kept = keep(key, value);
        if !kept {
            removed += 1;
        }
        kept
    });
    removed
}
