//! Integration service
//!
//! Keeps an integration's recorded capabilities current: probes on request
//! and again whenever its connection string changes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use privsync_connector::{CapabilityProber, ProbeOutcome};
use privsync_core::{
    AuditAction, AuditEntry, AuditSink, Capabilities, IntegrationId, Snapshot, SnapshotStore,
};

use crate::error::{ReconcileError, ReconcileResult};

/// Result of a connection change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    pub integration_id: IntegrationId,
    /// Whether the connection string changed and capabilities were re-probed.
    pub revalidated: bool,
    pub probe: Option<ProbeOutcome>,
}

pub struct IntegrationService {
    store: Arc<dyn SnapshotStore>,
    prober: Arc<dyn CapabilityProber>,
    audit: Arc<dyn AuditSink>,
}

impl IntegrationService {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        prober: Arc<dyn CapabilityProber>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            prober,
            audit,
        }
    }

    /// Probe the integration and record the capabilities it reports.
    ///
    /// A failed probe is not an error: it is recorded as no capabilities
    /// with the probe's error text.
    #[instrument(skip(self, actor, cancel))]
    pub async fn verify_capabilities(
        &self,
        integration_id: IntegrationId,
        actor: &str,
        cancel: &CancellationToken,
    ) -> ReconcileResult<ProbeOutcome> {
        let snapshot = self.store.get().await?;
        let integration = snapshot.require_integration(integration_id)?;

        let outcome = self
            .prober
            .probe(&integration.connection_string, cancel)
            .await;
        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        let recorded = outcome.clone();
        self.store
            .update(Box::new(move |current: &Snapshot| {
                let mut next = current.clone();
                let integration = next.integration_mut(integration_id)?;
                integration.capabilities = recorded.capabilities;
                integration.capabilities_checked_at = Some(Utc::now());
                integration.last_error = recorded.error;
                Ok(next)
            }))
            .await?;

        if outcome.success {
            info!(capabilities = %outcome.capabilities, "Verified integration capabilities");
        } else {
            warn!(
                error = outcome.error.as_deref().unwrap_or_default(),
                "Capability probe failed"
            );
        }

        self.audit
            .log(AuditEntry::new(
                AuditAction::VerifyCapabilities,
                actor,
                integration_id,
                json!({
                    "success": outcome.success,
                    "capabilities": outcome.capabilities.to_string(),
                    "error": outcome.error,
                }),
            ))
            .await;

        Ok(outcome)
    }

    /// Replace the connection string, re-probing only if it changed.
    ///
    /// Any literal difference counts as a change.
    #[instrument(skip(self, connection_string, actor, cancel))]
    pub async fn update_connection(
        &self,
        integration_id: IntegrationId,
        connection_string: String,
        actor: &str,
        cancel: &CancellationToken,
    ) -> ReconcileResult<ConnectionUpdate> {
        if connection_string.trim().is_empty() {
            return Err(ReconcileError::validation("Connection string is required"));
        }

        let snapshot = self.store.get().await?;
        let integration = snapshot.require_integration(integration_id)?;
        if !integration.needs_revalidation(&connection_string) {
            return Ok(ConnectionUpdate {
                integration_id,
                revalidated: false,
                probe: None,
            });
        }

        self.store
            .update(Box::new(move |current: &Snapshot| {
                let mut next = current.clone();
                let integration = next.integration_mut(integration_id)?;
                integration.connection_string = connection_string;
                integration.capabilities = Capabilities::NONE;
                integration.capabilities_checked_at = None;
                integration.last_error = None;
                Ok(next)
            }))
            .await?;

        self.audit
            .log(AuditEntry::new(
                AuditAction::UpdateConnection,
                actor,
                integration_id,
                json!({ "revalidated": true }),
            ))
            .await;
        info!("Integration connection changed; re-probing capabilities");

        let probe = self
            .verify_capabilities(integration_id, actor, cancel)
            .await?;
        Ok(ConnectionUpdate {
            integration_id,
            revalidated: true,
            probe: Some(probe),
        })
    }
}
