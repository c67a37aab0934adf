//! Audit sink
//!
//! Every create, resolve, import, bulk and capability check is recorded with
//! the acting identity. Sinks are infallible by signature and handle their own
//! delivery failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Area under which all permission reconciliation entries are recorded.
pub const AUDIT_AREA: &str = "database_permissions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ResolveDrift,
    CreateAccount,
    BulkReconcile,
    ImportPermissions,
    VerifyCapabilities,
    UpdateConnection,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ResolveDrift => "resolve_drift",
            AuditAction::CreateAccount => "create_account",
            AuditAction::BulkReconcile => "bulk_reconcile",
            AuditAction::ImportPermissions => "import_permissions",
            AuditAction::VerifyCapabilities => "verify_capabilities",
            AuditAction::UpdateConnection => "update_connection",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub area: String,
    pub actor: String,
    pub entity_id: String,
    pub details: JsonValue,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        actor: impl Into<String>,
        entity_id: impl ToString,
        details: JsonValue,
    ) -> Self {
        Self {
            action,
            area: AUDIT_AREA.to_string(),
            actor: actor.into(),
            entity_id: entity_id.to_string(),
            details,
            recorded_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, entry: AuditEntry);
}

/// Writes audit entries as structured events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(&self, entry: AuditEntry) {
        tracing::info!(
            target: "audit",
            action = %entry.action,
            area = %entry.area,
            actor = %entry.actor,
            entity_id = %entry.entity_id,
            details = %entry.details,
            "Audit entry recorded"
        );
    }
}
