//! Operation records
//!
//! Every multi-step call against the server reports what it attempted, step
//! by step, so partial application is visible to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use privsync_core::{Capabilities, GrantScope, Privilege};

/// Kind of step executed against the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create the login role.
    CreateLogin,
    /// Allow the new login to connect to one database.
    GrantDatabaseAccess,
    Grant,
    Revoke,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateLogin => "create_login",
            OperationKind::GrantDatabaseAccess => "grant_database_access",
            OperationKind::Grant => "grant",
            OperationKind::Revoke => "revoke",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One attempted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub kind: OperationKind,
    #[serde(flatten)]
    pub scope: GrantScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privilege: Option<Privilege>,
    /// Statement as executed, with secrets masked. Empty if no statement exists.
    pub statement: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl OperationRecord {
    pub fn success(kind: OperationKind, scope: GrantScope, statement: impl Into<String>) -> Self {
        Self {
            kind,
            scope,
            privilege: None,
            statement: statement.into(),
            success: true,
            error: None,
            executed_at: Utc::now(),
        }
    }

    pub fn failure(
        kind: OperationKind,
        scope: GrantScope,
        statement: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            scope,
            privilege: None,
            statement: statement.into(),
            success: false,
            error: Some(error.into()),
            executed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = Some(privilege);
        self
    }
}

/// Ordered record of a multi-step call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLog {
    pub operations: Vec<OperationRecord>,
    /// Cancellation was observed and remaining steps were not attempted.
    #[serde(default)]
    pub cancelled: bool,
}

impl OperationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: OperationRecord) {
        self.operations.push(record);
    }

    /// True when every attempted step succeeded and the run was not cut short.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.cancelled && self.operations.iter().all(|op| op.success)
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.operations.iter().filter(|op| !op.success).count()
    }

    /// First error message among failed steps.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.operations.iter().find_map(|op| op.error.as_deref())
    }
}

/// Result of a capability probe. Probes never fail; problems are reported here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub success: bool,
    pub capabilities: Capabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeOutcome {
    #[must_use]
    pub fn connected(capabilities: Capabilities) -> Self {
        Self {
            success: true,
            capabilities,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            capabilities: Capabilities::NONE,
            error: Some(error.into()),
        }
    }
}
