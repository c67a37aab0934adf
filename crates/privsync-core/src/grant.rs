//! Configured and observed grants.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::GrantId;
use crate::privilege::{GrantScope, PrivilegeSet};

/// A grant declared on an account.
///
/// At most one grant per normalized scope exists on an account; the grant
/// commands in [`crate::commands`] enforce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: GrantId,
    #[serde(flatten)]
    pub scope: GrantScope,
    pub privileges: PrivilegeSet,
}

impl Grant {
    pub fn new(scope: GrantScope, privileges: PrivilegeSet) -> Self {
        Self {
            id: GrantId::new(),
            scope,
            privileges,
        }
    }
}

/// A grant observed on the server. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualGrant {
    #[serde(flatten)]
    pub scope: GrantScope,
    pub privileges: PrivilegeSet,
}

impl ActualGrant {
    pub fn new(scope: GrantScope, privileges: PrivilegeSet) -> Self {
        Self { scope, privileges }
    }
}

/// What the server reports for one principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalPermissions {
    pub principal_name: String,
    pub exists: bool,
    pub grants: Vec<ActualGrant>,
}

impl PrincipalPermissions {
    /// A principal that exists with the given grants.
    pub fn existing(principal_name: impl Into<String>, grants: Vec<ActualGrant>) -> Self {
        Self {
            principal_name: principal_name.into(),
            exists: true,
            grants,
        }
    }

    /// A principal that does not exist. Carries no grants.
    pub fn missing(principal_name: impl Into<String>) -> Self {
        Self {
            principal_name: principal_name.into(),
            exists: false,
            grants: Vec::new(),
        }
    }
}

/// Configured vs. actual privileges for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionComparison {
    #[serde(flatten)]
    pub scope: GrantScope,
    pub configured: PrivilegeSet,
    pub actual: PrivilegeSet,
    /// `configured - actual`
    pub missing: PrivilegeSet,
    /// `actual - configured`
    pub extra: PrivilegeSet,
}

impl PermissionComparison {
    pub fn new(scope: GrantScope, configured: PrivilegeSet, actual: PrivilegeSet) -> Self {
        let missing = configured.difference(&actual);
        let extra = actual.difference(&configured);
        Self {
            scope,
            configured,
            actual,
            missing,
            extra,
        }
    }

    #[must_use]
    pub fn has_drift(&self) -> bool {
        !self.missing.is_empty() || !self.extra.is_empty()
    }
}

/// Derived reconciliation status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    InSync,
    DriftDetected,
    MissingPrincipal,
    Error,
    NotApplicable,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::InSync => "in_sync",
            SyncStatus::DriftDetected => "drift_detected",
            SyncStatus::MissingPrincipal => "missing_principal",
            SyncStatus::Error => "error",
            SyncStatus::NotApplicable => "not_applicable",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
