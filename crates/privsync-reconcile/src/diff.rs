//! Diff engine
//!
//! Pure comparison of configured grants against observed grants. Scopes are
//! compared after normalization, so a blank database or schema never shows up
//! as drift against an unscoped grant.

use privsync_core::{
    ActualGrant, Grant, GrantScope, PermissionComparison, PrincipalPermissions, PrivilegeSet,
    SyncStatus,
};

/// Merge `(scope, privileges)` pairs by normalized scope, keeping first-seen order.
fn index_by_scope<'a, I>(entries: I) -> Vec<(GrantScope, PrivilegeSet)>
where
    I: IntoIterator<Item = (&'a GrantScope, &'a PrivilegeSet)>,
{
    let mut indexed: Vec<(GrantScope, PrivilegeSet)> = Vec::new();
    for (scope, privileges) in entries {
        let scope = scope.normalized();
        match indexed.iter_mut().find(|(s, _)| *s == scope) {
            Some((_, existing)) => *existing = existing.union(privileges),
            None => indexed.push((scope, privileges.clone())),
        }
    }
    indexed
}

/// Give configured grants without a database the `default_database`.
///
/// Observed grants always name the database they were read from, so an
/// unqualified configured scope would otherwise never match its counterpart.
#[must_use]
pub fn qualify_grants(configured: &[Grant], default_database: Option<&str>) -> Vec<Grant> {
    configured
        .iter()
        .map(|grant| {
            let mut grant = grant.clone();
            grant.scope = grant.scope.normalized();
            if grant.scope.database.is_none() {
                if let Some(database) = default_database {
                    grant.scope = GrantScope::new(Some(database), grant.scope.schema.as_deref());
                }
            }
            grant
        })
        .collect()
}

/// Compare configured grants against actual grants.
///
/// Configured scopes come first in their original order, followed by scopes
/// only present in `actual`, whose privileges are all extra.
pub fn build_comparisons(
    configured: &[Grant],
    actual: &[ActualGrant],
) -> Vec<PermissionComparison> {
    let configured = index_by_scope(configured.iter().map(|g| (&g.scope, &g.privileges)));
    let mut actual = index_by_scope(actual.iter().map(|g| (&g.scope, &g.privileges)));

    let mut comparisons = Vec::with_capacity(configured.len() + actual.len());
    for (scope, wanted) in configured {
        let observed = match actual.iter().position(|(s, _)| *s == scope) {
            Some(index) => actual.remove(index).1,
            None => PrivilegeSet::new(),
        };
        comparisons.push(PermissionComparison::new(scope, wanted, observed));
    }

    for (scope, observed) in actual {
        comparisons.push(PermissionComparison::new(scope, PrivilegeSet::new(), observed));
    }

    comparisons
}

/// Whether any comparison has missing or extra privileges.
#[must_use]
pub fn has_drift(comparisons: &[PermissionComparison]) -> bool {
    comparisons.iter().any(PermissionComparison::has_drift)
}

/// Derive the status of a principal.
///
/// A principal that does not exist is `MissingPrincipal` whatever the
/// comparisons say.
#[must_use]
pub fn compute_status(
    principal: &PrincipalPermissions,
    comparisons: &[PermissionComparison],
) -> SyncStatus {
    if !principal.exists {
        SyncStatus::MissingPrincipal
    } else if has_drift(comparisons) {
        SyncStatus::DriftDetected
    } else {
        SyncStatus::InSync
    }
}
