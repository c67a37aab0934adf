//! Grant commands
//!
//! The only way configured grants change. Every command re-validates the
//! account's grant list: privileges must be non-empty and no two grants may
//! share a normalized scope.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::grant::{ActualGrant, Grant};
use crate::ids::{AccountId, GrantId};
use crate::model::{Account, Snapshot};
use crate::privilege::{GrantScope, PrivilegeSet};
use crate::store::SnapshotStore;

/// Requested content of a grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantInput {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub privileges: PrivilegeSet,
}

impl GrantInput {
    pub fn new(
        database: Option<&str>,
        schema: Option<&str>,
        privileges: impl Into<PrivilegeSet>,
    ) -> Self {
        Self {
            database: database.map(str::to_string),
            schema: schema.map(str::to_string),
            privileges: privileges.into(),
        }
    }

    fn scope(&self) -> GrantScope {
        GrantScope::new(self.database.as_deref(), self.schema.as_deref())
    }
}

fn validate_grants(account: &Account) -> Result<()> {
    let mut seen: HashSet<GrantScope> = HashSet::new();
    for grant in &account.grants {
        if grant.privileges.is_empty() {
            return Err(CoreError::validation(format!(
                "grant on {} must name at least one privilege",
                grant.scope
            )));
        }
        if !seen.insert(grant.scope.normalized()) {
            return Err(CoreError::conflict(format!(
                "account '{}' already has a grant on {}",
                account.name, grant.scope
            )));
        }
    }
    Ok(())
}

/// Add a grant with the given id to an account.
pub fn add_grant(
    snapshot: &Snapshot,
    account_id: AccountId,
    grant_id: GrantId,
    input: &GrantInput,
) -> Result<Snapshot> {
    let mut next = snapshot.clone();
    let account = next.account_mut(account_id)?;
    account.grants.push(Grant {
        id: grant_id,
        scope: input.scope(),
        privileges: input.privileges.clone(),
    });
    validate_grants(account)?;
    Ok(next)
}

pub fn update_grant(
    snapshot: &Snapshot,
    account_id: AccountId,
    grant_id: GrantId,
    input: &GrantInput,
) -> Result<Snapshot> {
    let mut next = snapshot.clone();
    let account = next.account_mut(account_id)?;
    let grant = account
        .grants
        .iter_mut()
        .find(|g| g.id == grant_id)
        .ok_or_else(|| CoreError::not_found("Grant", Some(grant_id)))?;
    grant.scope = input.scope();
    grant.privileges = input.privileges.clone();
    validate_grants(account)?;
    Ok(next)
}

pub fn remove_grant(
    snapshot: &Snapshot,
    account_id: AccountId,
    grant_id: GrantId,
) -> Result<Snapshot> {
    let mut next = snapshot.clone();
    let account = next.account_mut(account_id)?;
    let before = account.grants.len();
    account.grants.retain(|g| g.id != grant_id);
    if account.grants.len() == before {
        return Err(CoreError::not_found("Grant", Some(grant_id)));
    }
    Ok(next)
}

/// Replace an account's configured grants with observed ones.
///
/// Observed grants for the same scope are merged and grants with no
/// privileges are dropped, so the result always validates.
pub fn replace_with_actual(
    snapshot: &Snapshot,
    account_id: AccountId,
    actual: &[ActualGrant],
) -> Result<Snapshot> {
    let mut next = snapshot.clone();
    let account = next.account_mut(account_id)?;

    let mut grants: Vec<Grant> = Vec::new();
    for observed in actual.iter().filter(|g| !g.privileges.is_empty()) {
        let scope = observed.scope.normalized();
        match grants.iter_mut().find(|g| g.scope == scope) {
            Some(existing) => {
                existing.privileges = existing.privileges.union(&observed.privileges);
            }
            None => grants.push(Grant::new(scope, observed.privileges.clone())),
        }
    }
    account.grants = grants;
    validate_grants(account)?;
    Ok(next)
}

/// Grant commands bound to a snapshot store.
pub struct GrantCommands {
    store: Arc<dyn SnapshotStore>,
}

impl GrantCommands {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    pub async fn add(&self, account_id: AccountId, input: GrantInput) -> Result<GrantId> {
        let grant_id = GrantId::new();
        self.store
            .update(Box::new(move |s: &Snapshot| {
                add_grant(s, account_id, grant_id, &input)
            }))
            .await?;
        tracing::debug!(account_id = %account_id, grant_id = %grant_id, "Grant added");
        Ok(grant_id)
    }

    pub async fn update(
        &self,
        account_id: AccountId,
        grant_id: GrantId,
        input: GrantInput,
    ) -> Result<()> {
        self.store
            .update(Box::new(move |s: &Snapshot| {
                update_grant(s, account_id, grant_id, &input)
            }))
            .await?;
        tracing::debug!(account_id = %account_id, grant_id = %grant_id, "Grant updated");
        Ok(())
    }

    pub async fn remove(&self, account_id: AccountId, grant_id: GrantId) -> Result<()> {
        self.store
            .update(Box::new(move |s: &Snapshot| {
                remove_grant(s, account_id, grant_id)
            }))
            .await?;
        tracing::debug!(account_id = %account_id, grant_id = %grant_id, "Grant removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DataStoreId;
    use crate::model::{AccountTarget, AccountType};
    use crate::privilege::Privilege;
    use crate::store::InMemorySnapshotStore;

    fn snapshot_with_account() -> (Snapshot, AccountId) {
        let account = Account::new(
            "reporting",
            AccountType::Database,
            AccountTarget::DataStore(DataStoreId::new()),
        );
        let id = account.id;
        let snapshot = Snapshot {
            accounts: vec![account],
            ..Snapshot::default()
        };
        (snapshot, id)
    }

    #[test]
    fn test_add_rejects_duplicate_of_raw_blank_scope() {
        let (mut snapshot, account_id) = snapshot_with_account();
        // As deserialized from a snapshot file: blank schema, not yet normalized.
        let mut seeded = Grant::new(GrantScope::database("orders"), [Privilege::Connect].into());
        seeded.scope.schema = Some(" ".to_string());
        snapshot.accounts[0].grants.push(seeded);

        let input = GrantInput::new(Some("orders"), None, [Privilege::Alter]);
        let err = add_grant(&snapshot, account_id, GrantId::new(), &input).unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
    }

    #[test]
    fn test_add_rejects_empty_privileges() {
        let (snapshot, account_id) = snapshot_with_account();
        let input = GrantInput::new(Some("orders"), None, PrivilegeSet::new());

        let err = add_grant(&snapshot, account_id, GrantId::new(), &input).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn test_add_rejects_duplicate_normalized_scope() {
        let (snapshot, account_id) = snapshot_with_account();
        let first = GrantInput::new(Some("orders"), Some(""), [Privilege::Connect]);
        let second = GrantInput::new(Some("orders"), Some("   "), [Privilege::Alter]);

        let snapshot = add_grant(&snapshot, account_id, GrantId::new(), &first).unwrap();
        let err = add_grant(&snapshot, account_id, GrantId::new(), &second).unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
    }

    #[test]
    fn test_add_does_not_mutate_input_snapshot() {
        let (snapshot, account_id) = snapshot_with_account();
        let input = GrantInput::new(Some("orders"), Some("public"), [Privilege::Select]);

        let next = add_grant(&snapshot, account_id, GrantId::new(), &input).unwrap();
        assert!(snapshot.accounts[0].grants.is_empty());
        assert_eq!(next.accounts[0].grants.len(), 1);
    }

    #[test]
    fn test_update_into_existing_scope_conflicts() {
        let (snapshot, account_id) = snapshot_with_account();
        let a = GrantId::new();
        let b = GrantId::new();
        let snapshot = add_grant(
            &snapshot,
            account_id,
            a,
            &GrantInput::new(Some("orders"), Some("public"), [Privilege::Select]),
        )
        .unwrap();
        let snapshot = add_grant(
            &snapshot,
            account_id,
            b,
            &GrantInput::new(Some("orders"), Some("audit"), [Privilege::Select]),
        )
        .unwrap();

        let err = update_grant(
            &snapshot,
            account_id,
            b,
            &GrantInput::new(Some("orders"), Some("public"), [Privilege::Insert]),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
    }

    #[test]
    fn test_remove_unknown_grant_is_not_found() {
        let (snapshot, account_id) = snapshot_with_account();
        let err = remove_grant(&snapshot, account_id, GrantId::new()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_replace_with_actual_merges_scopes() {
        let (snapshot, account_id) = snapshot_with_account();
        let actual = vec![
            ActualGrant::new(
                GrantScope::schema("orders", "public"),
                PrivilegeSet::from([Privilege::Select]),
            ),
            ActualGrant::new(
                GrantScope::schema("orders", "public"),
                PrivilegeSet::from([Privilege::Insert]),
            ),
            ActualGrant::new(GrantScope::database("orders"), PrivilegeSet::new()),
        ];

        let next = replace_with_actual(&snapshot, account_id, &actual).unwrap();
        let grants = &next.accounts[0].grants;
        assert_eq!(grants.len(), 1);
        assert_eq!(
            grants[0].privileges,
            PrivilegeSet::from([Privilege::Select, Privilege::Insert])
        );
    }

    #[tokio::test]
    async fn test_commands_persist_through_store() {
        let (snapshot, account_id) = snapshot_with_account();
        let store = Arc::new(InMemorySnapshotStore::new(snapshot));
        let commands = GrantCommands::new(store.clone());

        let grant_id = commands
            .add(
                account_id,
                GrantInput::new(Some("orders"), None, [Privilege::Connect]),
            )
            .await
            .unwrap();
        assert_eq!(store.get().await.unwrap().accounts[0].grants[0].id, grant_id);

        commands.remove(account_id, grant_id).await.unwrap();
        assert!(store.get().await.unwrap().accounts[0].grants.is_empty());
    }
}
