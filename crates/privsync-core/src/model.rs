//! Declarative model
//!
//! The entities the reconciliation engine reads from the snapshot store:
//! integrations, accounts with their configured grants, data stores,
//! applications and secret providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capability::Capabilities;
use crate::error::{CoreError, Result};
use crate::grant::Grant;
use crate::ids::{AccountId, ApplicationId, DataStoreId, IntegrationId, SecretProviderId};
use crate::privilege::Privilege;

/// A connection to one external database server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    pub id: IntegrationId,
    pub name: String,
    /// The data store whose accounts this integration manages.
    pub data_store_id: DataStoreId,
    pub connection_string: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities_checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Integration {
    pub fn new(
        name: impl Into<String>,
        data_store_id: DataStoreId,
        connection_string: impl Into<String>,
    ) -> Self {
        Self {
            id: IntegrationId::new(),
            name: name.into(),
            data_store_id,
            connection_string: connection_string.into(),
            capabilities: Capabilities::NONE,
            capabilities_checked_at: None,
            last_error: None,
        }
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Whether a connection change requires the capabilities to be probed again.
    ///
    /// Any literal difference triggers, including differences in whitespace or
    /// parameter order.
    #[must_use]
    pub fn needs_revalidation(&self, new_connection_string: &str) -> bool {
        self.connection_string != new_connection_string
    }
}

impl fmt::Debug for Integration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Integration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("data_store_id", &self.data_store_id)
            .field("connection_string", &"[REDACTED]")
            .field("capabilities", &self.capabilities)
            .field("capabilities_checked_at", &self.capabilities_checked_at)
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Kind of declared account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// A login on a database server. The only kind the engine reconciles.
    Database,
    Application,
    Service,
}

impl AccountType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Database => "database",
            AccountType::Application => "application",
            AccountType::Service => "service",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What an account belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ref", rename_all = "snake_case")]
pub enum AccountTarget {
    Application(ApplicationId),
    DataStore(DataStoreId),
    External { system: String },
}

/// Where an account's password lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBinding {
    pub provider_id: SecretProviderId,
    pub secret_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A declared account and its configured grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub account_type: AccountType,
    pub target: AccountTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_binding: Option<SecretBinding>,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl Account {
    pub fn new(name: impl Into<String>, account_type: AccountType, target: AccountTarget) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            account_type,
            target,
            principal_name: None,
            secret_binding: None,
            grants: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_principal(mut self, principal_name: impl Into<String>) -> Self {
        self.principal_name = Some(principal_name.into());
        self
    }

    #[must_use]
    pub fn with_secret_binding(mut self, binding: SecretBinding) -> Self {
        self.secret_binding = Some(binding);
        self
    }

    #[must_use]
    pub fn with_grant(mut self, grant: Grant) -> Self {
        self.grants.push(grant);
        self
    }

    /// The principal name on the server, if one is mapped. Blank counts as unmapped.
    #[must_use]
    pub fn mapped_principal(&self) -> Option<&str> {
        self.principal_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }

    #[must_use]
    pub fn targets_data_store(&self, data_store_id: DataStoreId) -> bool {
        match &self.target {
            AccountTarget::DataStore(id) => *id == data_store_id,
            AccountTarget::Application(_) | AccountTarget::External { .. } => false,
        }
    }

    /// Databases whose database-wide grant includes Connect, in grant order.
    #[must_use]
    pub fn connect_databases(&self) -> Vec<String> {
        let mut databases: Vec<String> = Vec::new();
        for grant in &self.grants {
            let scope = grant.scope.normalized();
            if scope.schema.is_some() || !grant.privileges.contains(Privilege::Connect) {
                continue;
            }
            if let Some(db) = scope.database {
                if !databases.contains(&db) {
                    databases.push(db);
                }
            }
        }
        databases
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStore {
    pub id: DataStoreId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretProviderRef {
    pub id: SecretProviderId,
    pub name: String,
}

/// Immutable view of the declarative model.
///
/// Changes are made by producing a new snapshot inside
/// [`crate::store::SnapshotStore::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub integrations: Vec<Integration>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub data_stores: Vec<DataStore>,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub secret_providers: Vec<SecretProviderRef>,
}

impl Snapshot {
    #[must_use]
    pub fn integration(&self, id: IntegrationId) -> Option<&Integration> {
        self.integrations.iter().find(|i| i.id == id)
    }

    #[must_use]
    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    #[must_use]
    pub fn secret_provider(&self, id: SecretProviderId) -> Option<&SecretProviderRef> {
        self.secret_providers.iter().find(|p| p.id == id)
    }

    pub fn require_integration(&self, id: IntegrationId) -> Result<&Integration> {
        self.integration(id)
            .ok_or_else(|| CoreError::not_found("Integration", Some(id)))
    }

    pub fn require_account(&self, id: AccountId) -> Result<&Account> {
        self.account(id)
            .ok_or_else(|| CoreError::not_found("Account", Some(id)))
    }

    pub fn account_mut(&mut self, id: AccountId) -> Result<&mut Account> {
        self.accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| CoreError::not_found("Account", Some(id)))
    }

    pub fn integration_mut(&mut self, id: IntegrationId) -> Result<&mut Integration> {
        self.integrations
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| CoreError::not_found("Integration", Some(id)))
    }

    /// Accounts that belong to the data store managed by `integration`.
    pub fn accounts_for<'a>(
        &'a self,
        integration: &'a Integration,
    ) -> impl Iterator<Item = &'a Account> + 'a {
        self.accounts
            .iter()
            .filter(move |a| a.targets_data_store(integration.data_store_id))
    }

    #[must_use]
    pub fn target_exists(&self, target: &AccountTarget) -> bool {
        match target {
            AccountTarget::Application(id) => self.applications.iter().any(|a| a.id == *id),
            AccountTarget::DataStore(id) => self.data_stores.iter().any(|d| d.id == *id),
            AccountTarget::External { system } => !system.trim().is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::{GrantScope, PrivilegeSet};

    fn data_store() -> DataStore {
        DataStore {
            id: DataStoreId::new(),
            name: "orders".to_string(),
        }
    }

    #[test]
    fn test_revalidation_uses_literal_comparison() {
        let integration = Integration::new(
            "orders",
            DataStoreId::new(),
            "postgres://admin@db:5432/orders",
        );
        assert!(!integration.needs_revalidation("postgres://admin@db:5432/orders"));
        assert!(integration.needs_revalidation("postgres://admin@db:5432/orders "));
        assert!(integration.needs_revalidation("postgres://ADMIN@db:5432/orders"));
    }

    #[test]
    fn test_debug_redacts_connection_string() {
        let integration = Integration::new("orders", DataStoreId::new(), "postgres://u:pw@h/db");
        let debug = format!("{integration:?}");
        assert!(!debug.contains("pw@h"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_blank_principal_is_unmapped() {
        let store = data_store();
        let account = Account::new("app", AccountType::Database, AccountTarget::DataStore(store.id))
            .with_principal("   ");
        assert_eq!(account.mapped_principal(), None);
    }

    #[test]
    fn test_targets_data_store_is_exhaustive() {
        let store = data_store();
        let on_store =
            Account::new("a", AccountType::Database, AccountTarget::DataStore(store.id));
        let on_app = Account::new(
            "b",
            AccountType::Database,
            AccountTarget::Application(ApplicationId::new()),
        );
        let external = Account::new(
            "c",
            AccountType::Database,
            AccountTarget::External {
                system: "legacy".to_string(),
            },
        );

        assert!(on_store.targets_data_store(store.id));
        assert!(!on_app.targets_data_store(store.id));
        assert!(!external.targets_data_store(store.id));
    }

    #[test]
    fn test_connect_databases_only_from_database_scope() {
        let store = data_store();
        let account = Account::new("a", AccountType::Database, AccountTarget::DataStore(store.id))
            .with_grant(Grant::new(
                GrantScope::schema("orders", "public"),
                PrivilegeSet::from([Privilege::Select]),
            ))
            .with_grant(Grant::new(
                GrantScope::new(Some("billing"), Some("  ")),
                PrivilegeSet::from([Privilege::Connect, Privilege::Alter]),
            ))
            .with_grant(Grant::new(
                GrantScope::database("archive"),
                PrivilegeSet::from([Privilege::Alter]),
            ))
            .with_grant(Grant::new(
                GrantScope::database("orders"),
                PrivilegeSet::from([Privilege::Connect]),
            ));

        assert_eq!(account.connect_databases(), vec!["billing", "orders"]);
    }

    #[test]
    fn test_target_exists() {
        let store = data_store();
        let snapshot = Snapshot {
            data_stores: vec![store.clone()],
            ..Snapshot::default()
        };

        assert!(snapshot.target_exists(&AccountTarget::DataStore(store.id)));
        assert!(!snapshot.target_exists(&AccountTarget::DataStore(DataStoreId::new())));
        assert!(!snapshot.target_exists(&AccountTarget::Application(ApplicationId::new())));
        assert!(!snapshot.target_exists(&AccountTarget::External {
            system: String::new()
        }));
    }

    #[test]
    fn test_require_integration_not_found() {
        let snapshot = Snapshot::default();
        let err = snapshot
            .require_integration(IntegrationId::new())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::NotFound { ref resource, .. } if resource == "Integration"
        ));
    }
}
