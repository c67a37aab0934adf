//! SQL statement builders
//!
//! Builds the GRANT, REVOKE and CREATE ROLE statements issued by the
//! inspector. Identifiers are always quoted; the only literal ever embedded
//! is the password in CREATE ROLE, which is escaped and masked in records.

use privsync_core::{GrantScope, Password, PermissionComparison, Privilege};

use crate::operation::OperationKind;

/// Quote an identifier, doubling embedded quotes.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A statement together with the form safe to record.
#[derive(Clone, PartialEq, Eq)]
pub struct MaskedStatement {
    pub sql: String,
    pub display: String,
}

impl std::fmt::Debug for MaskedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskedStatement")
            .field("display", &self.display)
            .finish()
    }
}

#[must_use]
pub fn create_login(principal: &str, password: &Password) -> MaskedStatement {
    let role = quote_ident(principal);
    MaskedStatement {
        sql: format!(
            "CREATE ROLE {role} WITH LOGIN PASSWORD {}",
            quote_literal(password.expose())
        ),
        display: format!("CREATE ROLE {role} WITH LOGIN PASSWORD '***'"),
    }
}

#[must_use]
pub fn grant_database_access(database: &str, principal: &str) -> String {
    format!(
        "GRANT CONNECT ON DATABASE {} TO {}",
        quote_ident(database),
        quote_ident(principal)
    )
}

/// One grant or revoke derived from a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub kind: OperationKind,
    pub scope: GrantScope,
    pub privilege: Privilege,
    /// Database the statement runs in.
    pub database: String,
    /// The statement, or why none exists for this privilege at this scope.
    pub statement: Result<String, String>,
}

/// Plan every grant and revoke needed to make `principal` match `comparisons`.
///
/// Order follows the comparisons; within a comparison grants come before
/// revokes. Schema-only scopes run in `default_database`.
#[must_use]
pub fn plan_changes(
    principal: &str,
    comparisons: &[PermissionComparison],
    default_database: &str,
) -> Vec<PlannedChange> {
    let mut planned = Vec::new();
    for comparison in comparisons {
        let database = comparison
            .scope
            .database
            .clone()
            .unwrap_or_else(|| default_database.to_string());

        let steps = comparison
            .missing
            .iter()
            .map(|p| (OperationKind::Grant, p))
            .chain(comparison.extra.iter().map(|p| (OperationKind::Revoke, p)));

        for (kind, privilege) in steps {
            planned.push(PlannedChange {
                kind,
                scope: comparison.scope.clone(),
                privilege,
                database: database.clone(),
                statement: privilege_statement(kind, &comparison.scope, privilege, principal),
            });
        }
    }
    planned
}

fn privilege_statement(
    kind: OperationKind,
    scope: &GrantScope,
    privilege: Privilege,
    principal: &str,
) -> Result<String, String> {
    let target = match (scope.database.as_deref(), scope.schema.as_deref()) {
        (_, Some(schema)) => schema_target(privilege, schema),
        (Some(database), None) => database_target(privilege, database),
        (None, None) => None,
    };

    let Some((verb, on)) = target else {
        return Err(format!(
            "{privilege} cannot be {} at scope {scope}",
            match kind {
                OperationKind::Revoke => "revoked",
                _ => "granted",
            }
        ));
    };

    let role = quote_ident(principal);
    match kind {
        OperationKind::Revoke => Ok(format!("REVOKE {verb} ON {on} FROM {role}")),
        _ => Ok(format!("GRANT {verb} ON {on} TO {role}")),
    }
}

fn schema_target(privilege: Privilege, schema: &str) -> Option<(&'static str, String)> {
    let schema = quote_ident(schema);
    match privilege {
        Privilege::Select => Some(("SELECT", format!("ALL TABLES IN SCHEMA {schema}"))),
        Privilege::Insert => Some(("INSERT", format!("ALL TABLES IN SCHEMA {schema}"))),
        Privilege::Update => Some(("UPDATE", format!("ALL TABLES IN SCHEMA {schema}"))),
        Privilege::Delete => Some(("DELETE", format!("ALL TABLES IN SCHEMA {schema}"))),
        Privilege::Execute => Some(("EXECUTE", format!("ALL FUNCTIONS IN SCHEMA {schema}"))),
        Privilege::Alter => Some(("CREATE", format!("SCHEMA {schema}"))),
        // Ownership is never transferred automatically.
        Privilege::Connect | Privilege::Control => None,
    }
}

fn database_target(privilege: Privilege, database: &str) -> Option<(&'static str, String)> {
    let database = quote_ident(database);
    match privilege {
        Privilege::Connect => Some(("CONNECT", format!("DATABASE {database}"))),
        Privilege::Alter => Some(("CREATE", format!("DATABASE {database}"))),
        Privilege::Select
        | Privilege::Insert
        | Privilege::Update
        | Privilege::Delete
        | Privilege::Execute
        | Privilege::Control => None,
    }
}
