//! Catalog queries
//!
//! Queries against the PostgreSQL system catalogs and the grouping of their
//! rows into [`ActualGrant`]s.

use std::collections::BTreeMap;

use privsync_core::{ActualGrant, GrantScope, PrivilegeSet};

use crate::mapping::map_vendor_permission;

/// Whether a login role with the given name exists.
pub const PRINCIPAL_EXISTS: &str = r#"
SELECT EXISTS (
    SELECT 1 FROM pg_catalog.pg_roles
    WHERE rolname::text = $1 AND rolcanlogin
)
"#;

/// Every login role, excluding the predefined `pg_*` roles.
pub const LIST_PRINCIPALS: &str = r#"
SELECT rolname::text
FROM pg_catalog.pg_roles
WHERE rolcanlogin AND rolname::text NOT LIKE 'pg\_%'
ORDER BY rolname
"#;

/// Databases that accept connections from the current role.
pub const LIST_DATABASES: &str = r#"
SELECT datname::text
FROM pg_catalog.pg_database
WHERE datallowconn
  AND NOT datistemplate
  AND has_database_privilege(datname, 'CONNECT')
ORDER BY datname
"#;

/// Explicit grants of the roles in `$1` within the current database.
///
/// Database-wide grants have a NULL schema; table, view and function grants
/// are attributed to their owning schema; schema ownership is reported as
/// `OWNER`. Grants with and without grant option are both returned.
pub const LOAD_GRANTS: &str = r#"
WITH principals AS (
    SELECT oid, rolname::text AS rolname
    FROM pg_catalog.pg_roles
    WHERE rolname::text = ANY($1::text[])
),
grants AS (
    SELECT p.rolname, NULL::text AS schema_name, a.privilege_type::text AS privilege_type
    FROM pg_catalog.pg_database d
    CROSS JOIN LATERAL aclexplode(d.datacl) a
    JOIN principals p ON p.oid = a.grantee
    WHERE d.datname = current_database()
    UNION
    SELECT p.rolname, n.nspname::text, a.privilege_type::text
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    CROSS JOIN LATERAL aclexplode(c.relacl) a
    JOIN principals p ON p.oid = a.grantee
    WHERE c.relkind IN ('r', 'v', 'm', 'f', 'p')
    UNION
    SELECT p.rolname, n.nspname::text, a.privilege_type::text
    FROM pg_catalog.pg_proc f
    JOIN pg_catalog.pg_namespace n ON n.oid = f.pronamespace
    CROSS JOIN LATERAL aclexplode(f.proacl) a
    JOIN principals p ON p.oid = a.grantee
    UNION
    SELECT p.rolname, n.nspname::text, a.privilege_type::text
    FROM pg_catalog.pg_namespace n
    CROSS JOIN LATERAL aclexplode(n.nspacl) a
    JOIN principals p ON p.oid = a.grantee
    UNION
    SELECT p.rolname, n.nspname::text, 'OWNER'
    FROM pg_catalog.pg_namespace n
    JOIN principals p ON p.oid = n.nspowner
)
SELECT rolname, schema_name, privilege_type
FROM grants
WHERE schema_name IS NULL
   OR (schema_name <> 'information_schema' AND schema_name NOT LIKE 'pg\_%')
ORDER BY rolname, schema_name NULLS FIRST, privilege_type
"#;

/// Capability predicate: the catalogs needed for inspection are readable.
pub const READ_PREDICATE: &str = r#"
SELECT has_table_privilege('pg_catalog.pg_roles', 'SELECT')
   AND has_table_privilege('pg_catalog.pg_namespace', 'SELECT')
   AND has_table_privilege('pg_catalog.pg_class', 'SELECT')
   AND has_table_privilege('pg_catalog.pg_proc', 'SELECT')
"#;

/// Fallback for Read: enumerate principals directly.
pub const READ_FALLBACK: &str = "SELECT count(*) FROM pg_catalog.pg_roles";

/// Capability predicate: the current role can grant and revoke privileges.
pub const WRITE_PREDICATE: &str = r#"
SELECT r.rolsuper
    OR r.rolcreaterole
    OR EXISTS (
        SELECT 1 FROM pg_catalog.pg_namespace n
        WHERE n.nspowner = r.oid
          AND n.nspname::text <> 'information_schema'
          AND n.nspname::text NOT LIKE 'pg\_%'
    )
FROM pg_catalog.pg_roles r
WHERE r.rolname = current_user
"#;

/// Capability predicate: the current role can create login roles.
pub const CREATE_PREDICATE: &str = r#"
SELECT rolsuper OR rolcreaterole
FROM pg_catalog.pg_roles
WHERE rolname = current_user
"#;

/// Group `(schema, vendor permission)` rows of one database into grants.
///
/// Unmapped permissions are dropped, and so are groups left without any
/// privilege. The database-wide group comes first, then schemas by name.
pub fn assemble_grants<I>(database: &str, rows: I) -> Vec<ActualGrant>
where
    I: IntoIterator<Item = (Option<String>, String)>,
{
    let mut groups: BTreeMap<Option<String>, PrivilegeSet> = BTreeMap::new();
    for (schema, permission) in rows {
        if let Some(privilege) = map_vendor_permission(&permission) {
            groups.entry(schema).or_default().insert(privilege);
        }
    }

    groups
        .into_iter()
        .filter(|(_, privileges)| !privileges.is_empty())
        .map(|(schema, privileges)| {
            ActualGrant::new(GrantScope::new(Some(database), schema.as_deref()), privileges)
        })
        .collect()
}
