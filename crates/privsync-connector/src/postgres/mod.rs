//! PostgreSQL implementation of the connector traits.
//!
//! Principals are login roles. Grants are read from the ACL columns of
//! `pg_database`, `pg_namespace`, `pg_class` and `pg_proc`, one database at a
//! time.

pub mod catalog;
mod inspector;
mod prober;
mod session;

pub use inspector::PostgresInspector;
pub use prober::PostgresCapabilityProber;
