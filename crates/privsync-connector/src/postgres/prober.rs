//! PostgreSQL capability prober.

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use privsync_core::Capabilities;

use crate::config::{ConnectionSettings, ConnectionTarget};
use crate::operation::ProbeOutcome;
use crate::postgres::catalog;
use crate::postgres::session;
use crate::traits::CapabilityProber;

const CANCELLED: &str = "capability probe cancelled";

#[derive(Debug, Clone, Default)]
pub struct PostgresCapabilityProber {
    settings: ConnectionSettings,
}

impl PostgresCapabilityProber {
    #[must_use]
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }
}

/// Evaluate one predicate. Errors and NULL count as `false`.
async fn predicate(conn: &mut PgConnection, name: &'static str, sql: &'static str) -> bool {
    match sqlx::query_scalar::<_, Option<bool>>(sql).fetch_optional(conn).await {
        Ok(value) => value.flatten().unwrap_or(false),
        Err(e) => {
            debug!(predicate = name, error = %e, "Capability predicate failed");
            false
        }
    }
}

async fn can_enumerate_principals(conn: &mut PgConnection) -> bool {
    sqlx::query_scalar::<_, i64>(catalog::READ_FALLBACK)
        .fetch_one(conn)
        .await
        .is_ok()
}

#[async_trait]
impl CapabilityProber for PostgresCapabilityProber {
    #[instrument(skip_all)]
    async fn probe(&self, connection_string: &str, cancel: &CancellationToken) -> ProbeOutcome {
        if cancel.is_cancelled() {
            return ProbeOutcome::failed(CANCELLED);
        }

        let target = match ConnectionTarget::parse(connection_string, &self.settings) {
            Ok(target) => target,
            Err(e) => return ProbeOutcome::failed(e.to_string()),
        };

        let mut conn = match session::connect(&target.options(), &self.settings, cancel).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(
                    endpoint = %target.endpoint(),
                    error = %e,
                    "Capability probe could not connect"
                );
                return ProbeOutcome::failed(e.to_string());
            }
        };

        let mut read = predicate(&mut conn, "read", catalog::READ_PREDICATE).await;
        if !read && !cancel.is_cancelled() {
            read = can_enumerate_principals(&mut conn).await;
        }

        let write = if cancel.is_cancelled() {
            false
        } else {
            predicate(&mut conn, "write", catalog::WRITE_PREDICATE).await
        };

        let create = if cancel.is_cancelled() {
            false
        } else {
            predicate(&mut conn, "create", catalog::CREATE_PREDICATE).await
        };

        session::close(conn).await;

        if cancel.is_cancelled() {
            return ProbeOutcome::failed(CANCELLED);
        }

        let capabilities = Capabilities::from_flags(read, write, create);
        info!(
            endpoint = %target.endpoint(),
            capabilities = %capabilities,
            "Capability probe completed"
        );
        ProbeOutcome::connected(capabilities)
    }
}
