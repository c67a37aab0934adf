//! Scoped connections
//!
//! Every call opens its own connection and closes it before returning.
//! Connections are never pooled or shared between calls.

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ConnectionSettings;
use crate::error::{ConnectorError, ConnectorResult};

/// Open a connection, honouring the connect timeout and cancellation.
pub(crate) async fn connect(
    options: &PgConnectOptions,
    settings: &ConnectionSettings,
    cancel: &CancellationToken,
) -> ConnectorResult<PgConnection> {
    if cancel.is_cancelled() {
        return Err(ConnectorError::Cancelled);
    }

    let database = options.get_database().unwrap_or_default().to_string();
    debug!(host = %options.get_host(), database = %database, "Opening database connection");

    match tokio::time::timeout(settings.connection_timeout(), options.connect()).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(sqlx::Error::Database(db))) => Err(ConnectorError::Vendor {
            message: db.message().to_string(),
            code: db.code().map(|c| c.into_owned()),
        }),
        Ok(Err(e)) => Err(ConnectorError::connection_failed_with_source(
            format!(
                "Failed to connect to {}:{}/{database}: {e}",
                options.get_host(),
                options.get_port()
            ),
            e,
        )),
        Err(_) => Err(ConnectorError::ConnectionTimeout {
            timeout_secs: settings.connection_timeout_secs,
        }),
    }
}

/// Close a connection. Close failures are logged, never returned.
pub(crate) async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "Error while closing database connection");
    }
}
