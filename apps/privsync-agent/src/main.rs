//! Privsync Agent
//!
//! Loads the declared integrations and accounts from a snapshot file, checks
//! what each integration's credentials may do, and keeps a permissions
//! overview of every integration current until it receives a shutdown signal.

mod config;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use config::AgentConfig;
use privsync_connector::{ConnectorError, PostgresCapabilityProber, PostgresInspector};
use privsync_core::{InMemorySnapshotStore, Snapshot, SnapshotStore, TracingAuditSink};
use privsync_reconcile::{IntegrationService, PermissionsCache, ReconcileError};

/// Actor recorded in audit entries written by the agent itself.
const AGENT_ACTOR: &str = "privsync-agent";

#[derive(Debug, Error)]
enum StartupError {
    #[error("Failed to read snapshot file {}: {source}", path.display())]
    SnapshotRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid snapshot file {}: {source}", path.display())]
    SnapshotParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[tokio::main]
async fn main() {
    // Load configuration (fail-fast on missing required values)
    let config = match AgentConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    if let Err(e) = run(config).await {
        error!(error = %e, "Agent stopped");
        std::process::exit(1);
    }
}

async fn run(config: AgentConfig) -> Result<(), StartupError> {
    let snapshot = load_snapshot(&config.snapshot_path).await?;
    info!(
        integrations = snapshot.integrations.len(),
        accounts = snapshot.accounts.len(),
        path = %config.snapshot_path.display(),
        "Snapshot loaded"
    );

    let store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new(snapshot));
    let inspector = Arc::new(PostgresInspector::new(config.connection.clone())?);
    let shutdown = CancellationToken::new();

    if config.verify_on_start {
        let prober = Arc::new(PostgresCapabilityProber::new(config.connection.clone()));
        let service = IntegrationService::new(store.clone(), prober, Arc::new(TracingAuditSink));
        verify_all(&service, store.as_ref(), &shutdown).await?;
    }

    let cache = Arc::new(PermissionsCache::new(
        store,
        inspector,
        config.cache.clone(),
    )?);
    let handle = cache.spawn(shutdown.clone());

    shutdown_signal().await;
    shutdown.cancel();

    if let Err(e) = handle.await {
        warn!(error = %e, "Permissions cache task ended abnormally");
    }
    info!("Agent shutdown complete");
    Ok(())
}

async fn load_snapshot(path: &Path) -> Result<Snapshot, StartupError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StartupError::SnapshotRead {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&raw).map_err(|source| StartupError::SnapshotParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Probe every integration once. A failed probe is recorded, not fatal.
async fn verify_all(
    service: &IntegrationService,
    store: &dyn SnapshotStore,
    shutdown: &CancellationToken,
) -> Result<(), StartupError> {
    let snapshot = store.get().await.map_err(ReconcileError::from)?;

    for integration in &snapshot.integrations {
        match service
            .verify_capabilities(integration.id, AGENT_ACTOR, shutdown)
            .await
        {
            Ok(outcome) if outcome.success => info!(
                integration = %integration.name,
                capabilities = %outcome.capabilities,
                "Integration verified"
            ),
            Ok(outcome) => warn!(
                integration = %integration.name,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Integration could not be verified"
            ),
            Err(ReconcileError::Cancelled) => break,
            Err(e) => warn!(
                integration = %integration.name,
                error = %e,
                "Integration could not be verified"
            ),
        }
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
