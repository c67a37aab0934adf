//! Agent configuration loaded from environment variables.
//!
//! Loading is fail-fast: a missing required variable or an unparsable value
//! stops the agent before anything connects to a server.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

use privsync_connector::ConnectionSettings;
use privsync_reconcile::CacheConfig;

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,privsync=debug";

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// JSON file holding the initial snapshot.
    pub snapshot_path: PathBuf,

    pub cache: CacheConfig,

    pub connection: ConnectionSettings,

    /// Probe every integration's capabilities before the first refresh.
    pub verify_on_start: bool,

    pub rust_log: String,
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Required Variables
    ///
    /// - `PRIVSYNC_SNAPSHOT_PATH` - Snapshot seed file (JSON)
    ///
    /// # Optional Variables
    ///
    /// - `PRIVSYNC_REFRESH_INTERVAL_SECS` - Cache refresh interval (default: 300)
    /// - `PRIVSYNC_VERIFY_ON_START` - Probe capabilities at startup (default: true)
    /// - `PRIVSYNC_CONNECT_TIMEOUT_SECS` - Server connection timeout (default: 15)
    /// - `PRIVSYNC_STATEMENT_TIMEOUT_SECS` - Server statement timeout, 0 disables (default: 30)
    /// - `RUST_LOG` - Log level filter (default: "info,privsync=debug")
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let snapshot_path = lookup("PRIVSYNC_SNAPSHOT_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingVar("PRIVSYNC_SNAPSHOT_PATH".to_string()))?;

        let cache = CacheConfig::default();
        let refresh_interval = parse_u64(
            &lookup,
            "PRIVSYNC_REFRESH_INTERVAL_SECS",
            cache.refresh_interval_secs,
        )?;
        let cache = cache.with_refresh_interval(refresh_interval);
        cache.validate().map_err(|e| ConfigError::InvalidValue {
            var: "PRIVSYNC_REFRESH_INTERVAL_SECS".to_string(),
            message: e.to_string(),
        })?;

        let connection = ConnectionSettings::default();
        let connect_timeout = parse_u64(
            &lookup,
            "PRIVSYNC_CONNECT_TIMEOUT_SECS",
            connection.connection_timeout_secs,
        )?;
        let statement_timeout = parse_u64(
            &lookup,
            "PRIVSYNC_STATEMENT_TIMEOUT_SECS",
            connection.statement_timeout_secs,
        )?;
        let connection = connection
            .with_connection_timeout(connect_timeout)
            .with_statement_timeout(statement_timeout);
        connection.validate().map_err(|e| ConfigError::InvalidValue {
            var: "PRIVSYNC_CONNECT_TIMEOUT_SECS".to_string(),
            message: e.to_string(),
        })?;

        let verify_on_start = match lookup("PRIVSYNC_VERIFY_ON_START") {
            None => true,
            Some(value) => parse_bool(&value).ok_or_else(|| ConfigError::InvalidValue {
                var: "PRIVSYNC_VERIFY_ON_START".to_string(),
                message: format!("expected true or false, got '{value}'"),
            })?,
        };

        let rust_log = lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            snapshot_path,
            cache,
            connection,
            verify_on_start,
            rust_log,
        })
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue {
                var: var.to_string(),
                message: e.to_string(),
            }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
