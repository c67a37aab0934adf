//! Secret store client
//!
//! The engine needs two things from a secret store: reveal the password bound
//! to an account, and persist a manually supplied password as a new secret.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

use crate::ids::SecretProviderId;

// ── SecretError ──────────────────────────────────────────────────────────

/// Errors returned by secret store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    /// Secret not found in provider.
    #[error("Secret not found: '{name}'")]
    NotFound { name: String },

    /// Provider is unreachable or rejected the request.
    #[error("Secret provider '{provider}' unavailable: {detail}")]
    ProviderUnavailable { provider: String, detail: String },

    /// Secret value is malformed (empty, not UTF-8).
    #[error("Invalid secret value for '{name}': {detail}")]
    InvalidValue { name: String, detail: String },

    /// The provider does not support this operation.
    #[error("Secret provider '{provider}' does not support {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },
}

// ── Password ─────────────────────────────────────────────────────────────

/// A login password. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The plaintext value, for handing to the server.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// ── SecretStore Trait ────────────────────────────────────────────────────

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Reveal a secret. `version` of `None` means the latest version.
    async fn reveal(
        &self,
        provider_id: SecretProviderId,
        secret_name: &str,
        version: Option<&str>,
    ) -> Result<Password, SecretError>;

    /// Persist `value` as a new secret.
    async fn create(
        &self,
        provider_id: SecretProviderId,
        secret_name: &str,
        value: &Password,
    ) -> Result<(), SecretError>;

    /// Provider type name for logging.
    fn provider_type(&self) -> &'static str;
}

// ── EnvSecretStore ───────────────────────────────────────────────────────

/// Reads secrets from environment variables.
///
/// A secret named `orders_app` under provider `p` is read from
/// `PRIVSYNC_SECRET_<P>_ORDERS_APP`, where `<P>` is the provider id with
/// dashes replaced by underscores, unless an explicit mapping exists for
/// the secret name. Versions are ignored. Creating secrets is unsupported.
#[derive(Debug, Default)]
pub struct EnvSecretStore {
    /// Explicit secret name → env var name mappings.
    mappings: HashMap<String, String>,
}

impl EnvSecretStore {
    #[must_use]
    pub fn new(mappings: HashMap<String, String>) -> Self {
        Self { mappings }
    }

    fn resolve_env_var_name(&self, provider_id: SecretProviderId, secret_name: &str) -> String {
        if let Some(mapped) = self.mappings.get(secret_name) {
            return mapped.clone();
        }
        let sanitize = |s: &str| {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
                .collect::<String>()
        };
        format!(
            "PRIVSYNC_SECRET_{}_{}",
            sanitize(&provider_id.to_string()),
            sanitize(secret_name)
        )
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn reveal(
        &self,
        provider_id: SecretProviderId,
        secret_name: &str,
        _version: Option<&str>,
    ) -> Result<Password, SecretError> {
        let env_var = self.resolve_env_var_name(provider_id, secret_name);

        match std::env::var(&env_var) {
            Ok(value) if !value.is_empty() => {
                tracing::debug!(
                    secret_name,
                    env_var = %env_var,
                    "Secret loaded from environment variable"
                );
                Ok(Password::new(value))
            }
            // Empty value treated as not found
            _ => Err(SecretError::NotFound {
                name: secret_name.to_string(),
            }),
        }
    }

    async fn create(
        &self,
        _provider_id: SecretProviderId,
        _secret_name: &str,
        _value: &Password,
    ) -> Result<(), SecretError> {
        Err(SecretError::Unsupported {
            provider: self.provider_type().to_string(),
            operation: "create",
        })
    }

    fn provider_type(&self) -> &'static str {
        "env"
    }
}
