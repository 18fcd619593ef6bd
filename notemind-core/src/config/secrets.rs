//! Secrets configuration loaded from environment variables only.
//!
//! The gateway signs access tokens and encrypts stored provider keys with
//! these values; they are never written to the TOML settings file.

use std::env;

pub const JWT_SECRET_VAR: &str = "NOTEMIND_JWT_SECRET";
pub const ENCRYPTION_KEY_VAR: &str = "NOTEMIND_ENCRYPTION_KEY";

/// Secrets loaded exclusively from environment variables.
#[derive(Clone, Default)]
pub struct Secrets {
    /// HMAC secret for access tokens (env: NOTEMIND_JWT_SECRET)
    pub jwt_secret: Option<String>,

    /// Base64 of the 32-byte key for stored provider keys
    /// (env: NOTEMIND_ENCRYPTION_KEY)
    pub encryption_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Errors that can occur when loading secrets
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("Missing required secret: {0}")]
    MissingSecret(String),
}

impl Secrets {
    /// Load secrets from environment variables.
    ///
    /// A `.env` file is loaded first when present (development convenience).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_env_inner()
    }

    /// Read the environment without touching `.env`.
    pub(crate) fn from_env_inner() -> Self {
        Self {
            jwt_secret: non_empty_var(JWT_SECRET_VAR),
            encryption_key: non_empty_var(ENCRYPTION_KEY_VAR),
        }
    }

    /// Fail unless every secret the gateway needs is present.
    pub fn require_gateway_secrets(&self) -> Result<(), SecretsError> {
        if self.jwt_secret.is_none() {
            return Err(SecretsError::MissingSecret(JWT_SECRET_VAR.to_string()));
        }
        if self.encryption_key.is_none() {
            return Err(SecretsError::MissingSecret(ENCRYPTION_KEY_VAR.to_string()));
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
