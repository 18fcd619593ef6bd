//! Configuration management for notemind.
//!
//! Secrets come from environment variables, settings from a TOML file.
//!
//! ## Secrets (Environment Variables)
//! - `NOTEMIND_JWT_SECRET` - access token signing secret
//! - `NOTEMIND_ENCRYPTION_KEY` - base64 AES-256 key for stored provider keys
//!
//! ## Settings (TOML File)
//! Located at `~/.config/notemind/config.toml`:
//! ```toml
//! [gateway]
//! host = "127.0.0.1"
//! port = 8000
//!
//! [chat]
//! default_context_limit_tokens = 4000
//!
//! [logging]
//! level = "info"
//! ```

mod secrets;
mod settings;

pub use secrets::{ENCRYPTION_KEY_VAR, JWT_SECRET_VAR, Secrets, SecretsError};
pub use settings::{
    AuthSettings, CONFIG_DIR_VAR, ChatSettings, CorsSettings, DatabaseSettings, GatewaySettings,
    LoggingSettings, Settings, SettingsError,
};

/// Combined configuration used by the gateway.
#[derive(Debug, Clone)]
pub struct Config {
    pub secrets: Secrets,
    pub settings: Settings,
}

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Secrets error: {0}")]
    Secrets(#[from] SecretsError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

impl Config {
    /// Load secrets and settings, failing when the gateway cannot run.
    pub fn load() -> Result<Self, ConfigError> {
        let secrets = Secrets::from_env();
        secrets.require_gateway_secrets()?;
        let settings = Settings::load()?;
        let config = Self { secrets, settings };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints of the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limit = self.settings.chat.default_context_limit_tokens;
        if !crate::context_budget::is_valid_limit(limit) {
            return Err(ConfigError::Invalid(format!(
                "chat.default_context_limit_tokens = {} is outside {}..={}",
                limit,
                crate::context_budget::MIN_CONTEXT_LIMIT_TOKENS,
                crate::context_budget::MAX_CONTEXT_LIMIT_TOKENS,
            )));
        }
        if self.settings.auth.token_ttl_hours <= 0 {
            return Err(ConfigError::Invalid(
                "auth.token_ttl_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn jwt_secret(&self) -> Option<&str> {
        self.secrets.jwt_secret.as_deref()
    }

    pub fn encryption_key(&self) -> Option<&str> {
        self.secrets.encryption_key.as_deref()
    }

    pub fn bind_addr(&self) -> String {
        self.settings.bind_addr()
    }
}

/// Load a `.env` file into the process environment if present.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
