//! Settings configuration loaded from TOML files.
//!
//! Non-sensitive configuration lives in the XDG config directory
//! (`~/.config/notemind/config.toml`). `NOTEMIND_CONFIG_DIR` overrides the
//! directory, which is how tests and side-by-side installs isolate state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context_budget::DEFAULT_CONTEXT_LIMIT_TOKENS;

pub const CONFIG_DIR_VAR: &str = "NOTEMIND_CONFIG_DIR";

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# notemind configuration file
# Located at: ~/.config/notemind/config.toml
#
# Secrets are read from the environment, never from this file:
#   - NOTEMIND_JWT_SECRET      (access token signing)
#   - NOTEMIND_ENCRYPTION_KEY  (base64 of 32 bytes, encrypts stored provider keys)

[gateway]
host = "127.0.0.1"
port = 8000
# url = "http://127.0.0.1:8000"   # used by the CLI, computed when unset

[database]
# path = "/var/lib/notemind/notemind.sqlite3"   # defaults to the XDG data dir

[chat]
default_context_limit_tokens = 4000
system_prompt_reserve_tokens = 200
title_model = "gpt-4o-mini"
max_output_tokens = 4096

[auth]
token_ttl_hours = 24

[cors]
allowed_origins = ["http://localhost:3000", "http://localhost:3001"]

[logging]
level = "info"
dump_queries = false
"#;

/// Settings loaded from the TOML configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub cors: CorsSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Base URL clients use; computed from host/port when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file; XDG data dir when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_context_limit_tokens")]
    pub default_context_limit_tokens: u32,
    /// Budget held back for the system prompt
    #[serde(default = "default_system_prompt_reserve_tokens")]
    pub system_prompt_reserve_tokens: u32,
    /// OpenAI model used for title generation
    #[serde(default = "default_title_model")]
    pub title_model: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsSettings {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write raw provider requests/responses to ./logs/queries
    #[serde(default)]
    pub dump_queries: bool,
}

// Default value functions

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8000
}

fn default_context_limit_tokens() -> u32 {
    DEFAULT_CONTEXT_LIMIT_TOKENS
}

fn default_system_prompt_reserve_tokens() -> u32 {
    200
}

fn default_title_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_output_tokens() -> u32 {
    4096
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:3001".to_string(),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            url: None,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            default_context_limit_tokens: default_context_limit_tokens(),
            system_prompt_reserve_tokens: default_system_prompt_reserve_tokens(),
            title_model: default_title_model(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dump_queries: false,
        }
    }
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Serialize settings to TOML content.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var(CONFIG_DIR_VAR) {
            return Ok(PathBuf::from(override_dir).join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("notemind");

        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG_TOML)?;
        Ok(())
    }

    /// Save settings to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Base URL of the gateway as seen by clients.
    pub fn gateway_url(&self) -> String {
        self.gateway
            .url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.gateway.host, self.gateway.port))
    }

    /// Get the HTTP bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.gateway.host, self.gateway.port)
    }
}
