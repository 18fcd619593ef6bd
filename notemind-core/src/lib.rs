pub mod accounting;
pub mod api;
pub mod config;
pub mod context_budget;
pub mod model_registry;
pub mod provider;
pub mod tokens;

pub use accounting::{ContextUsage, ConversationAccount};
pub use config::{
    Config, ConfigError, GatewaySettings, Secrets, SecretsError, Settings, SettingsError,
    load_dotenv,
};
pub use model_registry::{ModelSpec, RegistryError};
pub use provider::{LlmProvider, MessageRole};
