use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notemind_core::{Config, ConfigError};
use notemind_db::NotemindDbPool;
use notemind_gateway::auth::AuthKeys;
use notemind_gateway::providers::HttpProviderFactory;
use notemind_gateway::server;
use notemind_gateway::state::AppState;
use notemind_gateway::vault::KeyVault;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (secrets from env/.env, settings from TOML)
    let config = Config::load()?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.settings.logging.level.as_str().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Configuration loaded (default context limit {} tokens, reserve {})",
        config.settings.chat.default_context_limit_tokens,
        config.settings.chat.system_prompt_reserve_tokens
    );

    let jwt_secret = config
        .jwt_secret()
        .ok_or_else(|| ConfigError::Invalid("JWT secret missing".to_string()))?;
    let encryption_key = config
        .encryption_key()
        .ok_or_else(|| ConfigError::Invalid("encryption key missing".to_string()))?;
    let vault = KeyVault::from_base64(encryption_key)?;
    let auth = AuthKeys::new(jwt_secret, config.settings.auth.token_ttl_hours);

    let db = NotemindDbPool::open(config.settings.database.path.as_deref()).await?;
    info!("Database initialized");

    let providers = HttpProviderFactory::new(config.settings.logging.dump_queries)?;
    if config.settings.logging.dump_queries {
        info!("Dumping provider queries to ./logs/queries");
    }

    let bind_addr = config.bind_addr();
    let state = Arc::new(AppState::new(
        db,
        config.settings.chat.clone(),
        config.settings.cors.clone(),
        auth,
        vault,
        Arc::new(providers),
    ));

    server::run(state, &bind_addr).await
}
