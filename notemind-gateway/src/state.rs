use std::sync::Arc;

use notemind_core::config::{ChatSettings, CorsSettings};
use notemind_db::NotemindDbPool;

use crate::auth::AuthKeys;
use crate::providers::ProviderFactory;
use crate::vault::KeyVault;

/// Shared application state
pub struct AppState {
    pub db: NotemindDbPool,
    pub chat: ChatSettings,
    pub cors: CorsSettings,
    pub auth: AuthKeys,
    pub vault: KeyVault,
    pub providers: Arc<dyn ProviderFactory>,
}

impl AppState {
    pub fn new(
        db: NotemindDbPool,
        chat: ChatSettings,
        cors: CorsSettings,
        auth: AuthKeys,
        vault: KeyVault,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            db,
            chat,
            cors,
            auth,
            vault,
            providers,
        }
    }

    pub fn pool(&self) -> &notemind_db::SqlitePool {
        self.db.pool()
    }
}
