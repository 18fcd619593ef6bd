//! Conversation flows that talk to an LLM provider.

pub mod prompt;
pub mod service;
pub mod title;

use notemind_core::{LlmProvider, RegistryError};
use notemind_db::DbError;

use crate::providers::ProviderError;
use crate::vault::VaultError;

pub use service::ChatService;

/// Errors that can occur while creating or continuing a conversation
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("API key for {0} is not configured")]
    ApiKeyMissing(LlmProvider),

    #[error(transparent)]
    Upstream(#[from] ProviderError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    /// Deleted while the provider call was in flight
    #[error("Conversation {0} no longer exists")]
    ConversationGone(String),
}
