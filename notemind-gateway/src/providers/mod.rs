pub mod anthropic;
pub mod factory;
pub mod gemini;
pub mod openai;
pub mod provider;
pub mod query_dump;

pub use factory::HttpProviderFactory;
pub use provider::{
    ChatTurn, Provider, ProviderError, ProviderFactory, ProviderResponse, ProviderUsage,
};
