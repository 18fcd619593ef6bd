pub mod auth;
pub mod chat;
pub mod error;
pub mod providers;
pub mod routes;
pub mod server;
pub mod state;
pub mod vault;

pub use error::{ApiError, ApiResult};
pub use providers::{
    ChatTurn, HttpProviderFactory, Provider, ProviderError, ProviderFactory, ProviderResponse,
    ProviderUsage,
};
pub use state::AppState;
