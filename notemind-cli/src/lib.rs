//! Terminal client for the NoteMind gateway.
//!
//! [`tabs::TabManager`] holds the open chats and their cached conversations,
//! [`spaces::SpaceTree`] the session's note spaces, and [`session::Session`]
//! wires both to the HTTP client behind a line-based REPL.

pub mod api;
pub mod commands;
pub mod session;
pub mod spaces;
pub mod tabs;

pub use api::{ApiClient, ApiClientError};
pub use session::{Flow, Session, SessionError};
pub use tabs::{ConversationSource, TabEvent, TabManager};
