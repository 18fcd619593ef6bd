//! notemind-db: SQLite storage for users, folders, conversations and messages.

pub mod conversations;
pub mod error;
pub mod folders;
pub mod messages;
pub mod notemind_db;
mod sqlite_runtime;
pub mod users;

// Re-export commonly used types
pub use conversations::{Conversation, ConversationRepository, FolderFilter, NewConversation};
pub use error::{DbError, DbResult};
pub use folders::{Folder, FolderRepository};
pub use messages::{Message, MessageRepository, NewMessage, SortOrder};
pub use notemind_db::NotemindDbPool;
pub use sqlx::SqlitePool;
pub use users::{ApiKeyChanges, KeyChange, NewUser, StoredApiKeys, User, UserRepository};

// Re-export test helpers when running tests or when test-helpers feature is enabled
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
