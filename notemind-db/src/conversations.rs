//! Conversations and their context accounting columns.
//!
//! Appends bump `total_tokens_used`, `message_count` and `next_sequence` in
//! one `UPDATE ... RETURNING` keyed by id, inside the same transaction that
//! inserts the messages. Concurrent sends to one conversation therefore
//! never lose an increment or reuse a sequence number.

use chrono::Utc;
use notemind_core::{ContextUsage, ConversationAccount, LlmProvider};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::messages::{Message, MessageRepository, NewMessage};

const CONVERSATION_COLUMNS: &str = "id, user_id, folder_id, title, provider, model_name, \
     message_count, next_sequence, total_tokens_used, total_context_size, created_at, updated_at";

/// A stored conversation
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub folder_id: Option<String>,
    pub title: String,
    pub provider: LlmProvider,
    pub model_name: String,
    pub message_count: u32,
    /// Sequence number the next appended message receives
    pub next_sequence: u32,
    pub total_tokens_used: u64,
    pub total_context_size: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Conversation {
    pub fn account(&self) -> ConversationAccount {
        ConversationAccount::restore(
            self.provider,
            self.model_name.clone(),
            self.total_tokens_used,
            self.total_context_size,
        )
    }

    pub fn usage(&self) -> ContextUsage {
        ContextUsage::compute(self.total_tokens_used, self.total_context_size)
    }
}

/// Input for a new conversation
pub struct NewConversation<'a> {
    pub user_id: &'a str,
    pub folder_id: Option<&'a str>,
    pub title: &'a str,
    pub account: &'a ConversationAccount,
}

/// Which folder a listing is restricted to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FolderFilter {
    #[default]
    Any,
    /// Conversations without a folder
    Unfiled,
    Folder(String),
}

/// Conversation repository for database operations
pub struct ConversationRepository;

impl ConversationRepository {
    /// Create a conversation together with its opening messages.
    pub async fn create(
        pool: &SqlitePool,
        new_conversation: NewConversation<'_>,
        messages: &[NewMessage],
    ) -> DbResult<(Conversation, Vec<Message>)> {
        let id = format!("conv_{}", Uuid::new_v4());
        let now = Utc::now().timestamp();
        let account = new_conversation.account;
        let count = messages.len() as u32;
        let tokens: u64 = account.total_tokens_used()
            + messages.iter().map(|m| u64::from(m.tokens_used)).sum::<u64>();

        let mut tx = pool.begin().await?;

        sqlx::query(
            "INSERT INTO conversations
             (id, user_id, folder_id, title, provider, model_name, message_count, next_sequence,
              total_tokens_used, total_context_size, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(new_conversation.user_id)
        .bind(new_conversation.folder_id)
        .bind(new_conversation.title)
        .bind(account.provider().as_str())
        .bind(account.model())
        .bind(i64::from(count))
        .bind(i64::from(count))
        .bind(tokens as i64)
        .bind(i64::from(account.total_context_size()))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let stored = MessageRepository::insert_batch(&mut tx, &id, 0, messages, now).await?;
        tx.commit().await?;

        info!("Created conversation {} on {}/{}", id, account.provider(), account.model());

        let conversation = Conversation {
            id,
            user_id: new_conversation.user_id.to_string(),
            folder_id: new_conversation.folder_id.map(str::to_string),
            title: new_conversation.title.to_string(),
            provider: account.provider(),
            model_name: account.model().to_string(),
            message_count: count,
            next_sequence: count,
            total_tokens_used: tokens,
            total_context_size: account.total_context_size(),
            created_at: now,
            updated_at: now,
        };
        Ok((conversation, stored))
    }

    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> DbResult<Option<Conversation>> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?");
        let row = sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        row.map(Conversation::try_from).transpose()
    }

    /// Most recently updated first
    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: &str,
        folder: &FolderFilter,
        skip: u32,
        limit: u32,
    ) -> DbResult<Vec<Conversation>> {
        let folder_clause = match folder {
            FolderFilter::Any => "",
            FolderFilter::Unfiled => "AND folder_id IS NULL",
            FolderFilter::Folder(_) => "AND folder_id = ?",
        };
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS}
             FROM conversations
             WHERE user_id = ? {folder_clause}
             ORDER BY updated_at DESC, rowid DESC
             LIMIT ? OFFSET ?"
        );

        let mut query = sqlx::query_as::<_, ConversationRow>(&sql).bind(user_id);
        if let FolderFilter::Folder(folder_id) = folder {
            query = query.bind(folder_id);
        }
        let rows = query
            .bind(i64::from(limit))
            .bind(i64::from(skip))
            .fetch_all(pool)
            .await?;

        rows.into_iter()
            .map(Conversation::try_from)
            .collect::<DbResult<Vec<_>>>()
    }

    /// Append messages and account for their tokens in one transaction.
    ///
    /// Returns `None` when the conversation does not exist.
    pub async fn append_messages(
        pool: &SqlitePool,
        id: &str,
        messages: &[NewMessage],
    ) -> DbResult<Option<(Conversation, Vec<Message>)>> {
        let now = Utc::now().timestamp();
        let count = messages.len() as u32;
        let tokens: u64 = messages.iter().map(|m| u64::from(m.tokens_used)).sum();

        let mut tx = pool.begin().await?;

        let sql = format!(
            "UPDATE conversations
             SET total_tokens_used = total_tokens_used + ?,
                 message_count = message_count + ?,
                 next_sequence = next_sequence + ?,
                 updated_at = ?
             WHERE id = ?
             RETURNING {CONVERSATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(tokens as i64)
            .bind(i64::from(count))
            .bind(i64::from(count))
            .bind(now)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let conversation = Conversation::try_from(row)?;
        let first_sequence = conversation.next_sequence - count;

        let stored =
            MessageRepository::insert_batch(&mut tx, id, first_sequence, messages, now).await?;
        tx.commit().await?;

        debug!(
            "Appended {} message(s) to {} (+{} tokens, total {})",
            count, id, tokens, conversation.total_tokens_used
        );
        Ok(Some((conversation, stored)))
    }

    /// Persist a validated model switch. `total_tokens_used` is untouched.
    pub async fn switch_model(
        pool: &SqlitePool,
        id: &str,
        account: &ConversationAccount,
    ) -> DbResult<Option<Conversation>> {
        let sql = format!(
            "UPDATE conversations
             SET provider = ?, model_name = ?, total_context_size = ?, updated_at = ?
             WHERE id = ?
             RETURNING {CONVERSATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(account.provider().as_str())
            .bind(account.model())
            .bind(i64::from(account.total_context_size()))
            .bind(Utc::now().timestamp())
            .bind(id)
            .fetch_optional(pool)
            .await?;

        row.map(Conversation::try_from).transpose()
    }

    /// Delete a conversation; its messages cascade.
    pub async fn delete(pool: &SqlitePool, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ConversationRow {
    id: String,
    user_id: String,
    folder_id: Option<String>,
    title: String,
    provider: String,
    model_name: String,
    message_count: i64,
    next_sequence: i64,
    total_tokens_used: i64,
    total_context_size: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = DbError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        let provider = row
            .provider
            .parse::<LlmProvider>()
            .map_err(|_| DbError::InvalidProvider(row.provider.clone()))?;
        Ok(Conversation {
            id: row.id,
            user_id: row.user_id,
            folder_id: row.folder_id,
            title: row.title,
            provider,
            model_name: row.model_name,
            message_count: row.message_count.max(0) as u32,
            next_sequence: row.next_sequence.max(0) as u32,
            total_tokens_used: row.total_tokens_used.max(0) as u64,
            total_context_size: row.total_context_size.max(0) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
