//! Messages of a conversation, ordered by per-conversation sequence number.

use chrono::Utc;
use notemind_core::MessageRole;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// A stored message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub tokens_used: u32,
    pub sequence_number: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A message about to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub tokens_used: u32,
}

impl NewMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, tokens_used: u32) -> Self {
        Self {
            role,
            content: content.into(),
            tokens_used,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Message repository for database operations
pub struct MessageRepository;

impl MessageRepository {
    /// Insert `messages` with consecutive sequence numbers starting at `first_sequence`.
    pub(crate) async fn insert_batch(
        tx: &mut Transaction<'_, Sqlite>,
        conversation_id: &str,
        first_sequence: u32,
        messages: &[NewMessage],
        now: i64,
    ) -> DbResult<Vec<Message>> {
        let mut stored = Vec::with_capacity(messages.len());
        for (offset, new_message) in messages.iter().enumerate() {
            let message = Message {
                id: format!("msg_{}", Uuid::new_v4()),
                conversation_id: conversation_id.to_string(),
                role: new_message.role,
                content: new_message.content.clone(),
                tokens_used: new_message.tokens_used,
                sequence_number: first_sequence + offset as u32,
                created_at: now,
                updated_at: now,
            };

            sqlx::query(
                "INSERT INTO messages
                 (id, conversation_id, role, content, tokens_used, sequence_number, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&message.id)
            .bind(&message.conversation_id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(i64::from(message.tokens_used))
            .bind(i64::from(message.sequence_number))
            .bind(now)
            .bind(now)
            .execute(&mut **tx)
            .await?;

            stored.push(message);
        }
        Ok(stored)
    }

    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> DbResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT id, conversation_id, role, content, tokens_used, sequence_number, created_at, updated_at
             FROM messages
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    /// Full history in sequence order
    pub async fn list_for_conversation(
        pool: &SqlitePool,
        conversation_id: &str,
    ) -> DbResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, conversation_id, role, content, tokens_used, sequence_number, created_at, updated_at
             FROM messages
             WHERE conversation_id = ?
             ORDER BY sequence_number ASC",
        )
        .bind(conversation_id)
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(Message::try_from)
            .collect::<DbResult<Vec<_>>>()
    }

    pub async fn page(
        pool: &SqlitePool,
        conversation_id: &str,
        skip: u32,
        limit: u32,
        order: SortOrder,
    ) -> DbResult<Vec<Message>> {
        let sql = match order {
            SortOrder::Asc => {
                "SELECT id, conversation_id, role, content, tokens_used, sequence_number, created_at, updated_at
                 FROM messages
                 WHERE conversation_id = ?
                 ORDER BY sequence_number ASC
                 LIMIT ? OFFSET ?"
            }
            SortOrder::Desc => {
                "SELECT id, conversation_id, role, content, tokens_used, sequence_number, created_at, updated_at
                 FROM messages
                 WHERE conversation_id = ?
                 ORDER BY sequence_number DESC
                 LIMIT ? OFFSET ?"
            }
        };

        let rows = sqlx::query_as::<_, MessageRow>(sql)
            .bind(conversation_id)
            .bind(i64::from(limit))
            .bind(i64::from(skip))
            .fetch_all(pool)
            .await?;

        rows.into_iter()
            .map(Message::try_from)
            .collect::<DbResult<Vec<_>>>()
    }

    pub async fn count(pool: &SqlitePool, conversation_id: &str) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Replace a message's content and token count.
    pub async fn update_content(
        pool: &SqlitePool,
        id: &str,
        content: &str,
        tokens_used: u32,
    ) -> DbResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "UPDATE messages
             SET content = ?, tokens_used = ?, updated_at = ?
             WHERE id = ?
             RETURNING id, conversation_id, role, content, tokens_used, sequence_number, created_at, updated_at",
        )
        .bind(content)
        .bind(i64::from(tokens_used))
        .bind(Utc::now().timestamp())
        .bind(id)
        .fetch_optional(pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    /// Delete one message and decrement its conversation's count.
    ///
    /// Surviving sequence numbers are left as they are. Returns `false` if the
    /// message did not exist.
    pub async fn delete(pool: &SqlitePool, id: &str) -> DbResult<bool> {
        let mut tx = pool.begin().await?;

        let conversation_id: Option<String> =
            sqlx::query_scalar("DELETE FROM messages WHERE id = ? RETURNING conversation_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(conversation_id) = conversation_id else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query(
            "UPDATE conversations
             SET message_count = MAX(message_count - 1, 0), updated_at = ?
             WHERE id = ?",
        )
        .bind(Utc::now().timestamp())
        .bind(&conversation_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    tokens_used: i64,
    sequence_number: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = DbError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<MessageRole>()
            .map_err(|_| DbError::InvalidRole(row.role.clone()))?;
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            role,
            content: row.content,
            tokens_used: row.tokens_used.max(0) as u32,
            sequence_number: row.sequence_number.max(0) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
