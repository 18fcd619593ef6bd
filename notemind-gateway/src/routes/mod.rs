//! HTTP handlers, grouped by resource.

pub mod conversations;
pub mod folders;
pub mod messages;
pub mod models;
pub mod users;

use chrono::{DateTime, Utc};
use notemind_core::api::{ConversationResponse, FolderResponse, MessageResponse};
use notemind_db::{Conversation, ConversationRepository, Folder, FolderRepository, Message};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// `?skip&limit` shared by listing endpoints
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

impl Pagination {
    /// `(skip, limit)` with defaults applied and `limit` range-checked.
    pub fn resolve(&self) -> ApiResult<(u32, u32)> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(ApiError::validation(
                "limit",
                format!("limit must be between 1 and {MAX_PAGE_LIMIT}"),
            ));
        }
        Ok((self.skip.unwrap_or(0), limit))
    }
}

pub(crate) fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

pub(crate) fn message_response(message: Message) -> MessageResponse {
    MessageResponse {
        id: message.id,
        conversation_id: message.conversation_id,
        role: message.role,
        content: message.content,
        timestamp: timestamp(message.created_at),
        tokens_used: message.tokens_used,
        sequence_number: message.sequence_number,
    }
}

pub(crate) fn conversation_response(
    conversation: Conversation,
    messages: Option<Vec<Message>>,
) -> ConversationResponse {
    let usage = conversation.usage();
    ConversationResponse {
        id: conversation.id,
        user_id: conversation.user_id,
        title: conversation.title,
        provider: conversation.provider,
        model_name: conversation.model_name,
        folder_id: conversation.folder_id,
        message_count: conversation.message_count,
        usage,
        created_at: timestamp(conversation.created_at),
        updated_at: timestamp(conversation.updated_at),
        messages: messages.map(|m| m.into_iter().map(message_response).collect()),
    }
}

pub(crate) fn folder_response(folder: Folder) -> FolderResponse {
    FolderResponse {
        id: folder.id,
        user_id: folder.user_id,
        name: folder.name,
        created_at: timestamp(folder.created_at),
        updated_at: timestamp(folder.updated_at),
    }
}

/// Load a conversation the caller owns: 404 when missing, 403 when foreign.
pub(crate) async fn owned_conversation(
    state: &AppState,
    user: &AuthUser,
    id: &str,
) -> ApiResult<Conversation> {
    let conversation = ConversationRepository::get_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation"))?;
    if conversation.user_id != user.user_id {
        return Err(ApiError::Forbidden(
            "Not authorized to access this conversation".to_string(),
        ));
    }
    Ok(conversation)
}

pub(crate) async fn owned_folder(state: &AppState, user: &AuthUser, id: &str) -> ApiResult<Folder> {
    let folder = FolderRepository::get_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Folder"))?;
    if folder.user_id != user.user_id {
        return Err(ApiError::Forbidden(
            "Not authorized to access this folder".to_string(),
        ));
    }
    Ok(folder)
}

/// Trimmed non-empty text or a 422 naming `field`.
pub(crate) fn required_text<'a>(field: &str, value: &'a str) -> ApiResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(field, format!("{field} must not be empty")));
    }
    Ok(trimmed)
}
