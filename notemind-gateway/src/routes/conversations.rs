//! Conversation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use notemind_core::api::{
    ConversationResponse, CreateConversationRequest, MessagesPage, SendMessageRequest,
    SendMessageResponse, SwitchModelRequest,
};
use notemind_core::{ConversationAccount, context_budget, model_registry};
use notemind_db::{ConversationRepository, FolderFilter, MessageRepository, SortOrder};
use serde::Deserialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::chat::ChatService;
use crate::error::{ApiError, ApiResult};
use crate::routes::{
    Pagination, conversation_response, message_response, owned_conversation, owned_folder,
    required_text,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    /// A folder id, or `null` for unfiled conversations
    pub folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    pub order: Option<String>,
}

fn parse_order(order: Option<&str>) -> ApiResult<SortOrder> {
    match order.map(str::to_ascii_lowercase).as_deref() {
        None | Some("asc") => Ok(SortOrder::Asc),
        Some("desc") => Ok(SortOrder::Desc),
        Some(_) => Err(ApiError::validation("order", "order must be 'asc' or 'desc'")),
    }
}

/// POST /conversations
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<CreateConversationRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ConversationResponse>)> {
    let Json(request) = body?;
    required_text("first_message", &request.first_message)?;

    let account = ConversationAccount::open(request.provider, &request.model_name)?;
    let folder_id = match request.folder_id.as_deref() {
        Some(id) => Some(owned_folder(&state, &user, id).await?.id),
        None => None,
    };

    let (conversation, messages) = ChatService::new(&state)
        .create_conversation(
            &user.user_id,
            folder_id.as_deref(),
            &account,
            &request.first_message,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(conversation_response(conversation, Some(messages))),
    ))
}

/// GET /conversations
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    query: Result<Query<ListConversationsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ConversationResponse>>> {
    let Query(query) = query?;
    let (skip, limit) = Pagination {
        skip: query.skip,
        limit: query.limit,
    }
    .resolve()?;
    let filter = match query.folder_id.as_deref() {
        None => FolderFilter::Any,
        Some("null") => FolderFilter::Unfiled,
        Some(id) => FolderFilter::Folder(id.to_string()),
    };

    let conversations =
        ConversationRepository::list_for_user(state.pool(), &user.user_id, &filter, skip, limit)
            .await?;
    Ok(Json(
        conversations
            .into_iter()
            .map(|c| conversation_response(c, None))
            .collect(),
    ))
}

/// GET /conversations/{id}
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ConversationResponse>> {
    let conversation = owned_conversation(&state, &user, &id).await?;
    let messages = MessageRepository::list_for_conversation(state.pool(), &id).await?;
    Ok(Json(conversation_response(conversation, Some(messages))))
}

/// GET /conversations/{id}/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> ApiResult<Json<MessagesPage>> {
    let Query(query) = query?;
    let (skip, limit) = Pagination {
        skip: query.skip,
        limit: query.limit,
    }
    .resolve()?;
    let order = parse_order(query.order.as_deref())?;

    owned_conversation(&state, &user, &id).await?;
    let total = MessageRepository::count(state.pool(), &id).await?;
    let messages = MessageRepository::page(state.pool(), &id, skip, limit, order).await?;

    Ok(Json(MessagesPage {
        total,
        skip,
        limit,
        messages: messages.into_iter().map(message_response).collect(),
    }))
}

/// POST /conversations/{id}/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<Json<SendMessageResponse>> {
    let Json(request) = body?;
    required_text("content", &request.content)?;
    let limit = request
        .context_limit_tokens
        .unwrap_or(state.chat.default_context_limit_tokens);
    if !context_budget::is_valid_limit(limit) {
        return Err(ApiError::validation(
            "context_limit_tokens",
            format!(
                "context_limit_tokens must be between {} and {}",
                context_budget::MIN_CONTEXT_LIMIT_TOKENS,
                context_budget::MAX_CONTEXT_LIMIT_TOKENS
            ),
        ));
    }

    let conversation = owned_conversation(&state, &user, &id).await?;
    let (conversation, mut stored) = ChatService::new(&state)
        .send_message(&conversation, &request.content, limit)
        .await?;
    let reply = stored
        .pop()
        .ok_or_else(|| ApiError::Internal("append returned no messages".to_string()))?;
    let user_message = stored.pop().map(message_response);

    Ok(Json(SendMessageResponse {
        message: message_response(reply),
        user_message,
        conversation: conversation_response(conversation, None),
    }))
}

/// PATCH /conversations/{id}/model
pub async fn switch_model(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<SwitchModelRequest>, JsonRejection>,
) -> ApiResult<Json<ConversationResponse>> {
    let Json(request) = body?;
    let conversation = owned_conversation(&state, &user, &id).await?;

    let provider = match request.provider {
        Some(provider) => provider,
        None => model_registry::find(&request.model)
            .map(|spec| spec.provider)
            .ok_or_else(|| ApiError::InvalidModel(format!("Unsupported model: {}", request.model)))?,
    };

    let mut account = conversation.account();
    let usage = account.on_model_switch(provider, &request.model)?;
    let updated = ConversationRepository::switch_model(state.pool(), &id, &account)
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation"))?;

    info!(
        "Conversation {} switched to {}/{} ({:.2}% used)",
        id, provider, request.model, usage.total_used_percentage
    );
    Ok(Json(conversation_response(updated, None)))
}

/// DELETE /conversations/{id}
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    owned_conversation(&state, &user, &id).await?;
    ConversationRepository::delete(state.pool(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order() {
        assert!(matches!(parse_order(None), Ok(SortOrder::Asc)));
        assert!(matches!(parse_order(Some("DESC")), Ok(SortOrder::Desc)));
        assert!(parse_order(Some("sideways")).is_err());
    }
}
