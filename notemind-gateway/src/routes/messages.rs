//! Single-message endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use notemind_core::api::{EditMessageRequest, MessageResponse};
use notemind_core::{MessageRole, tokens};
use notemind_db::{Message, MessageRepository};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::{message_response, owned_conversation, required_text};
use crate::state::AppState;

/// Messages are owned through their conversation.
async fn owned_message(state: &AppState, user: &AuthUser, id: &str) -> ApiResult<Message> {
    let message = MessageRepository::get_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message"))?;
    owned_conversation(state, user, &message.conversation_id).await?;
    Ok(message)
}

/// GET /messages/{id}
pub async fn get_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    Ok(Json(message_response(owned_message(&state, &user, &id).await?)))
}

/// PATCH /messages/{id}
///
/// Only user messages are editable. The token count is recomputed; the
/// conversation's cumulative usage is not.
pub async fn edit_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<EditMessageRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(request) = body?;
    required_text("content", &request.content)?;

    let message = owned_message(&state, &user, &id).await?;
    if message.role != MessageRole::User {
        return Err(ApiError::BadRequest(
            "Only user messages can be edited".to_string(),
        ));
    }

    let updated = MessageRepository::update_content(
        state.pool(),
        &id,
        &request.content,
        tokens::count(&request.content),
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Message"))?;
    Ok(Json(message_response(updated)))
}

/// DELETE /messages/{id}
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    owned_message(&state, &user, &id).await?;
    MessageRepository::delete(state.pool(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
