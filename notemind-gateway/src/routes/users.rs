//! Registration, login, profile and provider keys.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use notemind_core::LlmProvider;
use notemind_core::api::{
    ApiKeysUpdate, LoginRequest, MaskedApiKeys, RegisterRequest, TokenResponse, UserResponse,
};
use notemind_db::{ApiKeyChanges, DbError, KeyChange, NewUser, StoredApiKeys, User, UserRepository};
use tracing::info;

use crate::auth::{AuthUser, hash_password, verify_password};
use crate::error::{ApiError, ApiResult};
use crate::routes::{required_text, timestamp};
use crate::state::AppState;
use crate::vault::{KeyVault, mask};

const MIN_PASSWORD_CHARS: usize = 6;

fn user_response(user: &User) -> UserResponse {
    UserResponse {
        id: user.id.clone(),
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        created_at: timestamp(user.created_at),
    }
}

fn token_response(state: &AppState, user: &User) -> ApiResult<TokenResponse> {
    let access_token = state.auth.issue(&user.id, &user.email)?;
    Ok(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        user: user_response(user),
    })
}

/// Loose shape check: one `@`, a non-empty local part, a dotted domain.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}

/// POST /users/
pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let Json(request) = body?;
    let email = request.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::validation("email", "value is not a valid email address"));
    }
    if request.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::validation(
            "password",
            format!("password must be at least {MIN_PASSWORD_CHARS} characters"),
        ));
    }
    let first_name = required_text("first_name", &request.first_name)?;
    let last_name = required_text("last_name", &request.last_name)?;

    let password = request.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

    let user = UserRepository::create(
        state.pool(),
        NewUser {
            email: &email,
            password_hash: &password_hash,
            first_name,
            last_name,
        },
    )
    .await
    .map_err(|e| match e {
        DbError::Conflict(_) => ApiError::BadRequest("Email already registered".to_string()),
        other => other.into(),
    })?;

    info!("Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(token_response(&state, &user)?)))
}

/// POST /users/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let Json(request) = body?;
    let bad_credentials = || ApiError::Unauthorized("Incorrect email or password".to_string());

    let user = UserRepository::get_by_email(state.pool(), request.email.trim())
        .await?
        .ok_or_else(bad_credentials)?;

    let password = request.password;
    let hash = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?;
    if !valid {
        return Err(bad_credentials());
    }

    Ok(Json(token_response(&state, &user)?))
}

/// GET /users/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<UserResponse>> {
    let user = UserRepository::get_by_id(state.pool(), &user.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;
    Ok(Json(user_response(&user)))
}

fn key_change(vault: &KeyVault, value: Option<&str>) -> ApiResult<KeyChange> {
    Ok(match value.map(str::trim) {
        None => KeyChange::Keep,
        Some("") => KeyChange::Clear,
        Some(key) => KeyChange::Set(vault.encrypt(key)?),
    })
}

fn masked(vault: &KeyVault, keys: &StoredApiKeys) -> ApiResult<MaskedApiKeys> {
    let reveal = |provider: LlmProvider| -> ApiResult<Option<String>> {
        keys.get(provider)
            .map(|sealed| vault.decrypt(sealed).map(|plain| mask(&plain)))
            .transpose()
            .map_err(ApiError::from)
    };
    Ok(MaskedApiKeys {
        openai_api_key: reveal(LlmProvider::OpenAi)?,
        anthropic_api_key: reveal(LlmProvider::Anthropic)?,
        google_api_key: reveal(LlmProvider::Google)?,
    })
}

/// PUT /users/api-keys
pub async fn update_api_keys(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<ApiKeysUpdate>, JsonRejection>,
) -> ApiResult<Json<MaskedApiKeys>> {
    let Json(update) = body?;
    let changes = ApiKeyChanges {
        openai: key_change(&state.vault, update.openai_api_key.as_deref())?,
        anthropic: key_change(&state.vault, update.anthropic_api_key.as_deref())?,
        google: key_change(&state.vault, update.google_api_key.as_deref())?,
    };
    let stored = UserRepository::update_api_keys(state.pool(), &user.user_id, &changes).await?;
    info!("Updated provider keys for {}", user.user_id);
    Ok(Json(masked(&state.vault, &stored)?))
}

/// GET /users/api-keys
pub async fn get_api_keys(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<MaskedApiKeys>> {
    let stored = UserRepository::get_api_keys(state.pool(), &user.user_id).await?;
    Ok(Json(masked(&state.vault, &stored)?))
}
