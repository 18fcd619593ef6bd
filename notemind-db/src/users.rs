//! User accounts and their encrypted provider keys.

use chrono::Utc;
use notemind_core::LlmProvider;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// A registered user
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Ciphertexts of a user's provider keys, as stored
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredApiKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub google: Option<String>,
}

impl StoredApiKeys {
    pub fn get(&self, provider: LlmProvider) -> Option<&str> {
        match provider {
            LlmProvider::OpenAi => self.openai.as_deref(),
            LlmProvider::Anthropic => self.anthropic.as_deref(),
            LlmProvider::Google => self.google.as_deref(),
        }
    }
}

/// Requested change to one stored key
#[derive(Debug, Clone, Default, PartialEq)]
pub enum KeyChange {
    #[default]
    Keep,
    Clear,
    Set(String),
}

/// Per-provider key changes applied in one update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiKeyChanges {
    pub openai: KeyChange,
    pub anthropic: KeyChange,
    pub google: KeyChange,
}

/// Input for a new user
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

/// User repository for database operations
pub struct UserRepository;

impl UserRepository {
    /// Create a user; fails with `Conflict` when the email is taken.
    pub async fn create(pool: &SqlitePool, new_user: NewUser<'_>) -> DbResult<User> {
        let id = format!("user_{}", Uuid::new_v4());
        let now = Utc::now().timestamp();
        let email = new_user.email.trim().to_lowercase();

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&email)
        .bind(new_user.password_hash)
        .bind(new_user.first_name)
        .bind(new_user.last_name)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| DbError::from_unique(e, "Email already registered"))?;

        info!("Created user: {}", id);

        Ok(User {
            id,
            email,
            password_hash: new_user.password_hash.to_string(),
            first_name: new_user.first_name.to_string(),
            last_name: new_user.last_name.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get user by ID
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> DbResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, first_name, last_name, created_at, updated_at
             FROM users
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(User::from))
    }

    /// Get user by email, case-insensitively
    pub async fn get_by_email(pool: &SqlitePool, email: &str) -> DbResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, first_name, last_name, created_at, updated_at
             FROM users
             WHERE email = ?",
        )
        .bind(email.trim())
        .fetch_optional(pool)
        .await?;

        Ok(row.map(User::from))
    }

    /// Stored (encrypted) provider keys; all empty for unknown users.
    pub async fn get_api_keys(pool: &SqlitePool, user_id: &str) -> DbResult<StoredApiKeys> {
        let row = sqlx::query_as::<_, ApiKeysRow>(
            "SELECT openai_api_key, anthropic_api_key, google_api_key
             FROM users
             WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(StoredApiKeys::from).unwrap_or_default())
    }

    /// Apply key changes in a single statement and return the result.
    pub async fn update_api_keys(
        pool: &SqlitePool,
        user_id: &str,
        changes: &ApiKeyChanges,
    ) -> DbResult<StoredApiKeys> {
        let now = Utc::now().timestamp();
        let (keep_openai, openai) = change_binds(&changes.openai);
        let (keep_anthropic, anthropic) = change_binds(&changes.anthropic);
        let (keep_google, google) = change_binds(&changes.google);

        let row = sqlx::query_as::<_, ApiKeysRow>(
            "UPDATE users
             SET openai_api_key = CASE WHEN ? THEN openai_api_key ELSE ? END,
                 anthropic_api_key = CASE WHEN ? THEN anthropic_api_key ELSE ? END,
                 google_api_key = CASE WHEN ? THEN google_api_key ELSE ? END,
                 updated_at = ?
             WHERE id = ?
             RETURNING openai_api_key, anthropic_api_key, google_api_key",
        )
        .bind(keep_openai)
        .bind(openai)
        .bind(keep_anthropic)
        .bind(anthropic)
        .bind(keep_google)
        .bind(google)
        .bind(now)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(StoredApiKeys::from).unwrap_or_default())
    }
}

fn change_binds(change: &KeyChange) -> (bool, Option<&str>) {
    match change {
        KeyChange::Keep => (true, None),
        KeyChange::Clear => (false, None),
        KeyChange::Set(value) => (false, Some(value.as_str())),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    created_at: i64,
    updated_at: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ApiKeysRow {
    openai_api_key: Option<String>,
    anthropic_api_key: Option<String>,
    google_api_key: Option<String>,
}

impl From<ApiKeysRow> for StoredApiKeys {
    fn from(row: ApiKeysRow) -> Self {
        StoredApiKeys {
            openai: row.openai_api_key,
            anthropic: row.anthropic_api_key,
            google: row.google_api_key,
        }
    }
}
