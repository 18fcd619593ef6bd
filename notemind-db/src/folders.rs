//! Folders group a user's conversations. Names are unique per user,
//! ignoring case.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

const DUPLICATE_NAME: &str = "A folder with this name already exists";

/// Folder repository for database operations
pub struct FolderRepository;

impl FolderRepository {
    pub async fn create(pool: &SqlitePool, user_id: &str, name: &str) -> DbResult<Folder> {
        let id = format!("fold_{}", Uuid::new_v4());
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO folders (id, user_id, name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| DbError::from_unique(e, DUPLICATE_NAME))?;

        info!("Created folder {} for user {}", id, user_id);

        Ok(Folder {
            id,
            user_id: user_id.to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> DbResult<Option<Folder>> {
        let row = sqlx::query_as::<_, FolderRow>(
            "SELECT id, user_id, name, created_at, updated_at FROM folders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Folder::from))
    }

    /// Newest first
    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: &str,
        skip: u32,
        limit: u32,
    ) -> DbResult<Vec<Folder>> {
        let rows = sqlx::query_as::<_, FolderRow>(
            "SELECT id, user_id, name, created_at, updated_at
             FROM folders
             WHERE user_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .bind(i64::from(skip))
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Folder::from).collect())
    }

    pub async fn rename(pool: &SqlitePool, id: &str, name: &str) -> DbResult<Option<Folder>> {
        let row = sqlx::query_as::<_, FolderRow>(
            "UPDATE folders
             SET name = ?, updated_at = ?
             WHERE id = ?
             RETURNING id, user_id, name, created_at, updated_at",
        )
        .bind(name)
        .bind(Utc::now().timestamp())
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| DbError::from_unique(e, DUPLICATE_NAME))?;

        Ok(row.map(Folder::from))
    }

    /// Delete an empty folder. Returns `false` if it did not exist.
    pub async fn delete(pool: &SqlitePool, id: &str) -> DbResult<bool> {
        let in_use: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE folder_id = ?")
                .bind(id)
                .fetch_one(pool)
                .await?;
        if in_use > 0 {
            return Err(DbError::Conflict(format!(
                "Folder contains {} conversation(s)",
                in_use
            )));
        }

        let result = sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    DbError::Conflict("Folder contains conversations".to_string())
                }
                _ => DbError::Sql(e),
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FolderRow {
    id: String,
    user_id: String,
    name: String,
    created_at: i64,
    updated_at: i64,
}

impl From<FolderRow> for Folder {
    fn from(row: FolderRow) -> Self {
        Folder {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{create_test_pool, seed_user};

    #[tokio::test]
    async fn test_names_unique_per_user_ignoring_case() {
        let db = create_test_pool().await.unwrap();
        let pool = db.pool();
        let alice = seed_user(pool, "alice@example.com").await.unwrap();
        let bob = seed_user(pool, "bob@example.com").await.unwrap();

        FolderRepository::create(pool, &alice.id, "Work").await.unwrap();
        let err = FolderRepository::create(pool, &alice.id, "work")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        // Same name under another user is fine
        FolderRepository::create(pool, &bob.id, "Work").await.unwrap();
    }

    #[tokio::test]
    async fn test_rename_and_list() {
        let db = create_test_pool().await.unwrap();
        let pool = db.pool();
        let user = seed_user(pool, "list@example.com").await.unwrap();

        let first = FolderRepository::create(pool, &user.id, "First").await.unwrap();
        let second = FolderRepository::create(pool, &user.id, "Second").await.unwrap();

        let listed = FolderRepository::list_for_user(pool, &user.id, 0, 50)
            .await
            .unwrap();
        assert_eq!(
            listed.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(),
            vec![second.id.as_str(), first.id.as_str()]
        );

        let paged = FolderRepository::list_for_user(pool, &user.id, 1, 50)
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);

        let renamed = FolderRepository::rename(pool, &first.id, "Renamed")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.name, "Renamed");

        let err = FolderRepository::rename(pool, &first.id, "SECOND")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        assert!(FolderRepository::rename(pool, "fold_missing", "x")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_folder() {
        let db = create_test_pool().await.unwrap();
        assert!(!FolderRepository::delete(db.pool(), "fold_missing").await.unwrap());
    }
}
