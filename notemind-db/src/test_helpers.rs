//! Test helpers for notemind databases.

use sqlx::SqlitePool;

use crate::{
    error::DbResult,
    notemind_db::NotemindDbPool,
    sqlite_runtime::create_in_memory_pool,
    users::{NewUser, User, UserRepository},
};

/// Create an in-memory, migrated database for testing
pub async fn create_test_pool() -> DbResult<NotemindDbPool> {
    let pool = create_in_memory_pool().await?;
    NotemindDbPool::run_migrations(&pool).await?;
    Ok(NotemindDbPool::from_pool(pool))
}

/// Insert a user with a placeholder password hash
pub async fn seed_user(pool: &SqlitePool, email: &str) -> DbResult<User> {
    UserRepository::create(
        pool,
        NewUser {
            email,
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$placeholder$placeholder",
            first_name: "Test",
            last_name: "User",
        },
    )
    .await
}
