//! Database connection pool and initialization.

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use tracing::info;

use crate::{
    error::{DbError, DbResult},
    sqlite_runtime::create_file_pool,
};

/// NoteMind database pool wrapper
#[derive(Debug, Clone)]
pub struct NotemindDbPool {
    pool: SqlitePool,
}

impl NotemindDbPool {
    /// Open the database at `path`, or at the default location when `None`.
    ///
    /// Creates the parent directory, connects, and runs pending migrations.
    pub async fn open(path: Option<&Path>) -> DbResult<Self> {
        let db_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_db_path()?,
        };
        info!("Initializing notemind database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let pool = create_file_pool(&db_path, 5).await?;
        Self::run_migrations(&pool).await?;

        info!("notemind database initialized successfully");
        Ok(Self { pool })
    }

    /// Get the inner SQLx pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Default database file path in the XDG data directory
    pub fn default_db_path() -> DbResult<PathBuf> {
        let data_dir = dirs::data_dir().ok_or(DbError::NoConfigDir)?;
        Ok(data_dir.join("notemind").join("notemind.sqlite3"))
    }

    pub(crate) async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;

        info!("notemind database migrations completed");
        Ok(())
    }

    /// Close the pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Wrap an existing, already migrated pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}
