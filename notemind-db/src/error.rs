//! Database error types.

/// Database operation errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// SQL error from sqlx
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// A unique or referential constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored role string is not a known role
    #[error("Invalid message role: {0}")]
    InvalidRole(String),

    /// Stored provider string is not a known provider
    #[error("Invalid provider: {0}")]
    InvalidProvider(String),

    /// Config directory not found
    #[error("Config/data directory not found")]
    NoConfigDir,

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Map a unique-constraint violation to `Conflict`, pass anything else through.
    pub(crate) fn from_unique(err: sqlx::Error, message: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::Conflict(message.into())
            }
            _ => DbError::Sql(err),
        }
    }
}

/// Result type alias for database operations
pub type DbResult<T> = Result<T, DbError>;
