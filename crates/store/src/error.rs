use thiserror::Error;

/// Errors that can occur when interacting with the fulfillment store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred (connection lost, pool timeout, statement failure).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A unique constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A stored value could not be decoded into the domain vocabulary.
    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    /// The connected schema lacks an optional capability the write needs.
    #[error("Storage capability not available: {0}")]
    Unsupported(&'static str),
}

impl StoreError {
    /// True for failures that may clear on their own: lost connections, pool
    /// exhaustion, statement timeouts, serialization conflicts and deadlocks.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(err) => match err {
                sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| {
                    // 08: connection exception, 53: insufficient resources,
                    // 57014/57P0x: statement timeout and server shutdown.
                    matches!(code.as_ref(), "40001" | "40P01" | "57014")
                        || code.starts_with("08")
                        || code.starts_with("53")
                        || code.starts_with("57P0")
                }),
                _ => false,
            },
            _ => false,
        }
    }

    pub(crate) fn corrupt(table: &'static str, reason: impl ToString) -> Self {
        StoreError::CorruptRow {
            table,
            reason: reason.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
