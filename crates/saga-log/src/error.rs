use common::{SagaId, ShardError};
use messaging::MessagingError;
use thiserror::Error;

/// Errors that can occur when interacting with the saga log.
#[derive(Debug, Error)]
pub enum SagaLogError {
    /// No saga root exists with this id.
    #[error("Saga not found: {0}")]
    SagaNotFound(SagaId),

    /// An entry was appended before the message was assigned to a saga.
    #[error("Cannot log a message that has no saga id")]
    UnassignedSaga,

    /// A stored entry does not decode back into a saga message.
    #[error("Corrupt log entry {entry_id}: {source}")]
    CorruptEntry {
        entry_id: i64,
        #[source]
        source: MessagingError,
    },

    /// A message could not be turned into a log entry.
    #[error("Message error: {0}")]
    Message(#[from] MessagingError),

    /// The partition set is misconfigured.
    #[error("Shard configuration error: {0}")]
    Shard(#[from] ShardError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for saga log operations.
pub type Result<T> = std::result::Result<T, SagaLogError>;
