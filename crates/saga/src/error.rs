//! Saga error types.

use common::{EntityId, ShardError};
use messaging::{MessageName, MessagingError};
use saga_log::SagaLogError;
use thiserror::Error;

/// Errors that can occur while driving a saga.
///
/// Protocol violations (unknown transitions, undecodable log entries) are
/// not errors: the orchestrator logs them and takes no action.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Saga log error.
    #[error("Saga log error: {0}")]
    Log(#[from] SagaLogError),

    /// Transport or codec error.
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// The release callback could not be delivered.
    #[error("Release callback failed: {0}")]
    Callback(#[from] reqwest::Error),

    /// The release callback base is not an absolute http(s) URL.
    #[error("Invalid release callback URL: {0}")]
    InvalidCallbackUrl(String),

    /// The gateway answered the release callback with an error status.
    #[error("Release for order {order_id} rejected with status {status}")]
    ReleaseRejected { order_id: String, status: u16 },

    /// A partition set is misconfigured.
    #[error("Shard configuration error: {0}")]
    Shard(#[from] ShardError),

    /// A checkout could not be started.
    #[error("Checkout rejected: {0}")]
    Checkout(#[from] ParticipantError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Failures of a participant's local transaction. Every variant sends the
/// saga down its compensation path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParticipantError {
    /// An identifier in the payload is not a valid id.
    #[error("Malformed id '{0}'")]
    MalformedId(String),

    /// The referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The item has no stock left.
    #[error("Insufficient stock for item {0}")]
    InsufficientStock(EntityId),

    /// The user cannot cover the order.
    #[error("Insufficient credit for user {user_id}: need {required}, have {available}")]
    InsufficientCredit {
        user_id: EntityId,
        required: i64,
        available: i64,
    },

    /// The step is not one this service performs.
    #[error("Unsupported step {0}")]
    Unsupported(MessageName),
}

impl ParticipantError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
