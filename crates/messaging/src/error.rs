//! Messaging error types.

use thiserror::Error;

/// Errors raised while encoding, decoding or moving saga messages.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// A record could not be decoded into a saga message.
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// The message type part of a name is not in the vocabulary.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// The message event part of a name is not in the vocabulary.
    #[error("Unknown message event: {0}")]
    UnknownEvent(String),

    /// An interned type or event code has no vocabulary entry.
    #[error("Unknown {kind} code: {code}")]
    UnknownCode { kind: &'static str, code: i64 },

    /// A topic name does not follow `<service>-syn|ack`.
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Payload JSON could not be produced or parsed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The message broker refused or failed an operation.
    #[error("Broker error: {0}")]
    Broker(String),

    /// The transport has been closed.
    #[error("Transport closed")]
    Closed,
}

/// Convenience type alias for messaging results.
pub type Result<T> = std::result::Result<T, MessagingError>;
