//! Saga messaging: the message vocabulary, record codecs, topic naming and
//! the transport every participant uses to exchange saga messages.
//!
//! Orchestrator instructions travel on `<service>-syn` topics and participant
//! replies on `<service>-ack` topics. Each subscribed topic gets its own
//! listener task (see [`ListenerGroup`]). The in-process transport is always
//! available; the Kafka transport needs the `kafka` feature.

pub mod codec;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod listener;
pub mod message;
pub mod topic;
pub mod transport;

pub use codec::{DelimitedCodec, FramedCodec, MessageCodec};
pub use error::{MessagingError, Result};
pub use listener::{ListenerGroup, MessageHandler, Reply};
pub use message::{MessageEvent, MessageName, MessageType, OrderPayload, SagaMessage};
pub use topic::{Direction, Service, Topic};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaTransport, KafkaTransportConfig};
pub use transport::{DEFAULT_RETENTION, InMemoryTransport, MessageStream, Transport};
