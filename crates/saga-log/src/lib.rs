//! Durable, append-only saga log.
//!
//! Every message the orchestrator processes is recorded here before it is
//! acted upon; the latest entry of a saga is the saga's state.

pub mod entry;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod sharded;
pub mod store;

pub use entry::{NewLogEntry, SagaLogEntry, SagaRecord};
pub use error::{Result, SagaLogError};
pub use memory::InMemorySagaLog;
pub use postgres::PostgresSagaLog;
pub use sharded::ShardedSagaLog;
pub use store::{SagaIdSequence, SagaLogStore, SagaLogStoreExt};
