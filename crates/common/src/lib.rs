//! Shared types for the checkout saga services.

pub mod shard;
pub mod types;

pub use shard::{
    HashShardRouter, Partition, ShardError, ShardKey, ShardRouter, shard_of, shard_of_pair,
};
pub use types::{EntityId, SagaId};
