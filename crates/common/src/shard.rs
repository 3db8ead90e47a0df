//! Deterministic shard selection.
//!
//! Every stateful component partitions its data across `N` backing stores by
//! hashing the entity key. The same functions are used by every service, so
//! two services holding the same key always agree on the partition.

use thiserror::Error;
use uuid::Uuid;

use crate::types::{EntityId, SagaId};

/// A key that can be hashed onto a partition.
pub trait ShardKey {
    /// Stable hash of the key. Must be identical across processes and runs.
    fn shard_hash(&self) -> u64;
}

fn crc(bytes: &[u8]) -> u64 {
    u64::from(crc32fast::hash(bytes))
}

impl ShardKey for [u8] {
    fn shard_hash(&self) -> u64 {
        crc(self)
    }
}

impl ShardKey for str {
    fn shard_hash(&self) -> u64 {
        crc(self.as_bytes())
    }
}

impl ShardKey for String {
    fn shard_hash(&self) -> u64 {
        self.as_str().shard_hash()
    }
}

impl ShardKey for Uuid {
    fn shard_hash(&self) -> u64 {
        crc(self.as_bytes())
    }
}

impl ShardKey for EntityId {
    fn shard_hash(&self) -> u64 {
        self.as_uuid().shard_hash()
    }
}

/// Non-negative saga ids hash to themselves, so `shard_of(saga_id, n)` is
/// `saga_id mod n`.
impl ShardKey for SagaId {
    fn shard_hash(&self) -> u64 {
        self.as_i64().rem_euclid(i64::MAX) as u64
    }
}

impl<K: ShardKey + ?Sized> ShardKey for &K {
    fn shard_hash(&self) -> u64 {
        (**self).shard_hash()
    }
}

/// Maps a key onto one of `partitions` shards.
///
/// # Panics
///
/// Panics if `partitions` is zero.
pub fn shard_of<K: ShardKey + ?Sized>(key: &K, partitions: usize) -> usize {
    assert!(partitions > 0, "partition count must be positive");
    (key.shard_hash() % partitions as u64) as usize
}

/// Maps a pair of keys onto a shard. Commutative in `a` and `b`.
///
/// # Panics
///
/// Panics if `partitions` is zero.
pub fn shard_of_pair<A, B>(a: &A, b: &B, partitions: usize) -> usize
where
    A: ShardKey + ?Sized,
    B: ShardKey + ?Sized,
{
    assert!(partitions > 0, "partition count must be positive");
    let sum = u128::from(a.shard_hash()) + u128::from(b.shard_hash());
    (sum % partitions as u128) as usize
}

/// Errors raised when building a router.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShardError {
    /// A router needs at least one partition.
    #[error("at least one partition is required")]
    NoPartitions,
}

/// One backing store instance and its position in the partition set.
#[derive(Debug, Clone)]
pub struct Partition<C> {
    id: usize,
    handle: C,
}

impl<C> Partition<C> {
    /// Index of this partition.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The connection handle owned by this partition.
    pub fn handle(&self) -> &C {
        &self.handle
    }
}

/// Routes keys to the partition that owns them.
pub trait ShardRouter<C> {
    /// Returns the partition owning `key`.
    fn route<K: ShardKey + ?Sized>(&self, key: &K) -> &Partition<C>;

    /// Returns the partition owning an entity keyed by two ids jointly.
    fn route_pair<A, B>(&self, a: &A, b: &B) -> &Partition<C>
    where
        A: ShardKey + ?Sized,
        B: ShardKey + ?Sized;

    /// All partitions in index order.
    fn partitions(&self) -> &[Partition<C>];

    /// Number of partitions.
    fn len(&self) -> usize {
        self.partitions().len()
    }

    /// Always false for a constructed router.
    fn is_empty(&self) -> bool {
        self.partitions().is_empty()
    }
}

/// Hash-based router over a fixed set of partitions.
#[derive(Debug, Clone)]
pub struct HashShardRouter<C> {
    partitions: Vec<Partition<C>>,
}

impl<C> HashShardRouter<C> {
    /// Creates a router owning `handles`; partition `i` is `handles[i]`.
    pub fn new(handles: Vec<C>) -> Result<Self, ShardError> {
        if handles.is_empty() {
            return Err(ShardError::NoPartitions);
        }
        let partitions = handles
            .into_iter()
            .enumerate()
            .map(|(id, handle)| Partition { id, handle })
            .collect();
        Ok(Self { partitions })
    }

    /// Creates `count` partitions, building each handle from its index.
    pub fn from_fn(count: usize, f: impl FnMut(usize) -> C) -> Result<Self, ShardError> {
        Self::new((0..count).map(f).collect())
    }
}

impl<C> ShardRouter<C> for HashShardRouter<C> {
    fn route<K: ShardKey + ?Sized>(&self, key: &K) -> &Partition<C> {
        &self.partitions[shard_of(key, self.partitions.len())]
    }

    fn route_pair<A, B>(&self, a: &A, b: &B) -> &Partition<C>
    where
        A: ShardKey + ?Sized,
        B: ShardKey + ?Sized,
    {
        &self.partitions[shard_of_pair(a, b, self.partitions.len())]
    }

    fn partitions(&self) -> &[Partition<C>] {
        &self.partitions
    }
}
