//! Sharded in-memory entity tables backing the participant services.

use std::collections::HashMap;
use std::hash::Hash;

use common::{EntityId, HashShardRouter, Partition, ShardError, ShardRouter};
use tokio::sync::RwLock;

use crate::error::ParticipantError;

/// Primary key of a table row; decides which partition holds the row.
pub trait RowKey: Eq + Hash + Clone + Send + Sync {
    fn route<'a, C>(&self, router: &'a HashShardRouter<C>) -> &'a Partition<C>;
}

impl RowKey for EntityId {
    fn route<'a, C>(&self, router: &'a HashShardRouter<C>) -> &'a Partition<C> {
        router.route(self)
    }
}

/// A table split over a fixed number of partitions. Each partition has its
/// own lock, so updates of one row are atomic.
pub struct ShardedTable<K, V> {
    router: HashShardRouter<RwLock<HashMap<K, V>>>,
    kind: &'static str,
}

impl<K: RowKey, V: Clone + Send + Sync> ShardedTable<K, V> {
    /// Creates an empty table. `kind` names the entity in errors.
    pub fn new(kind: &'static str, partitions: usize) -> Result<Self, ShardError> {
        Ok(Self {
            router: HashShardRouter::from_fn(partitions, |_| RwLock::new(HashMap::new()))?,
            kind,
        })
    }

    fn partition(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        key.route(&self.router).handle()
    }

    /// Index of the partition holding `key`.
    pub fn partition_of(&self, key: &K) -> usize {
        key.route(&self.router).id()
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.partition(key).read().await.get(key).cloned()
    }

    /// Inserts or replaces a row.
    pub async fn upsert(&self, key: K, value: V) {
        self.partition(&key).write().await.insert(key, value);
    }

    /// Runs `f` on an existing row under the partition's write lock.
    /// Nothing is written when `f` fails.
    pub async fn update<R>(
        &self,
        key: &K,
        f: impl FnOnce(&mut V) -> Result<R, ParticipantError>,
    ) -> Result<R, ParticipantError>
    where
        K: std::fmt::Display,
    {
        let mut rows = self.partition(key).write().await;
        let row = rows
            .get_mut(key)
            .ok_or_else(|| ParticipantError::not_found(self.kind, key))?;
        let mut draft = row.clone();
        let result = f(&mut draft)?;
        *row = draft;
        Ok(result)
    }

    /// Rows per partition, in partition order.
    pub async fn partition_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.router.len());
        for partition in self.router.partitions() {
            sizes.push(partition.handle().read().await.len());
        }
        sizes
    }
}
