use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{HashShardRouter, SagaId, ShardRouter};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::{
    InMemorySagaLog, NewLogEntry, PostgresSagaLog, Result, SagaIdSequence, SagaLogEntry,
    SagaRecord, store::SagaLogStore,
};

/// A saga log split across partitions by saga id.
///
/// New sagas are spread round-robin; each partition allocates only ids
/// that hash back to itself, so every later operation on a saga lands on
/// the partition that created it.
pub struct ShardedSagaLog<S> {
    router: HashShardRouter<S>,
    next_partition: AtomicUsize,
}

impl<S: SagaLogStore> ShardedSagaLog<S> {
    /// Wraps already-built partitions. Partition `i` must allocate ids from
    /// `SagaIdSequence::for_partition(i, partitions.len())`.
    pub fn new(partitions: Vec<S>) -> Result<Self> {
        Ok(Self {
            router: HashShardRouter::new(partitions)?,
            next_partition: AtomicUsize::new(0),
        })
    }

    /// Number of partitions.
    pub fn partition_count(&self) -> usize {
        self.router.len()
    }

    /// The partition owning `saga_id`.
    pub fn partition_for(&self, saga_id: SagaId) -> &S {
        self.router.route(&saga_id).handle()
    }
}

impl ShardedSagaLog<InMemorySagaLog> {
    /// `count` in-memory partitions.
    pub fn in_memory(count: usize) -> Result<Self> {
        Ok(Self {
            router: HashShardRouter::from_fn(count, |i| InMemorySagaLog::for_partition(i, count))?,
            next_partition: AtomicUsize::new(0),
        })
    }
}

impl ShardedSagaLog<PostgresSagaLog> {
    /// One PostgreSQL partition per pool.
    pub fn postgres(pools: Vec<PgPool>) -> Result<Self> {
        let count = pools.len();
        let partitions = pools
            .into_iter()
            .enumerate()
            .map(|(i, pool)| {
                PostgresSagaLog::with_sequence(pool, SagaIdSequence::for_partition(i, count))
            })
            .collect();
        Self::new(partitions)
    }

    /// Opens one pool per database URL; URL `i` becomes partition `i`.
    pub async fn connect(urls: &[String], max_connections: u32) -> Result<Self> {
        let mut pools = Vec::with_capacity(urls.len());
        for url in urls {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await?;
            pools.push(pool);
        }
        Self::postgres(pools)
    }

    /// Migrates every partition.
    pub async fn run_migrations(&self) -> Result<()> {
        for partition in self.router.partitions() {
            partition.handle().run_migrations().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<S: SagaLogStore> SagaLogStore for ShardedSagaLog<S> {
    async fn create_saga(&self) -> Result<SagaRecord> {
        let index = self.next_partition.fetch_add(1, Ordering::Relaxed) % self.router.len();
        let record = self.router.partitions()[index].handle().create_saga().await?;
        tracing::debug!(saga_id = %record.id, partition = index, "saga created");
        Ok(record)
    }

    async fn append(&self, entry: NewLogEntry) -> Result<SagaLogEntry> {
        self.partition_for(entry.saga_id).append(entry).await
    }

    async fn latest_entry(&self, saga_id: SagaId) -> Result<Option<SagaLogEntry>> {
        self.partition_for(saga_id).latest_entry(saga_id).await
    }

    async fn entries(&self, saga_id: SagaId) -> Result<Vec<SagaLogEntry>> {
        self.partition_for(saga_id).entries(saga_id).await
    }

    async fn latest_entries(&self) -> Result<Vec<SagaLogEntry>> {
        let mut all = Vec::new();
        for partition in self.router.partitions() {
            all.extend(partition.handle().latest_entries().await?);
        }
        all.sort_by_key(|e| e.saga_id);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SagaLogError, SagaLogStoreExt};
    use common::shard_of;
    use messaging::{MessageName, OrderPayload, SagaMessage};

    #[tokio::test]
    async fn test_zero_partitions_is_rejected() {
        assert!(matches!(
            ShardedSagaLog::in_memory(0),
            Err(SagaLogError::Shard(_))
        ));
    }

    #[tokio::test]
    async fn test_sagas_spread_round_robin_and_route_home() {
        let log = ShardedSagaLog::in_memory(3).unwrap();
        let mut ids = Vec::new();
        for _ in 0..6 {
            ids.push(log.create_saga().await.unwrap().id);
        }

        let shards: Vec<_> = ids.iter().map(|id| shard_of(id, 3)).collect();
        assert_eq!(shards, vec![0, 1, 2, 0, 1, 2]);
        for id in &ids {
            assert!(id.as_i64() > 0);
        }
        for i in 0..3 {
            assert_eq!(log.router.partitions()[i].handle().saga_count().await, 2);
        }
    }

    #[tokio::test]
    async fn test_entries_land_on_owning_partition() {
        let log = ShardedSagaLog::in_memory(3).unwrap();
        let _ = log.create_saga().await.unwrap();
        let saga = log.create_saga().await.unwrap().id;

        let msg = SagaMessage::new(
            MessageName::START_CHECKOUT_SAGA,
            saga,
            OrderPayload {
                order_id: "o1".into(),
                ..Default::default()
            },
        );
        log.append_message(&msg).await.unwrap();
        log.append_message(&msg.clone().with_name(MessageName::START_SUBTRACT_STOCK))
            .await
            .unwrap();

        assert_eq!(log.partition_for(saga).entry_count().await, 2);
        assert_eq!(log.entries(saga).await.unwrap().len(), 2);
        assert_eq!(
            log.latest_message(saga).await.unwrap().unwrap().name,
            MessageName::START_SUBTRACT_STOCK
        );

        let latest = log.latest_entries().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].saga_id, saga);
    }
}
