use std::sync::Arc;

use async_trait::async_trait;
use common::SagaId;
use messaging::SagaMessage;

use crate::{NewLogEntry, Result, SagaLogEntry, SagaRecord};

/// Saga id allocation for one partition of `step` partitions.
///
/// Partition `i` hands out `step + i, 2 * step + i, ...`, so every id it
/// allocates routes back to it and no id collides with the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SagaIdSequence {
    start: i64,
    step: i64,
}

impl SagaIdSequence {
    /// Sequence for a single unpartitioned store: 1, 2, 3, ...
    pub fn single() -> Self {
        Self::for_partition(0, 1)
    }

    /// Sequence for partition `index` of `count`.
    pub fn for_partition(index: usize, count: usize) -> Self {
        let step = count.max(1) as i64;
        Self {
            start: step + index as i64,
            step,
        }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// The `n`th id (zero-based).
    pub fn nth(&self, n: i64) -> SagaId {
        SagaId::new(self.start + n * self.step)
    }
}

/// Core trait for saga log implementations.
///
/// The log is append-only. Entries of one saga are totally ordered by
/// `(timestamp, id)`; the latest entry is the saga's state.
#[async_trait]
pub trait SagaLogStore: Send + Sync {
    /// Creates a new saga root and returns it.
    async fn create_saga(&self) -> Result<SagaRecord>;

    /// Appends an entry to an existing saga.
    async fn append(&self, entry: NewLogEntry) -> Result<SagaLogEntry>;

    /// The most recent entry of a saga, if it has any.
    async fn latest_entry(&self, saga_id: SagaId) -> Result<Option<SagaLogEntry>>;

    /// Every entry of a saga, oldest first.
    async fn entries(&self, saga_id: SagaId) -> Result<Vec<SagaLogEntry>>;

    /// The latest entry of every saga that has entries.
    async fn latest_entries(&self) -> Result<Vec<SagaLogEntry>>;
}

#[async_trait]
impl<T: SagaLogStore + ?Sized> SagaLogStore for Arc<T> {
    async fn create_saga(&self) -> Result<SagaRecord> {
        (**self).create_saga().await
    }

    async fn append(&self, entry: NewLogEntry) -> Result<SagaLogEntry> {
        (**self).append(entry).await
    }

    async fn latest_entry(&self, saga_id: SagaId) -> Result<Option<SagaLogEntry>> {
        (**self).latest_entry(saga_id).await
    }

    async fn entries(&self, saga_id: SagaId) -> Result<Vec<SagaLogEntry>> {
        (**self).entries(saga_id).await
    }

    async fn latest_entries(&self) -> Result<Vec<SagaLogEntry>> {
        (**self).latest_entries().await
    }
}

/// Extension trait providing message-level convenience methods.
#[async_trait]
pub trait SagaLogStoreExt: SagaLogStore {
    /// Records `message` in its saga's log.
    async fn append_message(&self, message: &SagaMessage) -> Result<SagaLogEntry> {
        self.append(NewLogEntry::from_message(message)?).await
    }

    /// Reconstructs the latest message of a saga.
    async fn latest_message(&self, saga_id: SagaId) -> Result<Option<SagaMessage>> {
        match self.latest_entry(saga_id).await? {
            Some(entry) => Ok(Some(entry.to_message()?)),
            None => Ok(None),
        }
    }
}

impl<T: SagaLogStore + ?Sized> SagaLogStoreExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use common::shard_of;

    #[test]
    fn test_single_sequence() {
        let seq = SagaIdSequence::single();
        assert_eq!(seq.nth(0), SagaId::new(1));
        assert_eq!(seq.nth(1), SagaId::new(2));
    }

    #[test]
    fn test_partition_sequences_route_home() {
        for index in 0..3 {
            let seq = SagaIdSequence::for_partition(index, 3);
            for n in 0..20 {
                let id = seq.nth(n);
                assert!(id.as_i64() > 0);
                assert_eq!(shard_of(&id, 3), index);
            }
        }
    }

    #[test]
    fn test_partition_sequences_do_not_overlap() {
        let a: Vec<_> = (0..10).map(|n| SagaIdSequence::for_partition(0, 3).nth(n)).collect();
        let b: Vec<_> = (0..10).map(|n| SagaIdSequence::for_partition(1, 3).nth(n)).collect();
        assert!(a.iter().all(|id| !b.contains(id)));
    }
}
