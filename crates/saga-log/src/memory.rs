use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::SagaId;
use tokio::sync::RwLock;

use crate::{
    NewLogEntry, Result, SagaIdSequence, SagaLogEntry, SagaLogError, SagaRecord,
    store::SagaLogStore,
};

#[derive(Default)]
struct State {
    sagas: BTreeMap<SagaId, SagaRecord>,
    entries: Vec<SagaLogEntry>,
    sagas_created: i64,
}

/// In-memory saga log partition.
///
/// Mirrors the PostgreSQL schema: saga roots, append-only entries with
/// store-assigned ids and timestamps.
#[derive(Clone)]
pub struct InMemorySagaLog {
    state: Arc<RwLock<State>>,
    sequence: SagaIdSequence,
}

impl Default for InMemorySagaLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySagaLog {
    /// Creates an unpartitioned log.
    pub fn new() -> Self {
        Self::with_sequence(SagaIdSequence::single())
    }

    /// Creates the log for partition `index` of `count`.
    pub fn for_partition(index: usize, count: usize) -> Self {
        Self::with_sequence(SagaIdSequence::for_partition(index, count))
    }

    fn with_sequence(sequence: SagaIdSequence) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            sequence,
        }
    }

    /// Returns the total number of entries stored.
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Returns the number of saga roots.
    pub async fn saga_count(&self) -> usize {
        self.state.read().await.sagas.len()
    }
}

#[async_trait]
impl SagaLogStore for InMemorySagaLog {
    async fn create_saga(&self) -> Result<SagaRecord> {
        let mut state = self.state.write().await;
        let id = self.sequence.nth(state.sagas_created);
        state.sagas_created += 1;

        let record = SagaRecord {
            id,
            created_at: Utc::now(),
        };
        state.sagas.insert(id, record.clone());
        Ok(record)
    }

    async fn append(&self, entry: NewLogEntry) -> Result<SagaLogEntry> {
        let mut state = self.state.write().await;
        if !state.sagas.contains_key(&entry.saga_id) {
            return Err(SagaLogError::SagaNotFound(entry.saga_id));
        }

        let stored = SagaLogEntry {
            id: state.entries.len() as i64 + 1,
            saga_id: entry.saga_id,
            message_type: entry.message_type,
            message_event: entry.message_event,
            payload: entry.payload,
            timestamp: Utc::now(),
        };
        state.entries.push(stored.clone());
        Ok(stored)
    }

    async fn latest_entry(&self, saga_id: SagaId) -> Result<Option<SagaLogEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.saga_id == saga_id)
            .max_by_key(|e| e.order_key())
            .cloned())
    }

    async fn entries(&self, saga_id: SagaId) -> Result<Vec<SagaLogEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .entries
            .iter()
            .filter(|e| e.saga_id == saga_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.order_key());
        Ok(entries)
    }

    async fn latest_entries(&self) -> Result<Vec<SagaLogEntry>> {
        let state = self.state.read().await;
        let mut latest: HashMap<SagaId, &SagaLogEntry> = HashMap::new();
        for entry in &state.entries {
            latest
                .entry(entry.saga_id)
                .and_modify(|current| {
                    if entry.order_key() > current.order_key() {
                        *current = entry;
                    }
                })
                .or_insert(entry);
        }
        let mut entries: Vec<_> = latest.into_values().cloned().collect();
        entries.sort_by_key(|e| e.saga_id);
        Ok(entries)
    }
}
