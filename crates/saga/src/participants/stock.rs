//! Stock participant: subtracts and re-adds item stock.

use async_trait::async_trait;
use common::{EntityId, ShardError};
use messaging::{MessageEvent, MessageName, MessageType, OrderPayload, Service};
use serde::{Deserialize, Serialize};

use super::LocalTransaction;
use super::table::ShardedTable;
use crate::error::ParticipantError;

/// A stocked item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub price: i64,
    pub stock: i64,
}

/// Item stock, sharded by item id. Stock never goes negative.
pub struct StockService {
    items: ShardedTable<EntityId, Item>,
}

impl StockService {
    pub fn new(partitions: usize) -> Result<Self, ShardError> {
        Ok(Self {
            items: ShardedTable::new("item", partitions)?,
        })
    }

    /// Registers a new item with `stock` units.
    pub async fn create_item(&self, price: i64, stock: i64) -> EntityId {
        let id = EntityId::new();
        self.items.upsert(id, Item { price, stock }).await;
        id
    }

    pub async fn item(&self, id: EntityId) -> Option<Item> {
        self.items.get(&id).await
    }

    pub async fn stock_of(&self, id: EntityId) -> Option<i64> {
        self.item(id).await.map(|item| item.stock)
    }

    /// Adds `amount` units of one item.
    pub async fn add_stock(&self, id: EntityId, amount: i64) -> Result<i64, ParticipantError> {
        self.items
            .update(&id, |item| {
                item.stock += amount;
                Ok(item.stock)
            })
            .await
    }

    /// Removes one unit of every listed item.
    ///
    /// All or nothing: if item `k` cannot be decremented, items `0..k` are
    /// restored before the error is returned.
    #[tracing::instrument(skip(self, items), fields(count = items.len()))]
    pub async fn subtract(&self, items: &[EntityId]) -> Result<(), ParticipantError> {
        for (k, id) in items.iter().enumerate() {
            let decremented = self
                .items
                .update(id, |item| {
                    if item.stock < 1 {
                        return Err(ParticipantError::InsufficientStock(*id));
                    }
                    item.stock -= 1;
                    Ok(())
                })
                .await;

            if let Err(e) = decremented {
                self.restore(&items[..k]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Adds one unit of every listed item back.
    #[tracing::instrument(skip(self, items), fields(count = items.len()))]
    pub async fn readd(&self, items: &[EntityId]) -> Result<(), ParticipantError> {
        for (k, id) in items.iter().enumerate() {
            if let Err(e) = self.add_stock(*id, 1).await {
                self.take_back(&items[..k]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undoes a partial re-add.
    async fn take_back(&self, items: &[EntityId]) {
        for id in items.iter().rev() {
            let taken = self
                .items
                .update(id, |item| {
                    item.stock -= 1;
                    Ok(())
                })
                .await;
            if let Err(e) = taken {
                tracing::error!(item_id = %id, error = %e, "failed to take back re-added stock");
            }
        }
    }

    async fn restore(&self, items: &[EntityId]) {
        for id in items.iter().rev() {
            if let Err(e) = self.add_stock(*id, 1).await {
                tracing::error!(item_id = %id, error = %e, "failed to restore stock");
            }
        }
    }
}

/// Parses the payload's item ids, rejecting the batch if any is malformed.
fn item_ids(payload: &OrderPayload) -> Result<Vec<EntityId>, ParticipantError> {
    payload
        .items
        .iter()
        .map(|raw| EntityId::parse(raw).map_err(|_| ParticipantError::MalformedId(raw.clone())))
        .collect()
}

#[async_trait]
impl LocalTransaction for StockService {
    fn service(&self) -> Service {
        Service::Stock
    }

    fn owns(&self, event: MessageEvent) -> bool {
        matches!(event, MessageEvent::SubtractStock | MessageEvent::ReaddStock)
    }

    async fn apply(
        &self,
        event: MessageEvent,
        payload: &mut OrderPayload,
    ) -> Result<(), ParticipantError> {
        let items = item_ids(payload)?;
        match event {
            MessageEvent::SubtractStock => self.subtract(&items).await,
            MessageEvent::ReaddStock => self.readd(&items).await,
            other => Err(ParticipantError::Unsupported(MessageName::new(
                MessageType::Start,
                other,
            ))),
        }
    }
}
