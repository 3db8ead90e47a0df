//! Order participant: marks orders paid and starts checkouts.

use std::sync::Arc;

use async_trait::async_trait;
use common::{EntityId, ShardError};
use messaging::{
    MessageEvent, MessageName, MessageType, OrderPayload, SagaMessage, Service, Topic, Transport,
};
use serde::{Deserialize, Serialize};

use super::LocalTransaction;
use super::table::ShardedTable;
use crate::error::{ParticipantError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub user_id: EntityId,
    pub items: Vec<EntityId>,
    pub total_cost: i64,
    pub paid: bool,
}

/// Kicks off the checkout saga of an order.
#[async_trait]
pub trait CheckoutInitiator: Send + Sync {
    /// Publishes the saga's first message. Returns once it is sent; the
    /// outcome arrives later through the completion notifier.
    async fn start_checkout(&self, order_id: &str) -> Result<()>;
}

#[async_trait]
impl<T: CheckoutInitiator + ?Sized> CheckoutInitiator for Arc<T> {
    async fn start_checkout(&self, order_id: &str) -> Result<()> {
        (**self).start_checkout(order_id).await
    }
}

/// Orders sharded by order id.
pub struct OrderService {
    orders: ShardedTable<EntityId, Order>,
    transport: Arc<dyn Transport>,
}

impl OrderService {
    pub fn new(partitions: usize, transport: Arc<dyn Transport>) -> std::result::Result<Self, ShardError> {
        Ok(Self {
            orders: ShardedTable::new("order", partitions)?,
            transport,
        })
    }

    /// Opens an empty, unpaid order for `user_id`.
    pub async fn create_order(&self, user_id: EntityId) -> EntityId {
        let id = EntityId::new();
        let order = Order {
            user_id,
            items: Vec::new(),
            total_cost: 0,
            paid: false,
        };
        self.orders.upsert(id, order).await;
        id
    }

    /// Adds one unit of an item at `price` to the order.
    pub async fn add_item(
        &self,
        order_id: EntityId,
        item_id: EntityId,
        price: i64,
    ) -> std::result::Result<(), ParticipantError> {
        self.orders
            .update(&order_id, |order| {
                order.items.push(item_id);
                order.total_cost += price;
                Ok(())
            })
            .await
    }

    pub async fn order(&self, order_id: EntityId) -> Option<Order> {
        self.orders.get(&order_id).await
    }

    /// Sets the paid flag of an order.
    pub async fn set_paid(
        &self,
        order_id: EntityId,
        paid: bool,
    ) -> std::result::Result<(), ParticipantError> {
        self.orders
            .update(&order_id, |order| {
                order.paid = paid;
                Ok(())
            })
            .await
    }

    /// The saga payload describing an order.
    pub async fn payload_of(&self, order_id: &str) -> std::result::Result<OrderPayload, ParticipantError> {
        let id = EntityId::parse(order_id)
            .map_err(|_| ParticipantError::MalformedId(order_id.to_string()))?;
        let order = self
            .order(id)
            .await
            .ok_or_else(|| ParticipantError::not_found("order", order_id))?;

        Ok(OrderPayload {
            order_id: order_id.to_string(),
            user_id: order.user_id.to_string(),
            items: order.items.iter().map(ToString::to_string).collect(),
            total_cost: order.total_cost,
            paid: order.paid,
        })
    }
}

#[async_trait]
impl CheckoutInitiator for OrderService {
    #[tracing::instrument(skip(self))]
    async fn start_checkout(&self, order_id: &str) -> Result<()> {
        let payload = self.payload_of(order_id).await?;
        self.transport
            .publish(Topic::ack(Service::Order), &SagaMessage::start_checkout(payload))
            .await?;
        tracing::info!("checkout saga requested");
        Ok(())
    }
}

#[async_trait]
impl LocalTransaction for OrderService {
    fn service(&self) -> Service {
        Service::Order
    }

    fn owns(&self, event: MessageEvent) -> bool {
        event == MessageEvent::UpdateOrder
    }

    async fn apply(
        &self,
        event: MessageEvent,
        payload: &mut OrderPayload,
    ) -> std::result::Result<(), ParticipantError> {
        if event != MessageEvent::UpdateOrder {
            return Err(ParticipantError::Unsupported(MessageName::new(
                MessageType::Start,
                event,
            )));
        }
        let order_id = EntityId::parse(&payload.order_id)
            .map_err(|_| ParticipantError::MalformedId(payload.order_id.clone()))?;
        self.set_paid(order_id, true).await?;
        payload.paid = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SagaError;
    use common::SagaId;
    use messaging::InMemoryTransport;

    async fn setup() -> (OrderService, Arc<InMemoryTransport>) {
        let transport = Arc::new(InMemoryTransport::new());
        (OrderService::new(2, transport.clone()).unwrap(), transport)
    }

    #[tokio::test]
    async fn test_add_items_accumulates_cost() {
        let (orders, _) = setup().await;
        let user = EntityId::new();
        let order = orders.create_order(user).await;
        let item = EntityId::new();

        orders.add_item(order, item, 7).await.unwrap();
        orders.add_item(order, item, 7).await.unwrap();

        let stored = orders.order(order).await.unwrap();
        assert_eq!(stored.items, vec![item, item]);
        assert_eq!(stored.total_cost, 14);
        assert!(!stored.paid);
    }

    #[tokio::test]
    async fn test_start_checkout_publishes_unassigned_start() {
        let (orders, transport) = setup().await;
        let user = EntityId::new();
        let order = orders.create_order(user).await;
        let item = EntityId::new();
        orders.add_item(order, item, 3).await.unwrap();

        orders.start_checkout(&order.to_string()).await.unwrap();

        let sent = transport
            .published(Topic::ack(Service::Order))
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name, MessageName::START_CHECKOUT_SAGA);
        assert_eq!(sent[0].saga_id, SagaId::UNASSIGNED);
        assert_eq!(sent[0].payload.user_id, user.to_string());
        assert_eq!(sent[0].payload.items, vec![item.to_string()]);
        assert_eq!(sent[0].payload.total_cost, 3);
    }

    #[tokio::test]
    async fn test_start_checkout_of_unknown_order_fails() {
        let (orders, transport) = setup().await;

        let result = orders.start_checkout("garbage").await;
        assert!(matches!(
            result,
            Err(SagaError::Checkout(ParticipantError::MalformedId(_)))
        ));
        let result = orders.start_checkout(&EntityId::new().to_string()).await;
        assert!(matches!(
            result,
            Err(SagaError::Checkout(ParticipantError::NotFound { .. }))
        ));
        assert!(
            transport
                .published(Topic::ack(Service::Order))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_update_order_marks_paid() {
        let (orders, _) = setup().await;
        let order = orders.create_order(EntityId::new()).await;
        let mut payload = orders.payload_of(&order.to_string()).await.unwrap();

        orders
            .apply(MessageEvent::UpdateOrder, &mut payload)
            .await
            .unwrap();
        assert!(payload.paid);
        assert!(orders.order(order).await.unwrap().paid);
    }
}
