//! Payment participant: charges and refunds users.

use async_trait::async_trait;
use common::{EntityId, HashShardRouter, Partition, ShardError, ShardRouter};
use messaging::{MessageEvent, MessageName, MessageType, OrderPayload, Service};
use serde::{Deserialize, Serialize};

use super::LocalTransaction;
use super::table::{RowKey, ShardedTable};
use crate::error::ParticipantError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub credit: i64,
}

/// The payment of one order by one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: i64,
    pub paid: bool,
}

/// Payments are keyed by user and order jointly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaymentKey {
    pub user_id: EntityId,
    pub order_id: EntityId,
}

impl RowKey for PaymentKey {
    fn route<'a, C>(&self, router: &'a HashShardRouter<C>) -> &'a Partition<C> {
        router.route_pair(&self.user_id, &self.order_id)
    }
}

impl std::fmt::Display for PaymentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.order_id)
    }
}

/// User credit sharded by user id; payments sharded by (user, order).
pub struct PaymentService {
    users: ShardedTable<EntityId, User>,
    payments: ShardedTable<PaymentKey, Payment>,
}

impl PaymentService {
    pub fn new(partitions: usize) -> Result<Self, ShardError> {
        Ok(Self {
            users: ShardedTable::new("user", partitions)?,
            payments: ShardedTable::new("payment", partitions)?,
        })
    }

    pub async fn create_user(&self) -> EntityId {
        let id = EntityId::new();
        self.users.upsert(id, User { credit: 0 }).await;
        id
    }

    pub async fn add_funds(&self, user_id: EntityId, amount: i64) -> Result<i64, ParticipantError> {
        self.users
            .update(&user_id, |user| {
                user.credit += amount;
                Ok(user.credit)
            })
            .await
    }

    pub async fn credit_of(&self, user_id: EntityId) -> Option<i64> {
        self.users.get(&user_id).await.map(|user| user.credit)
    }

    pub async fn payment(&self, user_id: EntityId, order_id: EntityId) -> Option<Payment> {
        self.payments.get(&PaymentKey { user_id, order_id }).await
    }

    /// Debits `amount` from the user and records the order as paid. Paying
    /// an already paid order charges nothing.
    #[tracing::instrument(skip(self))]
    pub async fn pay(
        &self,
        user_id: EntityId,
        order_id: EntityId,
        amount: i64,
    ) -> Result<(), ParticipantError> {
        let key = PaymentKey { user_id, order_id };
        if self.payments.get(&key).await.is_some_and(|p| p.paid) {
            tracing::debug!("order already paid");
            return Ok(());
        }

        self.users
            .update(&user_id, |user| {
                if user.credit < amount {
                    return Err(ParticipantError::InsufficientCredit {
                        user_id,
                        required: amount,
                        available: user.credit,
                    });
                }
                user.credit -= amount;
                Ok(())
            })
            .await?;

        self.payments.upsert(key, Payment { amount, paid: true }).await;
        Ok(())
    }

    /// Refunds a paid order and marks its payment unpaid. Cancelling an
    /// unpaid payment changes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, user_id: EntityId, order_id: EntityId) -> Result<(), ParticipantError> {
        let key = PaymentKey { user_id, order_id };
        let refund = self
            .payments
            .update(&key, |payment| {
                let refund = if payment.paid { payment.amount } else { 0 };
                payment.paid = false;
                Ok(refund)
            })
            .await?;

        if refund > 0 {
            self.add_funds(user_id, refund).await?;
        }
        Ok(())
    }
}

fn parse_id(raw: &str) -> Result<EntityId, ParticipantError> {
    EntityId::parse(raw).map_err(|_| ParticipantError::MalformedId(raw.to_string()))
}

#[async_trait]
impl LocalTransaction for PaymentService {
    fn service(&self) -> Service {
        Service::Payment
    }

    fn owns(&self, event: MessageEvent) -> bool {
        matches!(event, MessageEvent::MakePayment | MessageEvent::CancelPayment)
    }

    async fn apply(
        &self,
        event: MessageEvent,
        payload: &mut OrderPayload,
    ) -> Result<(), ParticipantError> {
        let user_id = parse_id(&payload.user_id)?;
        let order_id = parse_id(&payload.order_id)?;
        match event {
            MessageEvent::MakePayment => self.pay(user_id, order_id, payload.total_cost).await,
            MessageEvent::CancelPayment => self.cancel(user_id, order_id).await,
            other => Err(ParticipantError::Unsupported(MessageName::new(
                MessageType::Start,
                other,
            ))),
        }
    }
}
