//! Participant step handlers.
//!
//! Each service performs one local transaction per `START-<EVENT>` it owns
//! and answers on its `-ack` topic with `END-<EVENT>` or
//! `ABORT-CHECKOUT-SAGA`, keeping the saga id.

pub mod order;
pub mod payment;
pub mod stock;
pub mod table;

use std::sync::Arc;

use async_trait::async_trait;
use messaging::{
    MessageEvent, MessageHandler, MessageType, OrderPayload, Reply, SagaMessage, Service, Topic,
};

use crate::error::ParticipantError;

pub use order::{CheckoutInitiator, Order, OrderService};
pub use payment::{Payment, PaymentKey, PaymentService, User};
pub use stock::{Item, StockService};
pub use table::{RowKey, ShardedTable};

/// One service's local transactions.
#[async_trait]
pub trait LocalTransaction: Send + Sync {
    fn service(&self) -> Service;

    /// Whether this service performs `event`.
    fn owns(&self, event: MessageEvent) -> bool;

    /// Runs the local transaction for `event`. On success `payload` holds
    /// what travels on with the saga; on failure nothing was committed.
    async fn apply(
        &self,
        event: MessageEvent,
        payload: &mut OrderPayload,
    ) -> Result<(), ParticipantError>;
}

/// Adapts a [`LocalTransaction`] to the saga message protocol.
pub struct Participant<T: ?Sized> {
    transaction: Arc<T>,
}

impl<T: LocalTransaction + ?Sized> Participant<T> {
    pub fn new(transaction: Arc<T>) -> Self {
        Self { transaction }
    }

    /// The topic this participant consumes.
    pub fn topic(&self) -> Topic {
        Topic::syn(self.transaction.service())
    }
}

#[async_trait]
impl<T: LocalTransaction + ?Sized + 'static> MessageHandler for Participant<T> {
    #[tracing::instrument(
        skip(self, message),
        fields(service = self.transaction.service().as_str(), name = %message.name, saga_id = %message.saga_id)
    )]
    async fn handle(&self, message: SagaMessage) -> Option<Reply> {
        let event = message.name.event();
        if message.name.kind() != MessageType::Start || !self.transaction.owns(event) {
            tracing::debug!("not a step of this service");
            return None;
        }

        let service = self.transaction.service();
        let mut payload = message.payload.clone();
        let reply = match self.transaction.apply(event, &mut payload).await {
            Ok(()) => SagaMessage {
                payload,
                ..message.completed()
            },
            Err(e) => {
                metrics::counter!("participant_step_failures_total", "service" => service.as_str())
                    .increment(1);
                tracing::warn!(error = %e, "local transaction failed, aborting saga");
                message.aborted()
            }
        };
        Some(Reply::to(Topic::ack(service), reply))
    }
}
