//! The saga orchestrator: consumes participant replies, logs each step and
//! decides the next one.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use common::SagaId;
use messaging::{MessageHandler, MessageName, Reply, SagaMessage};
use saga_log::{SagaLogStore, SagaLogStoreExt};

use crate::action::{Action, Route, RoutingTables};
use crate::error::Result;
use crate::notifier::CompletionNotifier;

/// Drives checkout sagas from the participants' `-ack` topics.
///
/// Every routable message is written to the saga log together with the
/// instruction it produces, before that instruction is sent. Calls for
/// different sagas may run concurrently; one saga only ever has a single
/// step in flight.
pub struct Orchestrator<L> {
    log: L,
    tables: RoutingTables,
    notifier: Arc<dyn CompletionNotifier>,
}

impl<L: SagaLogStore> Orchestrator<L> {
    /// Creates an orchestrator over `log`, routing with `tables` and
    /// reporting terminal outcomes to `notifier`.
    pub fn new(log: L, tables: RoutingTables, notifier: Arc<dyn CompletionNotifier>) -> Self {
        Self {
            log,
            tables,
            notifier,
        }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn tables(&self) -> &RoutingTables {
        &self.tables
    }

    /// Processes one consumed message.
    ///
    /// Returns the instruction to publish, a terminal reply that must not be
    /// forwarded, or `None` when the message triggers nothing. Storage
    /// failures are returned to the caller; nothing is retried here.
    #[tracing::instrument(
        skip(self, message),
        fields(name = %message.name, saga_id = %message.saga_id, order_id = %message.payload.order_id)
    )]
    pub async fn handle(&self, mut message: SagaMessage) -> Result<Option<Reply>> {
        let started = Instant::now();
        metrics::counter!("saga_messages_handled_total", "name" => message.name.to_string())
            .increment(1);

        let in_flight = if message.name == MessageName::ABORT_CHECKOUT_SAGA {
            self.in_flight_step(message.saga_id).await?
        } else {
            None
        };

        let Some(action) = self.tables.resolve(message.name, in_flight).copied() else {
            unroutable(&message, in_flight);
            return Ok(None);
        };

        if message.saga_id.is_unassigned() {
            let saga = self.log.create_saga().await?;
            message.saga_id = saga.id;
            tracing::Span::current().record("saga_id", tracing::field::display(saga.id));
            metrics::counter!("sagas_started_total").increment(1);
            tracing::info!(saga_id = %saga.id, "saga started");
        }

        self.log.append_message(&message).await?;
        let reply = self.advance(&message, action).await?;

        metrics::histogram!("saga_step_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(Some(reply))
    }

    /// Logs the instruction `action` derives from `received` and, on a
    /// terminal action, releases the waiting checkout. `received` must
    /// already be in the log.
    pub(crate) async fn advance(&self, received: &SagaMessage, action: Action) -> Result<Reply> {
        let outgoing = received.clone().with_name(action.next);
        self.log.append_message(&outgoing).await?;

        match action.route {
            Route::Dispatch(topic) => {
                tracing::debug!(next = %outgoing.name, %topic, "dispatching step");
                Ok(Reply::to(topic, outgoing))
            }
            Route::Terminal(outcome) => {
                metrics::counter!("saga_completed_total", "outcome" => outcome.as_str())
                    .increment(1);
                tracing::info!(saga_id = %outgoing.saga_id, %outcome, "saga finished");

                let order_id = &outgoing.payload.order_id;
                if let Err(e) = self.notifier.release(order_id, outcome).await {
                    tracing::error!(%order_id, %outcome, error = %e, "failed to release checkout");
                }
                Ok(Reply::terminal(outgoing))
            }
        }
    }

    /// Name of the latest logged message of `saga_id`: the step a
    /// participant was running when it aborted.
    async fn in_flight_step(&self, saga_id: SagaId) -> Result<Option<MessageName>> {
        if saga_id.is_unassigned() {
            return Ok(None);
        }
        let Some(entry) = self.log.latest_entry(saga_id).await? else {
            return Ok(None);
        };
        match entry.name() {
            Ok(name) => Ok(Some(name)),
            Err(e) => {
                tracing::warn!(%saga_id, error = %e, "latest log entry does not decode");
                Ok(None)
            }
        }
    }
}

fn unroutable(message: &SagaMessage, in_flight: Option<MessageName>) {
    metrics::counter!("saga_unroutable_messages_total", "name" => message.name.to_string())
        .increment(1);
    match in_flight {
        Some(step) => tracing::warn!(in_flight = %step, "no compensation for in-flight step"),
        None => tracing::warn!("no transition for message"),
    }
}

#[async_trait]
impl<L: SagaLogStore + 'static> MessageHandler for Orchestrator<L> {
    async fn handle(&self, message: SagaMessage) -> Option<Reply> {
        let name = message.name;
        let saga_id = message.saga_id;
        match Orchestrator::handle(self, message).await {
            Ok(reply) => reply,
            Err(e) => {
                metrics::counter!("saga_step_errors_total").increment(1);
                tracing::error!(%name, %saga_id, error = %e, "failed to process saga message");
                None
            }
        }
    }
}
