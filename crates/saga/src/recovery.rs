//! Startup sweep resuming sagas interrupted by a restart.

use messaging::{MessageName, SagaMessage, Transport};
use saga_log::{SagaLogEntry, SagaLogStore};
use serde::Serialize;

use crate::error::Result;
use crate::orchestrator::Orchestrator;

/// What one recovery sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Sagas with at least one log entry.
    pub scanned: usize,
    /// Already finished; left alone.
    pub finished: usize,
    /// Logged instructions published again.
    pub resent: usize,
    /// Logged replies whose next step was never logged, now advanced.
    pub redriven: usize,
    /// Sagas whose log gives no way forward.
    pub stuck: usize,
}

/// Resumes every unfinished saga from its log.
///
/// A saga whose latest entry is an instruction had it logged but possibly
/// never delivered, so it is published again; participants see it at least
/// once. A saga whose latest entry is a received reply crashed before its
/// next step was logged, so that step is derived and dispatched now without
/// logging the reply a second time.
pub struct Recovery<'a, L, T: ?Sized> {
    orchestrator: &'a Orchestrator<L>,
    transport: &'a T,
}

impl<'a, L, T> Recovery<'a, L, T>
where
    L: SagaLogStore,
    T: Transport + ?Sized,
{
    pub fn new(orchestrator: &'a Orchestrator<L>, transport: &'a T) -> Self {
        Self {
            orchestrator,
            transport,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for latest in self.orchestrator.log().latest_entries().await? {
            report.scanned += 1;
            match self.resume(&latest).await {
                Ok(Resumed::Finished) => report.finished += 1,
                Ok(Resumed::Resent) => report.resent += 1,
                Ok(Resumed::Redriven) => report.redriven += 1,
                Ok(Resumed::Stuck) => report.stuck += 1,
                Err(e) => {
                    report.stuck += 1;
                    tracing::error!(saga_id = %latest.saga_id, error = %e, "failed to resume saga");
                }
            }
        }

        tracing::info!(?report, "recovery sweep complete");
        metrics::counter!("saga_recovered_total").increment((report.resent + report.redriven) as u64);
        Ok(report)
    }

    async fn resume(&self, latest: &SagaLogEntry) -> Result<Resumed> {
        let message = match latest.to_message() {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(saga_id = %latest.saga_id, error = %e, "latest entry does not decode");
                return Ok(Resumed::Stuck);
            }
        };
        if message.name == MessageName::END_CHECKOUT_SAGA {
            return Ok(Resumed::Finished);
        }

        let tables = self.orchestrator.tables();
        if let Some(topic) = tables.topic_for(message.name) {
            self.transport.publish(topic, &message).await?;
            tracing::info!(saga_id = %message.saga_id, name = %message.name, %topic, "instruction resent");
            return Ok(Resumed::Resent);
        }

        let in_flight = self.in_flight_before(&message).await?;
        let Some(action) = tables.resolve(message.name, in_flight).copied() else {
            tracing::warn!(saga_id = %message.saga_id, name = %message.name, "no way forward from latest entry");
            return Ok(Resumed::Stuck);
        };

        let reply = self.orchestrator.advance(&message, action).await?;
        if let Some(topic) = reply.topic {
            self.transport.publish(topic, &reply.message).await?;
        }
        tracing::info!(saga_id = %message.saga_id, next = %reply.message.name, "saga re-driven");
        Ok(Resumed::Redriven)
    }

    /// For an abort, the instruction logged just before it.
    async fn in_flight_before(&self, message: &SagaMessage) -> Result<Option<MessageName>> {
        if message.name != MessageName::ABORT_CHECKOUT_SAGA {
            return Ok(None);
        }
        let entries = self.orchestrator.log().entries(message.saga_id).await?;
        let previous = entries.iter().rev().nth(1);
        Ok(previous.and_then(|entry| entry.name().ok()))
    }
}

enum Resumed {
    Finished,
    Resent,
    Redriven,
    Stuck,
}
