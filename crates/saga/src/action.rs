//! Static transition tables driving the checkout saga.

use std::collections::HashMap;

use messaging::{MessageName, MessageType, Service, Topic};
use serde::{Deserialize, Serialize};

/// How a finished saga ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaOutcome {
    Success,
    Failure,
}

impl SagaOutcome {
    /// HTTP status delivered to the blocked checkout caller.
    pub fn status_code(&self) -> u16 {
        match self {
            SagaOutcome::Success => 200,
            SagaOutcome::Failure => 400,
        }
    }

    /// Interprets a released status code; any 2xx is a success.
    pub fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            SagaOutcome::Success
        } else {
            SagaOutcome::Failure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaOutcome::Success => "success",
            SagaOutcome::Failure => "failure",
        }
    }
}

impl std::fmt::Display for SagaOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the next message of a saga goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Publish to a participant's instruction topic.
    Dispatch(Topic),
    /// End the saga; nothing is published.
    Terminal(SagaOutcome),
}

/// A transition: the message to emit next and where it goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub next: MessageName,
    pub route: Route,
}

impl Action {
    /// Sends `next` to `service`'s instruction topic.
    pub fn dispatch(next: MessageName, service: Service) -> Self {
        Self {
            next,
            route: Route::Dispatch(Topic::syn(service)),
        }
    }

    /// Ends the saga with `outcome`.
    pub fn terminal(outcome: SagaOutcome) -> Self {
        Self {
            next: MessageName::END_CHECKOUT_SAGA,
            route: Route::Terminal(outcome),
        }
    }

    pub fn topic(&self) -> Option<Topic> {
        match self.route {
            Route::Dispatch(topic) => Some(topic),
            Route::Terminal(_) => None,
        }
    }

    pub fn outcome(&self) -> Option<SagaOutcome> {
        match self.route {
            Route::Dispatch(_) => None,
            Route::Terminal(outcome) => Some(outcome),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.route, Route::Terminal(_))
    }
}

/// A lookup table from a message name to the action it triggers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    actions: HashMap<MessageName, Action>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a transition, replacing any previous one for `from`.
    pub fn with(mut self, from: MessageName, action: Action) -> Self {
        self.actions.insert(from, action);
        self
    }

    pub fn get(&self, from: &MessageName) -> Option<&Action> {
        self.actions.get(from)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// The forward and compensation tables of one saga definition.
///
/// Forward transitions are keyed by the acknowledgement just received;
/// compensation transitions by the instruction that was in flight when a
/// participant aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTables {
    forward: TransitionTable,
    compensation: TransitionTable,
}

impl RoutingTables {
    pub fn new(forward: TransitionTable, compensation: TransitionTable) -> Self {
        Self {
            forward,
            compensation,
        }
    }

    /// The checkout saga: subtract stock, take payment, mark the order paid.
    pub fn checkout() -> Self {
        let forward = TransitionTable::new()
            .with(
                MessageName::START_CHECKOUT_SAGA,
                Action::dispatch(MessageName::START_SUBTRACT_STOCK, Service::Stock),
            )
            .with(
                MessageName::END_SUBTRACT_STOCK,
                Action::dispatch(MessageName::START_MAKE_PAYMENT, Service::Payment),
            )
            .with(
                MessageName::END_MAKE_PAYMENT,
                Action::dispatch(MessageName::START_UPDATE_ORDER, Service::Order),
            )
            .with(
                MessageName::END_UPDATE_ORDER,
                Action::terminal(SagaOutcome::Success),
            )
            .with(
                MessageName::END_CANCEL_PAYMENT,
                Action::dispatch(MessageName::START_READD_STOCK, Service::Stock),
            )
            .with(
                MessageName::END_READD_STOCK,
                Action::terminal(SagaOutcome::Failure),
            );

        let compensation = TransitionTable::new()
            .with(
                MessageName::START_SUBTRACT_STOCK,
                Action::terminal(SagaOutcome::Failure),
            )
            .with(
                MessageName::START_MAKE_PAYMENT,
                Action::dispatch(MessageName::START_READD_STOCK, Service::Stock),
            )
            .with(
                MessageName::START_UPDATE_ORDER,
                Action::dispatch(MessageName::START_CANCEL_PAYMENT, Service::Payment),
            );

        Self::new(forward, compensation)
    }

    pub fn forward(&self) -> &TransitionTable {
        &self.forward
    }

    pub fn compensation(&self) -> &TransitionTable {
        &self.compensation
    }

    /// The action `incoming` triggers. An abort is resolved against
    /// `in_flight`, the latest logged message of the saga.
    pub fn resolve(
        &self,
        incoming: MessageName,
        in_flight: Option<MessageName>,
    ) -> Option<&Action> {
        if incoming == MessageName::ABORT_CHECKOUT_SAGA {
            self.compensation.get(&in_flight?)
        } else {
            self.forward.get(&incoming)
        }
    }

    /// The topic an instruction is dispatched to, if any table emits it.
    pub fn topic_for(&self, instruction: MessageName) -> Option<Topic> {
        self.forward
            .actions
            .values()
            .chain(self.compensation.actions.values())
            .find(|action| action.next == instruction)
            .and_then(Action::topic)
    }

    /// Whether `names`, a saga's recorded messages oldest first, is a walk
    /// of these tables.
    ///
    /// The log holds (received, emitted) pairs and opens with the saga start.
    /// Each emitted name must be the action of its received name, and each
    /// received name after the first must answer the previous instruction:
    /// its `END-` form or an abort.
    /// A trailing unpaired entry is a received message whose instruction was
    /// never logged.
    pub fn is_valid_walk(&self, names: &[MessageName]) -> bool {
        let mut emitted: Option<MessageName> = None;

        for pair in names.chunks(2) {
            let received = pair[0];
            if let Some(previous) = emitted {
                if previous == MessageName::END_CHECKOUT_SAGA {
                    return false;
                }
                let answers = received == MessageName::ABORT_CHECKOUT_SAGA
                    || (previous.kind() == MessageType::Start
                        && received == previous.with_kind(MessageType::End));
                if !answers {
                    return false;
                }
            } else if received != MessageName::START_CHECKOUT_SAGA {
                return false;
            }

            let Some(&next) = pair.get(1) else {
                // Unpaired tail: the received message must still be routable.
                return self.resolve(received, emitted).is_some();
            };
            match self.resolve(received, emitted) {
                Some(action) if action.next == next => emitted = Some(next),
                _ => return false,
            }
        }
        true
    }
}

impl Default for RoutingTables {
    fn default() -> Self {
        Self::checkout()
    }
}
