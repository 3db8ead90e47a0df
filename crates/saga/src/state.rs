//! Saga state machine, derived from the saga log.

use messaging::MessageName;
use serde::{Deserialize, Serialize};

use crate::action::{RoutingTables, SagaOutcome};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          └──► Compensating ──► Failed
/// ```
/// A saga whose in-flight step aborts before anything was committed goes
/// straight from `Running` to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Nothing has been logged for the saga.
    #[default]
    NotStarted,

    /// Forward steps are being executed.
    Running,

    /// A participant aborted and compensating steps are in progress.
    Compensating,

    /// The saga ended successfully (terminal state).
    Completed,

    /// The saga ended after a failure (terminal state).
    Failed,
}

impl SagaState {
    /// Derives the state from a saga's logged message names, oldest first.
    ///
    /// The terminal state follows the outcome of the action that emitted
    /// `END-CHECKOUT-SAGA`.
    pub fn derive(tables: &RoutingTables, names: &[MessageName]) -> Self {
        let Some(&last) = names.last() else {
            return SagaState::NotStarted;
        };

        if last == MessageName::END_CHECKOUT_SAGA && names.len() >= 2 {
            let received = names[names.len() - 2];
            let in_flight = names.len().checked_sub(3).map(|i| names[i]);
            return match tables
                .resolve(received, in_flight)
                .and_then(|action| action.outcome())
            {
                Some(SagaOutcome::Success) => SagaState::Completed,
                _ => SagaState::Failed,
            };
        }

        if names.contains(&MessageName::ABORT_CHECKOUT_SAGA) {
            SagaState::Compensating
        } else {
            SagaState::Running
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// The outcome of a terminal state.
    pub fn outcome(&self) -> Option<SagaOutcome> {
        match self {
            SagaState::Completed => Some(SagaOutcome::Success),
            SagaState::Failed => Some(SagaOutcome::Failure),
            _ => None,
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
