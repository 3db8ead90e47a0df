//! Checkout saga orchestration.
//!
//! The [`Orchestrator`] consumes participant replies from the `-ack` topics,
//! records every step in the saga log and routes the saga with injected
//! [`RoutingTables`]:
//!
//! 1. Subtract stock
//! 2. Make payment
//! 3. Update order
//!
//! If a step aborts, the step that was in flight selects the compensation
//! path. Terminal steps are reported through a [`CompletionNotifier`].
//! The [`participants`] module holds the stock, payment and order step
//! handlers.

pub mod action;
pub mod error;
pub mod notifier;
pub mod orchestrator;
pub mod participants;
pub mod recovery;
pub mod state;

pub use action::{Action, Route, RoutingTables, SagaOutcome, TransitionTable};
pub use error::{ParticipantError, Result, SagaError};
pub use notifier::{CompletionNotifier, HttpReleaseNotifier};
pub use orchestrator::Orchestrator;
pub use participants::{
    CheckoutInitiator, LocalTransaction, OrderService, Participant, PaymentService, StockService,
};
pub use recovery::{Recovery, RecoveryReport};
pub use state::SagaState;
