//! Saga message vocabulary.
//!
//! A message name is `<TYPE>-<EVENT>`, e.g. `START-SUBTRACT-STOCK`. Both parts
//! come from closed vocabularies with stable integer codes; the codes are what
//! the saga log stores.

use common::SagaId;
use serde::{Deserialize, Serialize};

use crate::error::{MessagingError, Result};

/// The phase a message announces for its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Instruction to perform a step.
    Start,
    /// Acknowledgement that a step completed.
    End,
    /// A participant failed its step.
    Abort,
}

impl MessageType {
    const ALL: [MessageType; 3] = [MessageType::Start, MessageType::End, MessageType::Abort];

    /// Returns the wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Start => "START",
            MessageType::End => "END",
            MessageType::Abort => "ABORT",
        }
    }

    /// Returns the interned code stored in the saga log.
    pub fn code(&self) -> i64 {
        match self {
            MessageType::Start => 1,
            MessageType::End => 2,
            MessageType::Abort => 3,
        }
    }

    /// Looks up a type by its interned code.
    pub fn from_code(code: i64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or(MessagingError::UnknownCode { kind: "type", code })
    }
}

impl std::str::FromStr for MessageType {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MessagingError::UnknownType(s.to_string()))
    }
}

/// The saga step a message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageEvent {
    MakePayment,
    CancelPayment,
    CheckoutSaga,
    CancelSaga,
    SubtractStock,
    ReaddStock,
    UpdateOrder,
}

impl MessageEvent {
    const ALL: [MessageEvent; 7] = [
        MessageEvent::MakePayment,
        MessageEvent::CancelPayment,
        MessageEvent::CheckoutSaga,
        MessageEvent::CancelSaga,
        MessageEvent::SubtractStock,
        MessageEvent::ReaddStock,
        MessageEvent::UpdateOrder,
    ];

    /// Returns the wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageEvent::MakePayment => "MAKE-PAYMENT",
            MessageEvent::CancelPayment => "CANCEL-PAYMENT",
            MessageEvent::CheckoutSaga => "CHECKOUT-SAGA",
            MessageEvent::CancelSaga => "CANCEL-SAGA",
            MessageEvent::SubtractStock => "SUBTRACT-STOCK",
            MessageEvent::ReaddStock => "READD-STOCK",
            MessageEvent::UpdateOrder => "UPDATE-ORDER",
        }
    }

    /// Returns the interned code stored in the saga log.
    pub fn code(&self) -> i64 {
        match self {
            MessageEvent::MakePayment => 1,
            MessageEvent::CancelPayment => 2,
            MessageEvent::CheckoutSaga => 3,
            MessageEvent::CancelSaga => 4,
            MessageEvent::SubtractStock => 5,
            MessageEvent::ReaddStock => 6,
            MessageEvent::UpdateOrder => 7,
        }
    }

    /// Looks up an event by its interned code.
    pub fn from_code(code: i64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.code() == code)
            .ok_or(MessagingError::UnknownCode { kind: "event", code })
    }
}

impl std::str::FromStr for MessageEvent {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| MessagingError::UnknownEvent(s.to_string()))
    }
}

/// A full message name such as `END-MAKE-PAYMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageName {
    kind: MessageType,
    event: MessageEvent,
}

impl MessageName {
    pub const START_CHECKOUT_SAGA: Self = Self::new(MessageType::Start, MessageEvent::CheckoutSaga);
    pub const END_CHECKOUT_SAGA: Self = Self::new(MessageType::End, MessageEvent::CheckoutSaga);
    pub const ABORT_CHECKOUT_SAGA: Self = Self::new(MessageType::Abort, MessageEvent::CheckoutSaga);
    pub const START_SUBTRACT_STOCK: Self = Self::new(MessageType::Start, MessageEvent::SubtractStock);
    pub const END_SUBTRACT_STOCK: Self = Self::new(MessageType::End, MessageEvent::SubtractStock);
    pub const START_READD_STOCK: Self = Self::new(MessageType::Start, MessageEvent::ReaddStock);
    pub const END_READD_STOCK: Self = Self::new(MessageType::End, MessageEvent::ReaddStock);
    pub const START_MAKE_PAYMENT: Self = Self::new(MessageType::Start, MessageEvent::MakePayment);
    pub const END_MAKE_PAYMENT: Self = Self::new(MessageType::End, MessageEvent::MakePayment);
    pub const START_CANCEL_PAYMENT: Self =
        Self::new(MessageType::Start, MessageEvent::CancelPayment);
    pub const END_CANCEL_PAYMENT: Self = Self::new(MessageType::End, MessageEvent::CancelPayment);
    pub const START_UPDATE_ORDER: Self = Self::new(MessageType::Start, MessageEvent::UpdateOrder);
    pub const END_UPDATE_ORDER: Self = Self::new(MessageType::End, MessageEvent::UpdateOrder);

    /// Creates a name from its two parts.
    pub const fn new(kind: MessageType, event: MessageEvent) -> Self {
        Self { kind, event }
    }

    /// Rebuilds a name from interned log codes.
    pub fn from_codes(type_code: i64, event_code: i64) -> Result<Self> {
        Ok(Self::new(
            MessageType::from_code(type_code)?,
            MessageEvent::from_code(event_code)?,
        ))
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn event(&self) -> MessageEvent {
        self.event
    }

    /// Returns the same event with a different type.
    pub fn with_kind(&self, kind: MessageType) -> Self {
        Self::new(kind, self.event)
    }
}

impl std::fmt::Display for MessageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.kind.as_str(), self.event.as_str())
    }
}

impl std::str::FromStr for MessageName {
    type Err = MessagingError;

    /// Splits at the first `-`; the remainder is the event, which may itself
    /// contain hyphens.
    fn from_str(s: &str) -> Result<Self> {
        let (kind, event) = s
            .split_once('-')
            .ok_or_else(|| MessagingError::Malformed(format!("message name '{s}'")))?;
        Ok(Self::new(kind.parse()?, event.parse()?))
    }
}

/// The order working set carried end-to-end through a saga.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderPayload {
    pub order_id: String,
    pub user_id: String,
    pub items: Vec<String>,
    pub total_cost: i64,
    pub paid: bool,
}

impl OrderPayload {
    /// Serializes the payload to its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses the JSON wire form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The unit of communication between the orchestrator and participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaMessage {
    pub name: MessageName,
    pub saga_id: SagaId,
    pub payload: OrderPayload,
}

impl SagaMessage {
    /// Creates a message.
    pub fn new(name: MessageName, saga_id: SagaId, payload: OrderPayload) -> Self {
        Self {
            name,
            saga_id,
            payload,
        }
    }

    /// The first message of a checkout, not yet assigned to a saga.
    pub fn start_checkout(payload: OrderPayload) -> Self {
        Self::new(MessageName::START_CHECKOUT_SAGA, SagaId::UNASSIGNED, payload)
    }

    /// The same saga and payload under another name.
    pub fn with_name(self, name: MessageName) -> Self {
        Self { name, ..self }
    }

    /// The acknowledgement a participant sends after completing this step.
    pub fn completed(&self) -> Self {
        Self::new(
            self.name.with_kind(MessageType::End),
            self.saga_id,
            self.payload.clone(),
        )
    }

    /// The notification a participant sends after failing this step.
    pub fn aborted(&self) -> Self {
        Self::new(
            MessageName::ABORT_CHECKOUT_SAGA,
            self.saga_id,
            self.payload.clone(),
        )
    }
}
