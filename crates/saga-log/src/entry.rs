use chrono::{DateTime, Utc};
use common::SagaId;
use messaging::{MessageName, OrderPayload, SagaMessage};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaLogError};

/// Root record of a saga, created once per checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaRecord {
    pub id: SagaId,
    pub created_at: DateTime<Utc>,
}

/// An entry about to be appended. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub saga_id: SagaId,
    /// Interned [`messaging::MessageType`] code.
    pub message_type: i64,
    /// Interned [`messaging::MessageEvent`] code.
    pub message_event: i64,
    /// The order payload as JSON.
    pub payload: String,
}

impl NewLogEntry {
    /// Builds the entry recording `message`.
    pub fn from_message(message: &SagaMessage) -> Result<Self> {
        if message.saga_id.is_unassigned() {
            return Err(SagaLogError::UnassignedSaga);
        }
        Ok(Self {
            saga_id: message.saga_id,
            message_type: message.name.kind().code(),
            message_event: message.name.event().code(),
            payload: message.payload.to_json()?,
        })
    }
}

/// One processed message in the saga log. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaLogEntry {
    pub id: i64,
    pub saga_id: SagaId,
    pub message_type: i64,
    pub message_event: i64,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

impl SagaLogEntry {
    /// Decodes the interned codes back into a message name.
    pub fn name(&self) -> Result<MessageName> {
        MessageName::from_codes(self.message_type, self.message_event).map_err(|source| {
            SagaLogError::CorruptEntry {
                entry_id: self.id,
                source,
            }
        })
    }

    /// Reconstructs the message this entry recorded.
    pub fn to_message(&self) -> Result<SagaMessage> {
        let name = self.name()?;
        let payload =
            OrderPayload::from_json(&self.payload).map_err(|source| SagaLogError::CorruptEntry {
                entry_id: self.id,
                source,
            })?;
        Ok(SagaMessage::new(name, self.saga_id, payload))
    }

    /// Sort key giving the total order of a saga's entries.
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.timestamp, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> OrderPayload {
        OrderPayload {
            order_id: "o1".into(),
            user_id: "u1".into(),
            items: vec!["i1".into(), "i2".into()],
            total_cost: 20,
            paid: false,
        }
    }

    fn stored(new: NewLogEntry, id: i64) -> SagaLogEntry {
        SagaLogEntry {
            id,
            saga_id: new.saga_id,
            message_type: new.message_type,
            message_event: new.message_event,
            payload: new.payload,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_entry_reconstructs_message() {
        let msg = SagaMessage::new(MessageName::START_MAKE_PAYMENT, SagaId::new(4), payload());
        let new = NewLogEntry::from_message(&msg).unwrap();
        assert_eq!(new.message_type, 1);
        assert_eq!(new.message_event, 1);

        let entry = stored(new, 1);
        assert_eq!(entry.name().unwrap(), MessageName::START_MAKE_PAYMENT);
        assert_eq!(entry.to_message().unwrap(), msg);
    }

    #[test]
    fn test_unassigned_message_is_rejected() {
        let msg = SagaMessage::start_checkout(payload());
        assert!(matches!(
            NewLogEntry::from_message(&msg),
            Err(SagaLogError::UnassignedSaga)
        ));
    }

    #[test]
    fn test_corrupt_entries_are_reported() {
        let msg = SagaMessage::new(MessageName::END_UPDATE_ORDER, SagaId::new(2), payload());
        let mut entry = stored(NewLogEntry::from_message(&msg).unwrap(), 9);

        entry.message_event = 42;
        assert!(matches!(
            entry.name(),
            Err(SagaLogError::CorruptEntry { entry_id: 9, .. })
        ));

        entry.message_event = 7;
        entry.payload = "{not json".into();
        assert!(matches!(
            entry.to_message(),
            Err(SagaLogError::CorruptEntry { entry_id: 9, .. })
        ));
    }
}
