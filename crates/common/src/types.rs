use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a saga instance.
///
/// Saga ids are allocated by the saga log. Messages that have not been
/// assigned to a saga yet carry [`SagaId::UNASSIGNED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaId(i64);

impl SagaId {
    /// Sentinel for a message that does not belong to a saga yet.
    pub const UNASSIGNED: SagaId = SagaId(-1);

    /// Creates a saga id from a raw value.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns true if this is the unassigned sentinel.
    pub fn is_unassigned(&self) -> bool {
        *self == Self::UNASSIGNED
    }

    /// Returns the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SagaId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<i64> for SagaId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<SagaId> for i64 {
    fn from(id: SagaId) -> Self {
        id.0
    }
}

/// Identifier of an order, item or user in a participant store.
///
/// Wraps a UUID; the wire payload carries the hyphenated string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates a new random entity ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an entity ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses the hyphenated string form carried in payloads.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saga_id_sentinel() {
        assert!(SagaId::UNASSIGNED.is_unassigned());
        assert!(!SagaId::new(4).is_unassigned());
        assert_eq!(SagaId::UNASSIGNED.as_i64(), -1);
    }

    #[test]
    fn test_saga_id_parses_and_displays() {
        let id: SagaId = "42".parse().unwrap();
        assert_eq!(id, SagaId::new(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<SagaId>().is_err());
    }

    #[test]
    fn test_entity_id_parse_roundtrip() {
        let id = EntityId::new();
        let parsed = EntityId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(EntityId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_entity_id_serializes_as_plain_string() {
        let id = EntityId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
