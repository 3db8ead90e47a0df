//! Topic naming: `<service>-syn` carries orchestrator instructions to a
//! participant, `<service>-ack` carries the participant's replies back.

use crate::error::MessagingError;

/// A participant service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Order,
    Stock,
    Payment,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Order, Service::Stock, Service::Payment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Order => "order",
            Service::Stock => "stock",
            Service::Payment => "payment",
        }
    }
}

/// Which way a topic flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Orchestrator to participant.
    Syn,
    /// Participant to orchestrator.
    Ack,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Syn => "syn",
            Direction::Ack => "ack",
        }
    }
}

/// A topic of the saga message log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic {
    pub service: Service,
    pub direction: Direction,
}

impl Topic {
    pub const fn new(service: Service, direction: Direction) -> Self {
        Self { service, direction }
    }

    /// Instruction topic of `service`.
    pub const fn syn(service: Service) -> Self {
        Self::new(service, Direction::Syn)
    }

    /// Reply topic of `service`.
    pub const fn ack(service: Service) -> Self {
        Self::new(service, Direction::Ack)
    }

    /// Every `-ack` topic; the orchestrator subscribes to all of them.
    pub fn all_ack() -> Vec<Topic> {
        Service::ALL.into_iter().map(Topic::ack).collect()
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.service.as_str(), self.direction.as_str())
    }
}

impl std::str::FromStr for Topic {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MessagingError::InvalidTopic(s.to_string());
        let (service, direction) = s.rsplit_once('-').ok_or_else(invalid)?;
        let service = Service::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == service)
            .ok_or_else(invalid)?;
        let direction = match direction {
            "syn" => Direction::Syn,
            "ack" => Direction::Ack,
            _ => return Err(invalid()),
        };
        Ok(Self::new(service, direction))
    }
}
