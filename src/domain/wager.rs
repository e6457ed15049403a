//! Wagers and bet directions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Participant identifier at the ports boundary.
pub type ParticipantId = String;

/// Which way the participant expects the price to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// An admitted bet. Immutable once recorded by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wager {
    pub id: Uuid,
    pub participant_id: ParticipantId,
    pub direction: Direction,
    pub amount: u64,
    pub placed_at: DateTime<Utc>,
}

impl Wager {
    pub fn new(
        participant_id: impl Into<ParticipantId>,
        direction: Direction,
        amount: u64,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            participant_id: participant_id.into(),
            direction,
            amount,
            placed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_serde_lowercase() {
        let json = serde_json::to_string(&Direction::Up).unwrap();
        assert_eq!(json, "\"up\"");
        let back: Direction = serde_json::from_str("\"down\"").unwrap();
        assert_eq!(back, Direction::Down);
    }

    #[test]
    fn test_unknown_direction_is_rejected() {
        assert!(serde_json::from_str::<Direction>("\"sideways\"").is_err());
    }
}
