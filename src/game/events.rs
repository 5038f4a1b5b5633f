//! Game Events
//!
//! Events generated by the simulation. The session drains them after
//! every step and turns them into wire messages.

use serde::{Serialize, Deserialize};

use crate::game::map::{Position, SpawnSide, TileType};
use crate::game::state::{MatchOutcome, ParticipantId, ParticipantSummary, Stance};

/// Message broadcast when exploration begins.
pub const EXPLORATION_MESSAGE: &str = "Exploration phase begun - find your opponent!";

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Participant placed on a spawn point
    PlayerJoined {
        participant_id: ParticipantId,
        name: String,
        side: SpawnSide,
        position: Position,
    },

    /// Second participant arrived, countdown begins
    MatchStarting {
        countdown: u32,
        participants: Vec<ParticipantSummary>,
    },

    /// One countdown step elapsed
    Countdown {
        seconds_remaining: u32,
    },

    /// Participants released onto the map
    ExplorationStarted {
        message: String,
    },

    /// Accepted exploration move
    PositionChanged {
        participant_id: ParticipantId,
        position: Position,
        tile_type: TileType,
    },

    /// Combat began, at the collision tile when exploration led here
    CombatStarted {
        participant_ids: Vec<ParticipantId>,
        round_number: u32,
        start_time: i64,
        position: Option<Position>,
    },

    /// One attack exchange
    DamageDealt {
        attacker: String,
        defender: String,
        attacker_stance: Stance,
        defender_stance: Stance,
        damage: u32,
        remaining_health: u32,
    },

    /// Stance change accepted
    StanceChanged {
        participant_id: ParticipantId,
        stance: Stance,
    },

    /// A new combat round began
    RoundStarted {
        round_number: u32,
        start_time: i64,
    },

    /// Participant left the match
    ParticipantLeft {
        participant_id: ParticipantId,
        consented: bool,
    },

    /// Match finished
    MatchEnded {
        outcome: MatchOutcome,
        participants: Vec<ParticipantSummary>,
    },
}

/// A game event stamped with the combat round it happened in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Round number when the event occurred (0 before combat)
    pub round: u32,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(round: u32, data: GameEventData) -> Self {
        Self { round, data }
    }

    /// Create countdown event.
    pub fn countdown(seconds_remaining: u32) -> Self {
        Self::new(0, GameEventData::Countdown { seconds_remaining })
    }

    /// Create exploration start event.
    pub fn exploration_started() -> Self {
        Self::new(
            0,
            GameEventData::ExplorationStarted {
                message: EXPLORATION_MESSAGE.to_string(),
            },
        )
    }

    /// Create round start event.
    pub fn round_started(round_number: u32, start_time: i64) -> Self {
        Self::new(round_number, GameEventData::RoundStarted { round_number, start_time })
    }

    /// Create participant left event.
    pub fn participant_left(round: u32, participant_id: ParticipantId, consented: bool) -> Self {
        Self::new(round, GameEventData::ParticipantLeft { participant_id, consented })
    }

    /// True for the terminal event of a match.
    pub fn is_match_end(&self) -> bool {
        matches!(self.data, GameEventData::MatchEnded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let event = GameEvent::round_started(3, 1_000);
        assert_eq!(event.round, 3);
        assert_eq!(
            event.data,
            GameEventData::RoundStarted { round_number: 3, start_time: 1_000 }
        );

        match GameEvent::exploration_started().data {
            GameEventData::ExplorationStarted { message } => {
                assert_eq!(message, EXPLORATION_MESSAGE);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_match_end_detection() {
        let end = GameEvent::new(
            4,
            GameEventData::MatchEnded {
                outcome: MatchOutcome::Draw { reason: crate::game::state::DrawReason::HealthTied },
                participants: vec![],
            },
        );
        assert!(end.is_match_end());
        assert!(!GameEvent::countdown(2).is_match_end());
    }
}
