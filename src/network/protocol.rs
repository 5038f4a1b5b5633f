//! Protocol Messages
//!
//! JSON wire format between participants and the server. Client messages
//! carry a `type` tag; server messages are `{"event": name, "data": {..}}`
//! with camelCase fields.

use serde::{Serialize, Deserialize};

use crate::game::events::{GameEvent, GameEventData};
use crate::game::map::{Position, SpawnSide, TileType};
use crate::game::state::{
    Attributes, ChampionProfile, MatchOutcome, ParticipantId, ParticipantSummary, Stance,
};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Enter a match with a champion.
    #[serde(rename_all = "camelCase")]
    Join {
        champion_id: String,
        champion: Option<ChampionData>,
    },

    /// Leave the current match.
    Leave {
        #[serde(default)]
        consented: bool,
    },

    /// Change stance during combat.
    SetStance { stance: String },

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

/// A stat as stored on the champion record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatValue {
    pub current: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalStats {
    pub strength: Option<StatValue>,
    pub agility: Option<StatValue>,
    pub hardiness: Option<StatValue>,
    pub stamina: Option<StatValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentalStats {
    pub intelligence: Option<StatValue>,
    pub unarmed_skill: Option<StatValue>,
    pub weapon_skill: Option<StatValue>,
    pub survival_skill: Option<StatValue>,
}

/// Champion record sent with a join request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChampionData {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub physical: Option<PhysicalStats>,
    pub mental: Option<MentalStats>,
}

/// Why champion data could not become a profile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChampionDataError {
    #[error("champion data is missing {0}")]
    Missing(&'static str),

    #[error("champion {0} must be a finite non-negative number")]
    Invalid(&'static str),
}

fn stat(value: Option<StatValue>, name: &'static str) -> Result<f64, ChampionDataError> {
    let value = value.ok_or(ChampionDataError::Missing(name))?.current;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ChampionDataError::Invalid(name))
    }
}

impl ChampionData {
    /// Build a validated profile. The record's `_id`, when present, must
    /// match the id the client joined with.
    pub fn to_profile(&self, champion_id: &str) -> Result<ChampionProfile, ChampionDataError> {
        if champion_id.is_empty() {
            return Err(ChampionDataError::Missing("championId"));
        }
        if self.id.as_deref().is_some_and(|id| id != champion_id) {
            return Err(ChampionDataError::Invalid("_id"));
        }

        let name = self
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or(ChampionDataError::Missing("name"))?;
        let physical = self.physical.as_ref().ok_or(ChampionDataError::Missing("physical"))?;
        let mental = self.mental.as_ref().ok_or(ChampionDataError::Missing("mental"))?;

        let attributes = Attributes {
            strength: stat(physical.strength, "strength")?,
            agility: stat(physical.agility, "agility")?,
            hardiness: stat(physical.hardiness, "hardiness")?,
            stamina: stat(physical.stamina, "stamina")?,
            intelligence: stat(mental.intelligence, "intelligence")?,
            unarmed_skill: stat(mental.unarmed_skill, "unarmedSkill")?,
            weapon_skill: stat(mental.weapon_skill, "weaponSkill")?,
            survival_skill: stat(mental.survival_skill, "survivalSkill")?,
        };

        Ok(ChampionProfile {
            id: ParticipantId::new(champion_id),
            name: name.to_string(),
            attributes,
        })
    }

    /// Record for a champion with the given attributes.
    pub fn from_attributes(id: &str, name: &str, attributes: &Attributes) -> Self {
        let v = |current| Some(StatValue { current });
        Self {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            physical: Some(PhysicalStats {
                strength: v(attributes.strength),
                agility: v(attributes.agility),
                hardiness: v(attributes.hardiness),
                stamina: v(attributes.stamina),
            }),
            mental: Some(MentalStats {
                intelligence: v(attributes.intelligence),
                unarmed_skill: v(attributes.unarmed_skill),
                weapon_skill: v(attributes.weapon_skill),
                survival_skill: v(attributes.survival_skill),
            }),
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Join accepted (joiner only).
    #[serde(rename_all = "camelCase")]
    Joined {
        session_id: String,
        participant_id: ParticipantId,
        side: SpawnSide,
        position: Position,
    },

    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        participant_id: ParticipantId,
        name: String,
        position: Position,
    },

    MatchStarting {
        countdown: u32,
        participants: Vec<ParticipantSummary>,
    },

    #[serde(rename_all = "camelCase")]
    Countdown { seconds_remaining: u32 },

    ExplorationStart { message: String },

    #[serde(rename_all = "camelCase")]
    PositionUpdate {
        participant_id: ParticipantId,
        row: i32,
        col: i32,
        tile_type: TileType,
    },

    #[serde(rename_all = "camelCase")]
    CombatStart {
        participant_ids: Vec<ParticipantId>,
        round_number: u32,
        start_time: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        row: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        col: Option<i32>,
    },

    CombatUpdate(CombatUpdate),

    #[serde(rename_all = "camelCase")]
    RoundStart { round_number: u32, start_time: i64 },

    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        participant_id: ParticipantId,
        consented: bool,
    },

    #[serde(rename_all = "camelCase")]
    MatchEnd {
        winner_id: Option<ParticipantId>,
        outcome: MatchOutcome,
        participants: Vec<ParticipantSummary>,
    },

    /// Session is going away; the connection will be closed.
    SessionClosed { reason: String },

    /// Request failed (requester only).
    Error(ServerError),

    #[serde(rename_all = "camelCase")]
    Pong { timestamp: u64, server_time: u64 },
}

/// Combat broadcast payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CombatUpdate {
    #[serde(rename_all = "camelCase")]
    Damage {
        attacker: String,
        defender: String,
        attacker_stance: Stance,
        defender_stance: Stance,
        damage_dealt: u32,
        remaining_health: u32,
    },

    #[serde(rename_all = "camelCase")]
    Stance {
        participant_id: ParticipantId,
        stance: Stance,
    },
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidMessage,
    /// Champion data absent or malformed.
    MissingChampionData,
    /// Champion is already training or fighting.
    ChampionBusy,
    /// Champion already in this match.
    AlreadyJoined,
    /// Match has two participants or has started.
    SessionFull,
    /// Request needs a joined match.
    NotInMatch,
    /// Status store could not be reached.
    StoreUnavailable,
    /// Too many connections.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<&GameEvent> for ServerMessage {
    fn from(event: &GameEvent) -> Self {
        match &event.data {
            GameEventData::PlayerJoined { participant_id, name, position, .. } => {
                ServerMessage::PlayerJoined {
                    participant_id: participant_id.clone(),
                    name: name.clone(),
                    position: *position,
                }
            }
            GameEventData::MatchStarting { countdown, participants } => ServerMessage::MatchStarting {
                countdown: *countdown,
                participants: participants.clone(),
            },
            GameEventData::Countdown { seconds_remaining } => ServerMessage::Countdown {
                seconds_remaining: *seconds_remaining,
            },
            GameEventData::ExplorationStarted { message } => ServerMessage::ExplorationStart {
                message: message.clone(),
            },
            GameEventData::PositionChanged { participant_id, position, tile_type } => {
                ServerMessage::PositionUpdate {
                    participant_id: participant_id.clone(),
                    row: position.row,
                    col: position.col,
                    tile_type: *tile_type,
                }
            }
            GameEventData::CombatStarted { participant_ids, round_number, start_time, position } => {
                ServerMessage::CombatStart {
                    participant_ids: participant_ids.clone(),
                    round_number: *round_number,
                    start_time: *start_time,
                    row: position.map(|p| p.row),
                    col: position.map(|p| p.col),
                }
            }
            GameEventData::DamageDealt {
                attacker,
                defender,
                attacker_stance,
                defender_stance,
                damage,
                remaining_health,
            } => ServerMessage::CombatUpdate(CombatUpdate::Damage {
                attacker: attacker.clone(),
                defender: defender.clone(),
                attacker_stance: *attacker_stance,
                defender_stance: *defender_stance,
                damage_dealt: *damage,
                remaining_health: *remaining_health,
            }),
            GameEventData::StanceChanged { participant_id, stance } => {
                ServerMessage::CombatUpdate(CombatUpdate::Stance {
                    participant_id: participant_id.clone(),
                    stance: *stance,
                })
            }
            GameEventData::RoundStarted { round_number, start_time } => ServerMessage::RoundStart {
                round_number: *round_number,
                start_time: *start_time,
            },
            GameEventData::ParticipantLeft { participant_id, consented } => ServerMessage::PlayerLeft {
                participant_id: participant_id.clone(),
                consented: *consented,
            },
            GameEventData::MatchEnded { outcome, participants } => ServerMessage::MatchEnd {
                winner_id: outcome.winner().cloned(),
                outcome: outcome.clone(),
                participants: participants.clone(),
            },
        }
    }
}

impl ServerMessage {
    /// Error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError { code, message: message.into() })
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
