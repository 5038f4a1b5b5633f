//! Match State Definitions
//!
//! Participants, phases and outcomes for a single two-champion match.
//! Participants are kept in join order; every per-participant loop in the
//! simulation iterates that order so results are reproducible.

use std::fmt;

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::map::{ArenaMap, MapError, Position, SpawnSide};

/// Participants per match.
pub const MAX_PARTICIPANTS: usize = 2;

/// Starting and maximum health of every participant.
pub const BASE_HEALTH: u32 = 100;

// =============================================================================
// PARTICIPANT ID
// =============================================================================

/// External champion identifier, used as the participant id.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// CHAMPION PROFILE
// =============================================================================

/// The eight base attributes a champion brings into the arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attributes {
    pub strength: f64,
    pub agility: f64,
    pub hardiness: f64,
    pub stamina: f64,
    pub intelligence: f64,
    pub unarmed_skill: f64,
    pub weapon_skill: f64,
    pub survival_skill: f64,
}

impl Attributes {
    /// Every attribute set to the same value.
    pub fn uniform(value: f64) -> Self {
        Self {
            strength: value,
            agility: value,
            hardiness: value,
            stamina: value,
            intelligence: value,
            unarmed_skill: value,
            weapon_skill: value,
            survival_skill: value,
        }
    }

    fn values(&self) -> [f64; 8] {
        [
            self.strength,
            self.agility,
            self.hardiness,
            self.stamina,
            self.intelligence,
            self.unarmed_skill,
            self.weapon_skill,
            self.survival_skill,
        ]
    }

    /// All attributes finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.values().iter().all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Validated champion data handed to the match on join.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChampionProfile {
    pub id: ParticipantId,
    pub name: String,
    pub attributes: Attributes,
}

// =============================================================================
// PARTICIPANT
// =============================================================================

/// Combat posture. Changes take effect on the next resolved round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    #[default]
    Neutral,
    Aggressive,
    Defensive,
}

impl Stance {
    /// Parse a wire stance name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "neutral" => Some(Stance::Neutral),
            "aggressive" => Some(Stance::Aggressive),
            "defensive" => Some(Stance::Defensive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stance::Neutral => "neutral",
            Stance::Aggressive => "aggressive",
            Stance::Defensive => "defensive",
        }
    }
}

/// Participant lifecycle within a match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    #[default]
    Waiting,
    Active,
    Defeated,
}

/// A champion placed in the arena.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub position: Position,
    pub side: SpawnSide,
    pub current_health: u32,
    pub max_health: u32,
    pub attributes: Attributes,
    pub stance: Stance,
    pub status: ParticipantStatus,
}

impl Participant {
    /// Create a participant at full health on a spawn point.
    pub fn new(profile: ChampionProfile, side: SpawnSide, position: Position) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            position,
            side,
            current_health: BASE_HEALTH,
            max_health: BASE_HEALTH,
            attributes: profile.attributes,
            stance: Stance::Neutral,
            status: ParticipantStatus::Waiting,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.current_health > 0
    }

    /// Apply damage, clamping health at zero. Returns remaining health.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        self.current_health = self.current_health.saturating_sub(amount);
        self.current_health
    }

    pub fn summary(&self) -> ParticipantSummary {
        ParticipantSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            side: self.side,
            position: self.position,
            current_health: self.current_health,
            max_health: self.max_health,
            stance: self.stance,
            status: self.status,
        }
    }
}

/// Public view of a participant for broadcasts and snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub id: ParticipantId,
    pub name: String,
    pub side: SpawnSide,
    pub position: Position,
    pub current_health: u32,
    pub max_health: u32,
    pub stance: Stance,
    pub status: ParticipantStatus,
}

// =============================================================================
// MATCH PHASE & OUTCOME
// =============================================================================

/// Match lifecycle. `Finished` is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchPhase {
    /// Accepting joins
    #[default]
    Waiting,
    /// Countdown before combat
    Starting,
    /// Participants wandering the map
    Exploration,
    /// Rounds being resolved
    Combat,
    /// Match over
    Finished,
}

impl MatchPhase {
    /// Phases in which a remaining participant wins by forfeit.
    pub fn is_in_progress(self) -> bool {
        matches!(self, MatchPhase::Starting | MatchPhase::Exploration | MatchPhase::Combat)
    }
}

/// Why a match ended without a winner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawReason {
    /// Equal health percentage when rounds ran out
    HealthTied,
    /// Exploration step limit reached before the champions met
    NoEngagement,
}

/// How a match ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchOutcome {
    Victory { winner: ParticipantId, loser: ParticipantId },
    Forfeit { winner: ParticipantId, leaver: ParticipantId },
    Draw { reason: DrawReason },
}

impl MatchOutcome {
    pub fn winner(&self) -> Option<&ParticipantId> {
        match self {
            MatchOutcome::Victory { winner, .. } | MatchOutcome::Forfeit { winner, .. } => Some(winner),
            MatchOutcome::Draw { .. } => None,
        }
    }
}

// =============================================================================
// JOIN ERRORS
// =============================================================================

/// Reasons the match refuses a participant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("match is full or no longer accepting participants")]
    SessionFull,

    #[error("champion {0} already joined")]
    AlreadyJoined(ParticipantId),

    #[error("champion attributes must be finite and non-negative")]
    InvalidAttributes,

    #[error("no free spawn point on the {} side", .0.as_str())]
    NoSpawnPoint(SpawnSide),

    #[error("map error: {0}")]
    Map(#[from] MapError),
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Complete state of one match.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchState {
    /// Current phase
    pub phase: MatchPhase,

    /// Combat round, starting at 1 when combat begins
    pub round_number: u32,

    /// Unix ms at which the current round started
    pub round_start_time: i64,

    /// Seconds left before combat (countdown start mode)
    pub countdown: u32,

    /// Set exactly once when the match finishes
    pub outcome: Option<MatchOutcome>,

    /// Participants in join order
    pub participants: Vec<Participant>,

    /// The arena
    pub map: ArenaMap,

    /// Movement ticks taken during exploration
    pub exploration_steps: u32,

    /// Seed the RNG was built from
    pub rng_seed: u64,

    /// Exploration RNG
    #[serde(skip)]
    pub rng: DeterministicRng,

    /// Events produced since the last drain
    #[serde(skip)]
    pending_events: Vec<GameEvent>,
}

impl MatchState {
    /// Create a match on the standard arena.
    pub fn new(rng_seed: u64) -> Result<Self, MapError> {
        Self::with_map(ArenaMap::new(), rng_seed)
    }

    /// Create a match on a given arena. Fails if its spawn layout is unusable.
    pub fn with_map(map: ArenaMap, rng_seed: u64) -> Result<Self, MapError> {
        map.validate_spawn_points()?;

        Ok(Self {
            phase: MatchPhase::Waiting,
            round_number: 0,
            round_start_time: 0,
            countdown: 0,
            outcome: None,
            participants: Vec::with_capacity(MAX_PARTICIPANTS),
            map,
            exploration_steps: 0,
            rng_seed,
            rng: DeterministicRng::new(rng_seed),
            pending_events: Vec::new(),
        })
    }

    /// Place a new participant on the map.
    ///
    /// The first free side is east, then west; within a side the first
    /// unoccupied spawn point is used. On error nothing is changed.
    pub fn add_participant(&mut self, profile: ChampionProfile) -> Result<Participant, JoinError> {
        if self.phase != MatchPhase::Waiting || self.is_full() {
            return Err(JoinError::SessionFull);
        }
        if self.participant(&profile.id).is_some() {
            return Err(JoinError::AlreadyJoined(profile.id));
        }
        if !profile.attributes.is_valid() {
            return Err(JoinError::InvalidAttributes);
        }

        let side = if self.participants.iter().any(|p| p.side == SpawnSide::East) {
            SpawnSide::West
        } else {
            SpawnSide::East
        };
        let spawn = self
            .map
            .free_spawn_point(side)
            .ok_or(JoinError::NoSpawnPoint(side))?;
        self.map.occupy(spawn, &profile.id)?;

        let participant = Participant::new(profile, side, spawn);
        self.push_event(GameEvent::new(
            self.round_number,
            GameEventData::PlayerJoined {
                participant_id: participant.id.clone(),
                name: participant.name.clone(),
                side,
                position: spawn,
            },
        ));
        self.participants.push(participant.clone());

        Ok(participant)
    }

    /// Take a participant off the map. The tile stays occupied if the
    /// other participant shares it.
    pub fn remove_participant(&mut self, id: &ParticipantId) -> Option<Participant> {
        let idx = self.participants.iter().position(|p| &p.id == id)?;
        let removed = self.participants.remove(idx);

        if self.map.vacate(removed.position, &removed.id) {
            let sharer = self
                .participants
                .iter()
                .find(|p| p.position == removed.position)
                .map(|p| p.id.clone());
            if sharer.is_some() {
                self.map.reassign(removed.position, sharer.as_ref());
            }
        }

        Some(removed)
    }

    /// Change a participant's stance. Only honoured during combat.
    pub fn set_stance(&mut self, id: &ParticipantId, stance: Stance) -> bool {
        if self.phase != MatchPhase::Combat {
            return false;
        }
        let round = self.round_number;
        let Some(participant) = self.participant_mut(id) else {
            return false;
        };
        participant.stance = stance;

        let participant_id = participant.id.clone();
        self.push_event(GameEvent::new(
            round,
            GameEventData::StanceChanged { participant_id, stance },
        ));
        true
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub fn participant_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| &p.id == id)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.participants.len() >= MAX_PARTICIPANTS
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.phase == MatchPhase::Finished
    }

    pub fn winner_id(&self) -> Option<&ParticipantId> {
        self.outcome.as_ref().and_then(MatchOutcome::winner)
    }

    pub fn summaries(&self) -> Vec<ParticipantSummary> {
        self.participants.iter().map(Participant::summary).collect()
    }

    /// Drain events produced since the last call.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    pub fn push_event(&mut self, event: GameEvent) {
        self.pending_events.push(event);
    }
}
