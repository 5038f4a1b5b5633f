//! Game Logic Module
//!
//! Match simulation with no clocks or I/O. Randomness comes from the
//! match's seeded RNG, so a match replays exactly from its seed.
//!
//! ## Module Structure
//!
//! - `map`: 25x25 tile grid, spawn points, occupancy
//! - `state`: Participants, phases, outcomes
//! - `explore`: Weighted random walk and collision detection
//! - `combat`: Damage formula and round resolution
//! - `tick`: Phase transitions driven by the session timers
//! - `events`: Events broadcast to participants

pub mod map;
pub mod state;
pub mod explore;
pub mod combat;
pub mod tick;
pub mod events;

// Re-export key types
pub use map::{ArenaMap, MapError, Position, SpawnSide, TileType};
pub use state::{
    Attributes, ChampionProfile, JoinError, MatchOutcome, MatchPhase, MatchState,
    Participant, ParticipantId, Stance,
};
pub use tick::{MatchConfig, StartMode, TickResult};
pub use events::{GameEvent, GameEventData};
