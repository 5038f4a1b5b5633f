//! # Champion Arena Server
//!
//! Real-time match engine for two-champion arena fights.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  CHAMPION ARENA SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Xorshift128+ PRNG, session seed derivation│
//! │                                                              │
//! │  game/           - Match rules (no clocks, no I/O)            │
//! │  ├── map.rs      - 25x25 tile grid, spawns, occupancy        │
//! │  ├── state.rs    - Participants, phases, outcomes            │
//! │  ├── explore.rs  - Weighted random walk, collisions          │
//! │  ├── combat.rs   - Damage formula, round resolution          │
//! │  ├── tick.rs     - Phase transitions, headless simulation    │
//! │  └── events.rs   - Events produced by the rules              │
//! │                                                              │
//! │  store/          - Champion status port + in-memory store    │
//! │                                                              │
//! │  network/        - Async edge                                │
//! │  ├── session.rs  - Per-match actor, session manager          │
//! │  ├── protocol.rs - JSON wire messages                        │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! `core/` and `game/` read no clock and draw randomness only from the
//! match's seeded RNG. Timestamps are passed in by the caller, so a match
//! replays exactly from its seed and the participants' attributes.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::state::{Attributes, ChampionProfile, MatchOutcome, MatchPhase, MatchState, ParticipantId};
pub use game::tick::{simulate_match, MatchConfig, StartMode};
pub use network::{GameServer, ServerConfig, SessionConfig, SessionManager};
pub use store::{ChampionStatus, ChampionStatusStore, InMemoryChampionStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
