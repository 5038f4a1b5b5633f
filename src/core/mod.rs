//! Core deterministic primitives.
//!
//! Everything the simulation draws at random flows through here so
//! that a seeded match can be replayed exactly.

pub mod rng;

// Re-export core types
pub use rng::{DeterministicRng, derive_session_seed};
