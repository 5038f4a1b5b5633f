//! Exploration Movement
//!
//! Autonomous weighted random walk toward the arena center. Moves for a
//! movement tick are planned against the map as it stood at the start of
//! the tick, then applied in join order. Two participants landing on the
//! same tile is a collision, which ends exploration.

use serde::{Serialize, Deserialize};
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::core::rng::DeterministicRng;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::map::{ArenaMap, Position, MAP_CENTER};
use crate::game::state::{MatchState, ParticipantId, ParticipantStatus};

/// Weight every direction starts with.
pub const BASE_WEIGHT: u32 = 1;

/// Added to each direction that closes distance to the center.
pub const CENTER_BIAS: u32 = 2;

/// Added to one random direction when the wander roll succeeds.
pub const WANDER_BOOST: u32 = 3;

/// Probability of the wander boost per move.
pub const WANDER_CHANCE: f64 = 0.30;

/// Cardinal step direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// Draw order for the cumulative weight table.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// (row, col) delta.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (-1, 0),
            Direction::South => (1, 0),
            Direction::East => (0, 1),
            Direction::West => (0, -1),
        }
    }

    pub fn apply(self, pos: Position) -> Option<Position> {
        let (d_row, d_col) = self.delta();
        pos.offset(d_row, d_col)
    }
}

/// Two participants sharing a tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collision {
    pub position: Position,
    /// Earlier joiner first
    pub participants: [ParticipantId; 2],
}

/// Direction weights for a participant at `pos`, in `Direction::ALL` order.
pub fn direction_weights(pos: Position, rng: &mut DeterministicRng) -> [u32; 4] {
    let mut weights = [BASE_WEIGHT; 4];

    if pos.row > MAP_CENTER.row {
        weights[0] += CENTER_BIAS;
    }
    if pos.row < MAP_CENTER.row {
        weights[1] += CENTER_BIAS;
    }
    if pos.col < MAP_CENTER.col {
        weights[2] += CENTER_BIAS;
    }
    if pos.col > MAP_CENTER.col {
        weights[3] += CENTER_BIAS;
    }

    if rng.chance(WANDER_CHANCE) {
        let idx = rng.next_int(4) as usize;
        weights[idx] += WANDER_BOOST;
    }

    weights
}

/// Cumulative-weight draw over `Direction::ALL`.
pub fn choose_direction(pos: Position, rng: &mut DeterministicRng) -> Direction {
    let weights = direction_weights(pos, rng);
    let total: u32 = weights.iter().sum();
    let mut roll = rng.next_int(total);

    #[cfg(feature = "debug-tracing")]
    trace!(?pos, ?weights, roll, "exploration draw");

    for (direction, weight) in Direction::ALL.iter().zip(weights) {
        if roll < weight {
            return *direction;
        }
        roll -= weight;
    }

    Direction::West
}

/// Pick a destination for a participant, or `None` to stay put when the
/// drawn tile is out of bounds, water, or occupied.
pub fn plan_move(map: &ArenaMap, from: Position, rng: &mut DeterministicRng) -> Option<Position> {
    let to = choose_direction(from, rng).apply(from)?;
    map.is_free(to).then_some(to)
}

/// Run one movement tick for every active participant.
///
/// Emits a position event per accepted move and returns the collision
/// that ends exploration, if one happened.
pub fn step(state: &mut MatchState) -> Option<Collision> {
    let planned: Vec<(usize, Position)> = (0..state.participants.len())
        .filter(|&idx| state.participants[idx].status == ParticipantStatus::Active)
        .filter_map(|idx| {
            let from = state.participants[idx].position;
            plan_move(&state.map, from, &mut state.rng).map(|to| (idx, to))
        })
        .collect();

    for (idx, to) in planned {
        let (id, from) = {
            let participant = &state.participants[idx];
            (participant.id.clone(), participant.position)
        };

        state.map.vacate(from, &id);
        // Fails only when an earlier mover claimed the tile this tick
        let _ = state.map.occupy(to, &id);
        state.participants[idx].position = to;

        let tile_type = state
            .map
            .tile(to)
            .map(|tile| tile.tile_type)
            .unwrap_or_default();
        state.push_event(GameEvent::new(
            state.round_number,
            GameEventData::PositionChanged {
                participant_id: id.clone(),
                position: to,
                tile_type,
            },
        ));

        let other = state
            .participants
            .iter()
            .find(|p| p.id != id && p.status == ParticipantStatus::Active && p.position == to);
        if let Some(other) = other {
            let participants = if idx == 0 {
                [id, other.id.clone()]
            } else {
                [other.id.clone(), id]
            };
            return Some(Collision { position: to, participants });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::{MapLayout, TileType};
    use crate::game::state::{Attributes, ChampionProfile};

    fn active_match(seed: u64) -> MatchState {
        let mut state = MatchState::new(seed).unwrap();
        for id in ["a", "b"] {
            state
                .add_participant(ChampionProfile {
                    id: ParticipantId::new(id),
                    name: id.to_uppercase(),
                    attributes: Attributes::uniform(5.0),
                })
                .unwrap();
        }
        for p in &mut state.participants {
            p.status = ParticipantStatus::Active;
        }
        state.take_events();
        state
    }

    #[test]
    fn test_center_bias() {
        let mut rng = DeterministicRng::new(3);
        for _ in 0..50 {
            let w = direction_weights(Position::new(0, 0), &mut rng);
            // South and east always carry the bias from the top-left corner
            assert!(w[1] >= BASE_WEIGHT + CENTER_BIAS);
            assert!(w[2] >= BASE_WEIGHT + CENTER_BIAS);
            let total: u32 = w.iter().sum();
            assert!(total == 8 || total == 11);
        }

        let w = direction_weights(MAP_CENTER, &mut DeterministicRng::new(0));
        let total: u32 = w.iter().sum();
        assert!(total == 4 || total == 7);
    }

    #[test]
    fn test_draw_favours_center() {
        let mut rng = DeterministicRng::new(11);
        let toward = (0..2_000)
            .map(|_| choose_direction(Position::new(0, 0), &mut rng))
            .filter(|d| matches!(d, Direction::South | Direction::East))
            .count();
        // Expected share is well above one half
        assert!(toward > 1_300, "toward = {}", toward);
    }

    #[test]
    fn test_plan_never_targets_water_or_occupied() {
        let mut layout = MapLayout::standard();
        // Box (12, 12) in with water on three sides and an occupant on the fourth
        layout.features.push((
            TileType::Water,
            vec![Position::new(11, 12), Position::new(13, 12), Position::new(12, 11)],
        ));
        let mut map = ArenaMap::with_layout(&layout);
        map.occupy(Position::new(12, 13), &ParticipantId::new("blocker")).unwrap();

        let mut rng = DeterministicRng::new(5);
        for _ in 0..200 {
            assert_eq!(plan_move(&map, Position::new(12, 12), &mut rng), None);
        }
    }

    #[test]
    fn test_plan_from_integer_limit_stays_put() {
        let map = ArenaMap::new();
        let mut rng = DeterministicRng::new(5);
        for _ in 0..100 {
            assert_eq!(plan_move(&map, Position::new(i32::MAX, i32::MIN), &mut rng), None);
        }
        assert_eq!(Direction::South.apply(Position::new(i32::MAX, 0)), None);
        assert_eq!(Direction::North.apply(Position::new(1, 0)), Some(Position::new(0, 0)));
    }

    #[test]
    fn test_step_invariants_over_long_walk() {
        let mut state = active_match(99);

        for _ in 0..500 {
            let collision = step(&mut state);
            for p in &state.participants {
                let tile = state.map.tile(p.position).unwrap();
                assert_ne!(tile.tile_type, TileType::Water);
                assert!(tile.is_occupied());
            }
            let same_tile = state.participants[0].position == state.participants[1].position;
            assert_eq!(collision.is_some(), same_tile);
            if collision.is_some() {
                break;
            }
        }
    }

    #[test]
    fn test_step_emits_position_events() {
        let mut state = active_match(7);
        let before: Vec<Position> = state.participants.iter().map(|p| p.position).collect();

        step(&mut state);

        let events = state.take_events();
        let moved = state
            .participants
            .iter()
            .zip(&before)
            .filter(|(p, old)| p.position != **old)
            .count();
        assert_eq!(events.len(), moved);
        for event in events {
            assert!(matches!(event.data, GameEventData::PositionChanged { .. }));
        }
    }

    #[test]
    fn test_collision_on_shared_destination() {
        let mut state = active_match(1);
        // Park both participants either side of (12, 12) with every other exit walled
        let mut layout = MapLayout::standard();
        layout.features.push((
            TileType::Water,
            vec![
                Position::new(11, 11), Position::new(13, 11), Position::new(12, 10),
                Position::new(11, 13), Position::new(13, 13), Position::new(12, 14),
                Position::new(11, 12), Position::new(13, 12),
            ],
        ));
        state.map = ArenaMap::with_layout(&layout);
        let a = ParticipantId::new("a");
        let b = ParticipantId::new("b");
        state.participants[0].position = Position::new(12, 11);
        state.participants[1].position = Position::new(12, 13);
        state.map.occupy(Position::new(12, 11), &a).unwrap();
        state.map.occupy(Position::new(12, 13), &b).unwrap();

        let mut collision = None;
        for _ in 0..500 {
            collision = step(&mut state);
            if collision.is_some() {
                break;
            }
        }

        let collision = collision.expect("walkers boxed around one tile must meet");
        assert_eq!(collision.position, Position::new(12, 12));
        assert_eq!(collision.participants, [a.clone(), b]);
        assert_eq!(
            state.map.tile(Position::new(12, 12)).unwrap().occupant.as_ref(),
            Some(&a)
        );
    }

    #[test]
    fn test_inactive_participants_do_not_move() {
        let mut state = active_match(4);
        for p in &mut state.participants {
            p.status = ParticipantStatus::Waiting;
        }
        let before: Vec<Position> = state.participants.iter().map(|p| p.position).collect();

        for _ in 0..20 {
            assert!(step(&mut state).is_none());
        }
        let after: Vec<Position> = state.participants.iter().map(|p| p.position).collect();
        assert_eq!(before, after);
    }
}
