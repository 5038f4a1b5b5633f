//! Arena Tile Map
//!
//! Fixed 25x25 grid of typed tiles with occupancy tracking, spawn
//! alcoves on the east and west edges, and a 5x5 central chamber.

use std::fmt;

use serde::{Serialize, Deserialize};
use tracing::warn;

use crate::game::state::ParticipantId;

/// Width and height of the arena grid.
pub const MAP_SIZE: i32 = 25;

/// Tile every participant is drawn toward during exploration.
pub const MAP_CENTER: Position = Position::new(12, 12);

/// Grid coordinate. Signed so that a step off the edge is representable
/// before it is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Position shifted by a (row, col) delta, `None` if a coordinate
    /// leaves the `i32` range.
    pub fn offset(self, d_row: i32, d_col: i32) -> Option<Self> {
        Some(Self::new(self.row.checked_add(d_row)?, self.col.checked_add(d_col)?))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Terrain of a tile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileType {
    #[default]
    Regular,
    MonsterDen,
    LootRoom,
    Water,
    Junction,
    Central,
}

impl TileType {
    /// Wire name, also used in narrative position updates.
    pub fn as_str(self) -> &'static str {
        match self {
            TileType::Regular => "regular",
            TileType::MonsterDen => "monster_den",
            TileType::LootRoom => "loot_room",
            TileType::Water => "water",
            TileType::Junction => "junction",
            TileType::Central => "central",
        }
    }

    /// Water channels cannot be entered.
    pub fn is_blocking(self) -> bool {
        matches!(self, TileType::Water)
    }
}

/// One cell of the arena.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    #[serde(rename = "type")]
    pub tile_type: TileType,
    pub occupant: Option<ParticipantId>,
}

impl Tile {
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }
}

/// Half of the map a participant enters from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnSide {
    East,
    West,
}

impl SpawnSide {
    pub fn as_str(self) -> &'static str {
        match self {
            SpawnSide::East => "east",
            SpawnSide::West => "west",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "east" => Some(SpawnSide::East),
            "west" => Some(SpawnSide::West),
            _ => None,
        }
    }
}

/// Static game content: which coordinates carry which terrain, and where
/// each side spawns.
#[derive(Clone, Debug)]
pub struct MapLayout {
    /// Applied in order; a later entry overwrites an earlier one.
    pub features: Vec<(TileType, Vec<Position>)>,
    pub east_spawns: [Position; 4],
    pub west_spawns: [Position; 4],
}

impl MapLayout {
    /// The arena as shipped.
    pub fn standard() -> Self {
        let monster_den = points(&[
            (0, 5), (0, 19),
            (4, 0), (4, 24),
            (20, 5), (20, 19),
            (24, 5), (24, 19),
        ]);

        let loot_room = points(&[
            (4, 6), (4, 18),
            (10, 6), (10, 18),
            (14, 6), (14, 18),
            (20, 6), (20, 18),
        ]);

        let water = points(&[
            (3, 4), (3, 5), (3, 9), (3, 10),
            (4, 3), (4, 11), (4, 15), (4, 16),
            (5, 3), (5, 11), (5, 15), (5, 16),
            (9, 3), (9, 11), (9, 15), (9, 16),
            (10, 3), (10, 11), (10, 15), (10, 16),
            (15, 3), (15, 11), (15, 15), (15, 16),
            (16, 3), (16, 11), (16, 15), (16, 16),
            (17, 4), (17, 5), (17, 9), (17, 10),
        ]);

        let junction = points(&[
            (2, 2), (2, 22),
            (4, 5), (4, 19),
            (7, 4), (7, 20),
            (10, 4), (10, 20),
            (14, 4), (14, 20),
            (17, 2), (17, 22),
        ]);

        let central = (10..15)
            .flat_map(|row| (10..15).map(move |col| Position::new(row, col)))
            .collect();

        Self {
            features: vec![
                (TileType::MonsterDen, monster_den),
                (TileType::LootRoom, loot_room),
                (TileType::Water, water),
                (TileType::Junction, junction),
                (TileType::Central, central),
            ],
            east_spawns: [
                Position::new(0, 0), Position::new(0, 24),
                Position::new(8, 0), Position::new(8, 24),
            ],
            west_spawns: [
                Position::new(16, 0), Position::new(16, 24),
                Position::new(24, 0), Position::new(24, 24),
            ],
        }
    }
}

impl Default for MapLayout {
    fn default() -> Self {
        Self::standard()
    }
}

fn points(coords: &[(i32, i32)]) -> Vec<Position> {
    coords.iter().map(|&(row, col)| Position::new(row, col)).collect()
}

/// Map errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// Coordinate outside the grid.
    #[error("position {0} is out of bounds")]
    OutOfBounds(Position),

    /// Tile cannot be entered.
    #[error("tile at {0} is blocked")]
    Blocked(Position),

    /// Tile already holds a participant.
    #[error("tile at {0} is occupied")]
    Occupied(Position),

    /// Spawn layout breaks the placement invariants.
    #[error("invalid spawn layout: {0}")]
    InvalidSpawnLayout(String),
}

/// The 25x25 arena grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArenaMap {
    /// Row-major tiles.
    tiles: Vec<Tile>,
    east_spawns: [Position; 4],
    west_spawns: [Position; 4],
}

impl ArenaMap {
    /// Build the standard arena.
    pub fn new() -> Self {
        Self::with_layout(&MapLayout::standard())
    }

    /// Build an arena from a layout. Out-of-bounds feature coordinates are
    /// logged and skipped.
    pub fn with_layout(layout: &MapLayout) -> Self {
        let mut map = Self {
            tiles: vec![Tile::default(); (MAP_SIZE * MAP_SIZE) as usize],
            east_spawns: layout.east_spawns,
            west_spawns: layout.west_spawns,
        };

        for (tile_type, coords) in &layout.features {
            for &pos in coords {
                match map.tile_mut(pos) {
                    Some(tile) => tile.tile_type = *tile_type,
                    None => warn!(
                        "Skipping {} tile at {}: outside the {}x{} grid",
                        tile_type.as_str(), pos, MAP_SIZE, MAP_SIZE
                    ),
                }
            }
        }

        map
    }

    /// True iff `0 <= row, col < 25`.
    #[inline]
    pub fn is_valid_position(row: i32, col: i32) -> bool {
        (0..MAP_SIZE).contains(&row) && (0..MAP_SIZE).contains(&col)
    }

    fn index(pos: Position) -> Option<usize> {
        if Self::is_valid_position(pos.row, pos.col) {
            Some((pos.row * MAP_SIZE + pos.col) as usize)
        } else {
            None
        }
    }

    /// Bounds-checked lookup.
    pub fn get_tile(&self, row: i32, col: i32) -> Option<&Tile> {
        self.tile(Position::new(row, col))
    }

    pub fn tile(&self, pos: Position) -> Option<&Tile> {
        Self::index(pos).and_then(|idx| self.tiles.get(idx))
    }

    fn tile_mut(&mut self, pos: Position) -> Option<&mut Tile> {
        Self::index(pos).and_then(move |idx| self.tiles.get_mut(idx))
    }

    /// All tiles of a type, row-major.
    pub fn tiles_by_type(&self, tile_type: TileType) -> Vec<(Position, &Tile)> {
        self.iter()
            .filter(|(_, tile)| tile.tile_type == tile_type)
            .collect()
    }

    /// In-bounds N/S/W/E neighbours.
    pub fn adjacent_tiles(&self, row: i32, col: i32) -> Vec<(Position, &Tile)> {
        const DIRECTIONS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

        let origin = Position::new(row, col);
        DIRECTIONS
            .iter()
            .filter_map(|&(d_row, d_col)| {
                let pos = origin.offset(d_row, d_col)?;
                self.tile(pos).map(|tile| (pos, tile))
            })
            .collect()
    }

    /// The four spawn points of a side, in preference order.
    pub fn spawn_points(&self, side: SpawnSide) -> &[Position] {
        match side {
            SpawnSide::East => &self.east_spawns,
            SpawnSide::West => &self.west_spawns,
        }
    }

    /// Spawn points by side name; unknown names yield an empty slice.
    pub fn spawn_points_named(&self, side: &str) -> &[Position] {
        match SpawnSide::parse(side) {
            Some(side) => self.spawn_points(side),
            None => &[],
        }
    }

    /// First spawn point of a side that can take a participant right now.
    pub fn free_spawn_point(&self, side: SpawnSide) -> Option<Position> {
        self.spawn_points(side)
            .iter()
            .copied()
            .find(|&pos| self.is_free(pos))
    }

    /// In bounds and not water.
    pub fn is_walkable(&self, pos: Position) -> bool {
        self.tile(pos).is_some_and(|tile| !tile.tile_type.is_blocking())
    }

    /// Walkable and unoccupied.
    pub fn is_free(&self, pos: Position) -> bool {
        self.tile(pos)
            .is_some_and(|tile| !tile.tile_type.is_blocking() && !tile.is_occupied())
    }

    /// Record a participant on a tile.
    pub fn occupy(&mut self, pos: Position, id: &ParticipantId) -> Result<(), MapError> {
        let tile = self.tile_mut(pos).ok_or(MapError::OutOfBounds(pos))?;
        if tile.tile_type.is_blocking() {
            return Err(MapError::Blocked(pos));
        }
        if tile.is_occupied() {
            return Err(MapError::Occupied(pos));
        }
        tile.occupant = Some(id.clone());
        Ok(())
    }

    /// Clear a tile if `id` is its recorded occupant. Returns whether the
    /// tile was cleared.
    pub fn vacate(&mut self, pos: Position, id: &ParticipantId) -> bool {
        match self.tile_mut(pos) {
            Some(tile) if tile.occupant.as_ref() == Some(id) => {
                tile.occupant = None;
                true
            }
            _ => false,
        }
    }

    /// Hand a tile's occupancy to another participant standing on it.
    pub(crate) fn reassign(&mut self, pos: Position, id: Option<&ParticipantId>) {
        if let Some(tile) = self.tile_mut(pos) {
            tile.occupant = id.cloned();
        }
    }

    /// Check that every spawn point is in bounds, enterable, and distinct.
    pub fn validate_spawn_points(&self) -> Result<(), MapError> {
        let all: Vec<Position> = self
            .east_spawns
            .iter()
            .chain(self.west_spawns.iter())
            .copied()
            .collect();

        for (i, pos) in all.iter().enumerate() {
            if !self.is_walkable(*pos) {
                return Err(MapError::InvalidSpawnLayout(format!(
                    "spawn point {} is out of bounds or blocked", pos
                )));
            }
            if all[..i].contains(pos) {
                return Err(MapError::InvalidSpawnLayout(format!(
                    "spawn point {} is listed twice", pos
                )));
            }
        }

        Ok(())
    }

    /// Row-major iteration over every tile.
    pub fn iter(&self) -> impl Iterator<Item = (Position, &Tile)> {
        self.tiles.iter().enumerate().map(|(idx, tile)| {
            let idx = idx as i32;
            (Position::new(idx / MAP_SIZE, idx % MAP_SIZE), tile)
        })
    }
}

impl Default for ArenaMap {
    fn default() -> Self {
        Self::new()
    }
}
