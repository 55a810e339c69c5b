//! Math types.
//!
//! This module intentionally stays small. It only carries what positions,
//! spawn points and chunk addressing need.

use serde::{Deserialize, Serialize};

/// Width and depth of a chunk in blocks.
pub const CHUNK_SIZE: i32 = 16;

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Chunk column containing this position.
    pub fn chunk(self) -> ChunkPos {
        ChunkPos::new(
            (self.x.floor() as i32).div_euclid(CHUNK_SIZE),
            (self.z.floor() as i32).div_euclid(CHUNK_SIZE),
        )
    }
}

/// Chunk column coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// All chunk positions within `radius` chunks of this one (square), row by row.
    pub fn square(self, radius: i32) -> impl Iterator<Item = ChunkPos> {
        (-radius..=radius)
            .flat_map(move |dz| (-radius..=radius).map(move |dx| ChunkPos::new(self.x + dx, self.z + dz)))
    }
}

/// A position inside a named world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub position: Vec3,
}

impl Location {
    pub fn new(world: impl Into<String>, position: Vec3) -> Self {
        Self {
            world: world.into(),
            position,
        }
    }
}
