//! Worlds: independently tickable simulation units.
//!
//! A world goes through `load_level_descriptor` → `open` →
//! `prepare_spawn_region` before the registry publishes it, is updated once
//! per tick while registered, and is `close`d and cleared on unload.

mod generator;
mod registry;
mod storage;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use realm_shared::{
    ecs::EntityStore,
    math::{ChunkPos, Location, Vec3, CHUNK_SIZE},
    palette::{BlockId, BlockPalette},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use generator::{EmptyGenerator, FlatGenerator, GeneratorRegistry, WorldGenerator};
pub use registry::{LoadOutcome, WorldRegistry};
pub use storage::{FileLevelStorage, LevelStorage, MemoryLevelStorage, StorageProvider};

/// Vertical extent of a chunk column in blocks.
pub const CHUNK_HEIGHT: usize = 64;

/// Chunks prepared around the spawn point, as a radius in chunks.
pub const SPAWN_REGION_RADIUS: i32 = 2;

/// Seconds simulated by one tick, used for entity motion.
const TICK_SECONDS: f32 = 0.05;

/// Persisted per-world metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDescriptor {
    pub name: String,
    pub generator: String,
    pub spawn: Vec3,
    /// World time in ticks.
    pub time: u64,
}

/// One column of blocks.
#[derive(Debug, Clone)]
pub struct Chunk {
    pos: ChunkPos,
    blocks: Vec<BlockId>,
}

impl Chunk {
    /// A chunk filled with `fill` (normally air).
    pub fn new(pos: ChunkPos, fill: BlockId) -> Self {
        let size = CHUNK_SIZE as usize;
        Self {
            pos,
            blocks: vec![fill; size * size * CHUNK_HEIGHT],
        }
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    fn index(x: usize, y: usize, z: usize) -> Option<usize> {
        let size = CHUNK_SIZE as usize;
        (x < size && z < size && y < CHUNK_HEIGHT).then(|| (y * size + z) * size + x)
    }

    pub fn block(&self, x: usize, y: usize, z: usize) -> Option<BlockId> {
        Self::index(x, y, z).map(|i| self.blocks[i])
    }

    /// Sets one block. Out-of-range coordinates are ignored.
    pub fn set_block(&mut self, x: usize, y: usize, z: usize, id: BlockId) {
        if let Some(i) = Self::index(x, y, z) {
            self.blocks[i] = id;
        }
    }

    /// Fills one horizontal layer.
    pub fn fill_layer(&mut self, y: usize, id: BlockId) {
        if y >= CHUNK_HEIGHT {
            return;
        }
        let layer = (CHUNK_SIZE * CHUNK_SIZE) as usize;
        self.blocks[y * layer..(y + 1) * layer].fill(id);
    }
}

/// Game logic attached to a world and run once per tick.
pub trait WorldSystem: Send {
    fn name(&self) -> &str;
    fn update(&mut self, tick: u64, entities: &mut EntityStore) -> anyhow::Result<()>;
}

/// A named world holding chunks and entities.
pub struct World {
    name: String,
    generator: Arc<dyn WorldGenerator>,
    storage: Box<dyn LevelStorage>,
    descriptor: Option<LevelDescriptor>,
    open: bool,
    chunks: HashMap<ChunkPos, Chunk>,
    entities: EntityStore,
    systems: Vec<Box<dyn WorldSystem>>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("name", &self.name)
            .field("generator", &self.generator.name())
            .field("open", &self.open)
            .field("chunks", &self.chunks.len())
            .field("entities", &self.entities.len())
            .finish()
    }
}

impl World {
    pub fn new(
        name: impl Into<String>,
        generator: Arc<dyn WorldGenerator>,
        storage: Box<dyn LevelStorage>,
    ) -> Self {
        Self {
            name: name.into(),
            generator,
            storage,
            descriptor: None,
            open: false,
            chunks: HashMap::new(),
            entities: EntityStore::default(),
            systems: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generator(&self) -> &Arc<dyn WorldGenerator> {
        &self.generator
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// World time in ticks, zero until the descriptor is loaded.
    pub fn time(&self) -> u64 {
        self.descriptor.as_ref().map_or(0, |d| d.time)
    }

    pub fn descriptor(&self) -> Option<&LevelDescriptor> {
        self.descriptor.as_ref()
    }

    /// Reads the persisted descriptor, or starts a fresh one.
    pub fn load_level_descriptor(&mut self) -> anyhow::Result<()> {
        let descriptor = match self
            .storage
            .load()
            .with_context(|| format!("load level descriptor of {}", self.name))?
        {
            Some(d) => {
                if !d.generator.eq_ignore_ascii_case(self.generator.name()) {
                    warn!(
                        world = %self.name,
                        saved = %d.generator,
                        requested = %self.generator.name(),
                        "Generator differs from the one the world was created with"
                    );
                }
                d
            }
            None => LevelDescriptor {
                name: self.name.clone(),
                generator: self.generator.name().to_string(),
                spawn: self.generator.spawn_position(),
                time: 0,
            },
        };
        self.descriptor = Some(descriptor);
        Ok(())
    }

    pub fn open(&mut self) -> anyhow::Result<()> {
        if self.descriptor.is_none() {
            bail!("world {} has no level descriptor", self.name);
        }
        self.storage
            .open()
            .with_context(|| format!("open world {}", self.name))?;
        self.open = true;
        Ok(())
    }

    /// Generates the chunks around the spawn point.
    pub fn prepare_spawn_region(&mut self, palette: &BlockPalette) -> anyhow::Result<()> {
        if !self.open {
            bail!("world {} is not open", self.name);
        }
        let center = self.spawn_location().position.chunk();
        for pos in center.square(SPAWN_REGION_RADIUS) {
            self.load_chunk(pos, palette);
        }
        debug!(world = %self.name, chunks = self.chunks.len(), "Spawn region prepared");
        Ok(())
    }

    /// Returns the chunk at `pos`, generating it on first access.
    pub fn load_chunk(&mut self, pos: ChunkPos, palette: &BlockPalette) -> &Chunk {
        let generator = &self.generator;
        self.chunks.entry(pos).or_insert_with(|| {
            let mut chunk = Chunk::new(pos, palette.air());
            generator.generate(&mut chunk, palette);
            chunk
        })
    }

    pub fn chunk(&self, pos: ChunkPos) -> Option<&Chunk> {
        self.chunks.get(&pos)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityStore {
        &mut self.entities
    }

    pub fn add_system(&mut self, system: Box<dyn WorldSystem>) {
        self.systems.push(system);
    }

    pub fn spawn_location(&self) -> Location {
        let spawn = self
            .descriptor
            .as_ref()
            .map_or_else(|| self.generator.spawn_position(), |d| d.spawn);
        Location::new(self.name.clone(), spawn)
    }

    /// Advances the world by one tick.
    ///
    /// Entity motion is integrated, then attached systems run in order. The
    /// first failing system aborts the rest of this world's tick.
    pub fn update(&mut self, tick: u64) -> anyhow::Result<()> {
        if !self.open {
            bail!("world {} is not open", self.name);
        }
        if let Some(d) = self.descriptor.as_mut() {
            d.time += 1;
        }
        self.entities.integrate_motion(TICK_SECONDS);
        for system in &mut self.systems {
            system
                .update(tick, &mut self.entities)
                .with_context(|| format!("system {} in world {}", system.name(), self.name))?;
        }
        Ok(())
    }

    /// Persists the descriptor and closes storage.
    pub fn close(&mut self) -> anyhow::Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        if let Some(d) = &self.descriptor {
            self.storage
                .save(d)
                .with_context(|| format!("save world {}", self.name))?;
        }
        self.storage
            .close()
            .with_context(|| format!("close world {}", self.name))
    }

    /// Releases in-memory chunk and entity state.
    pub fn clear_chunks(&mut self) {
        self.chunks.clear();
        self.entities.clear();
    }
}
