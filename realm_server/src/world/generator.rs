//! Terrain generators.
//!
//! Generators are registered as instances under a case-insensitive name and
//! shared between every world that uses them.

use std::{collections::HashMap, sync::Arc};

use realm_shared::{math::Vec3, palette::BlockPalette};
use tracing::warn;

use super::Chunk;

/// Produces terrain for one chunk at a time.
pub trait WorldGenerator: Send + Sync {
    fn name(&self) -> &str;
    /// Spawn point of a freshly created world.
    fn spawn_position(&self) -> Vec3;
    fn generate(&self, chunk: &mut Chunk, palette: &BlockPalette);
}

/// Leaves every chunk as air.
#[derive(Debug, Default)]
pub struct EmptyGenerator;

impl WorldGenerator for EmptyGenerator {
    fn name(&self) -> &str {
        "empty"
    }

    fn spawn_position(&self) -> Vec3 {
        Vec3::new(0.5, 32.0, 0.5)
    }

    fn generate(&self, _chunk: &mut Chunk, _palette: &BlockPalette) {}
}

/// Bedrock, two layers of dirt, grass on top.
#[derive(Debug, Default)]
pub struct FlatGenerator;

impl FlatGenerator {
    const LAYERS: [&'static str; 4] = [
        "minecraft:bedrock",
        "minecraft:dirt",
        "minecraft:dirt",
        "minecraft:grass",
    ];
}

impl WorldGenerator for FlatGenerator {
    fn name(&self) -> &str {
        "flat"
    }

    fn spawn_position(&self) -> Vec3 {
        Vec3::new(0.5, Self::LAYERS.len() as f32, 0.5)
    }

    fn generate(&self, chunk: &mut Chunk, palette: &BlockPalette) {
        for (y, block) in Self::LAYERS.iter().enumerate() {
            // A custom palette may lack a layer's block; leave that layer as air.
            if let Some(id) = palette.id(block) {
                chunk.fill_layer(y, id);
            }
        }
    }
}

/// Generators by lower-cased name.
#[derive(Default)]
pub struct GeneratorRegistry {
    generators: HashMap<String, Arc<dyn WorldGenerator>>,
}

impl GeneratorRegistry {
    /// Registry holding the built-in `empty` and `flat` generators.
    pub fn with_builtin() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(EmptyGenerator));
        registry.register(Arc::new(FlatGenerator));
        registry
    }

    /// Registers under the generator's own name. A taken name is kept as is.
    pub fn register(&mut self, generator: Arc<dyn WorldGenerator>) -> bool {
        let key = generator.name().to_lowercase();
        if self.generators.contains_key(&key) {
            warn!(generator = %key, "Generator already registered");
            return false;
        }
        self.generators.insert(key, generator);
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn WorldGenerator>> {
        self.generators.get(&name.to_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.generators.keys().cloned().collect();
        names.sort();
        names
    }
}
