//! Loaded worlds, addressed by case-insensitive name.
//!
//! Worlds are kept in load order, which is also the order they are updated
//! in every tick. A world only becomes visible here once it is fully
//! initialized.

use std::sync::Arc;

use realm_shared::palette::BlockPalette;
use tracing::{error, info, warn};

use super::{LevelStorage, StorageProvider, World, WorldGenerator};

/// Result of [`WorldRegistry::load_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// A world with the same name (ignoring case) is registered; it was left untouched.
    AlreadyLoaded,
    /// Descriptor, open or spawn preparation failed; nothing was registered.
    Failed,
}

impl LoadOutcome {
    pub fn is_loaded(self) -> bool {
        self == LoadOutcome::Loaded
    }
}

pub struct WorldRegistry {
    worlds: Vec<World>,
    default: Option<String>,
    storage: StorageProvider,
    palette: Arc<BlockPalette>,
}

impl WorldRegistry {
    pub fn new(storage: StorageProvider, palette: Arc<BlockPalette>) -> Self {
        Self {
            worlds: Vec::new(),
            default: None,
            storage,
            palette,
        }
    }

    pub fn palette(&self) -> &Arc<BlockPalette> {
        &self.palette
    }

    /// Loads a world through the registry's storage provider.
    pub fn load_or_create(&mut self, name: &str, generator: Arc<dyn WorldGenerator>) -> LoadOutcome {
        if self.contains(name) {
            warn!(world = %name, "World was already loaded");
            return LoadOutcome::AlreadyLoaded;
        }
        let storage = self.storage.create(name);
        self.load_or_create_with(name, generator, storage)
    }

    /// Loads a world backed by `storage`.
    ///
    /// Descriptor, open and spawn preparation must all succeed before the
    /// world is published.
    pub fn load_or_create_with(
        &mut self,
        name: &str,
        generator: Arc<dyn WorldGenerator>,
        storage: Box<dyn LevelStorage>,
    ) -> LoadOutcome {
        if self.contains(name) {
            warn!(world = %name, "World was already loaded");
            return LoadOutcome::AlreadyLoaded;
        }

        let mut world = World::new(name, generator, storage);
        if let Err(e) = prepare(&mut world, &self.palette) {
            error!(world = %name, error = %format!("{e:#}"), "Failed to load world");
            if world.is_open() {
                if let Err(e) = world.close() {
                    warn!(world = %name, error = %format!("{e:#}"), "Failed to close partially loaded world");
                }
            }
            return LoadOutcome::Failed;
        }

        self.worlds.push(world);
        info!(world = %name, "World loaded");
        LoadOutcome::Loaded
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.worlds
            .iter()
            .position(|w| w.name().eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&World> {
        self.position(name).map(|i| &self.worlds[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut World> {
        self.position(name).map(move |i| &mut self.worlds[i])
    }

    /// Names in registry order.
    pub fn names(&self) -> Vec<String> {
        self.worlds.iter().map(|w| w.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &World> {
        self.worlds.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut World> {
        self.worlds.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }

    /// Marks a registered world as the default. Returns false if it is not loaded.
    pub fn set_default(&mut self, name: &str) -> bool {
        match self.get(name) {
            Some(world) => {
                self.default = Some(world.name().to_string());
                true
            }
            None => false,
        }
    }

    pub fn default_world(&self) -> Option<&World> {
        self.default.as_deref().and_then(|name| self.get(name))
    }

    pub fn is_default(&self, name: &str) -> bool {
        self.default
            .as_deref()
            .is_some_and(|d| d.eq_ignore_ascii_case(name))
    }

    /// Closes the world, releases its chunks and removes it.
    ///
    /// Notification and evacuation of sessions are the caller's job and must
    /// happen before this. A failing close is logged; the world is removed
    /// regardless.
    pub fn unload(&mut self, name: &str) -> Option<World> {
        let index = self.position(name)?;
        let mut world = self.worlds.remove(index);
        if let Err(e) = world.close() {
            error!(world = %world.name(), error = %format!("{e:#}"), "Failed to close world");
        }
        world.clear_chunks();
        if self.is_default(name) {
            self.default = None;
        }
        info!(world = %world.name(), "World unloaded");
        Some(world)
    }
}

fn prepare(world: &mut World, palette: &BlockPalette) -> anyhow::Result<()> {
    world.load_level_descriptor()?;
    world.open()?;
    world.prepare_spawn_region(palette)
}
