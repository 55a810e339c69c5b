//! Startup sequence.
//!
//! Order: configuration, block palette, resource packs, generators, task
//! queue and plugins, default world, transport. Configuration problems abort
//! startup; a default world that fails to load does not.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use realm_shared::{
    config::{ServerConfig, CONFIG_FILE},
    palette::BlockPalette,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    perf::PerformanceTracker,
    player::PlayerRegistry,
    plugin::{Plugin, PluginManager},
    resource_pack::ResourcePackManager,
    scheduler::TickScheduler,
    server::{RunningFlag, Server},
    tablist::Tablist,
    task::{TaskQueue, TaskSender},
    transport::Transport,
    world::{GeneratorRegistry, StorageProvider, WorldGenerator, WorldRegistry},
};

pub const PALETTE_FILE: &str = "data/block_palette.json";
pub const RESOURCE_PACK_DIR: &str = "resource_packs";
pub const WORLDS_DIR: &str = "worlds";

/// Builds a [`Server`] rooted at a directory.
pub struct Launcher {
    root: PathBuf,
    config: Option<ServerConfig>,
    storage: Option<StorageProvider>,
    plugins: Vec<Box<dyn Plugin>>,
    generators: Vec<Arc<dyn WorldGenerator>>,
}

impl Launcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: None,
            storage: None,
            plugins: Vec::new(),
            generators: Vec::new(),
        }
    }

    /// Uses `config` instead of reading `properties.json`.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides the default on-disk world storage under `worlds/`.
    pub fn storage(mut self, storage: StorageProvider) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn WorldGenerator>) -> Self {
        self.generators.push(generator);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs every startup step except binding the transport.
    pub fn build(self) -> anyhow::Result<(Server, TaskQueue<Server>)> {
        let config = match self.config {
            Some(config) => config,
            None => ServerConfig::load_or_create(&self.root.join(CONFIG_FILE))
                .context("load server configuration")?,
        };
        info!(
            motd = %config.motd,
            max_players = config.max_players,
            game_mode = %config.game_mode,
            "Configuration loaded"
        );

        let palette = BlockPalette::load_or_builtin(&self.root.join(PALETTE_FILE))
            .context("load block palette")?;
        info!(blocks = palette.len(), "Block palette loaded");

        let resource_packs = ResourcePackManager::load_dir(&self.root.join(RESOURCE_PACK_DIR))
            .context("load resource packs")?;
        info!(packs = resource_packs.len(), "Resource packs loaded");

        let mut generators = GeneratorRegistry::with_builtin();
        for generator in self.generators {
            generators.register(generator);
        }
        let overworld_generator = generators.get(&config.generator).with_context(|| {
            format!(
                "unknown generator '{}' (available: {})",
                config.generator,
                generators.names().join(", ")
            )
        })?;

        let (queue, tasks): (TaskQueue<Server>, TaskSender<Server>) = TaskQueue::new();
        let mut plugins = PluginManager::default();
        for plugin in self.plugins {
            plugins.register(plugin);
        }

        let storage = self
            .storage
            .unwrap_or_else(|| StorageProvider::directory(&self.root.join(WORLDS_DIR)));
        let worlds = WorldRegistry::new(storage, Arc::new(palette));

        let mut server = Server {
            config,
            server_id: Uuid::new_v4().as_u64_pair().0,
            running: RunningFlag::default(),
            perf: PerformanceTracker::default(),
            players: PlayerRegistry::default(),
            tablist: Tablist::default(),
            worlds,
            generators,
            overworld_generator,
            plugins,
            resource_packs,
            tasks,
            transport: None,
            console: None,
        };
        server.enable_plugins();
        server.load_default_world();
        info!(server_id = server.server_id(), "Server initialized");
        Ok((server, queue))
    }

    /// Full startup. The returned scheduler is ready to [`run`](TickScheduler::run).
    pub async fn start(self) -> anyhow::Result<TickScheduler> {
        let (mut server, queue) = self.build()?;
        let addr = server.config().bind_addr();
        match Transport::bind(&addr, server.tasks().clone()).await {
            Ok(transport) => server.attach_transport(transport),
            Err(e) => {
                server.shutdown();
                return Err(e);
            }
        }
        Ok(TickScheduler::new(server, queue))
    }
}

/// Submits a shutdown when the process receives Ctrl-C.
pub fn install_signal_handler(tasks: TaskSender<Server>, running: RunningFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        if running.is_running() {
            info!("Termination signal received");
            tasks.submit(|server: &mut Server| server.shutdown());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("realm-launcher-{}", Uuid::new_v4()))
    }

    #[test]
    fn fresh_root_gets_config_and_world_on_disk() {
        let root = temp_root();
        let (mut server, _queue) = Launcher::new(&root).build().unwrap();

        assert!(root.join(CONFIG_FILE).exists());
        assert_eq!(server.worlds().default_world().unwrap().name(), "world");

        server.shutdown();
        assert!(root.join(WORLDS_DIR).join("world").join("level.json").exists());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn unknown_generator_is_fatal() {
        let result = Launcher::new(temp_root())
            .config(ServerConfig {
                generator: "amplified".into(),
                ..ServerConfig::default()
            })
            .storage(StorageProvider::Memory)
            .build();
        let err = result.err().unwrap();
        assert!(format!("{err:#}").contains("unknown generator 'amplified'"));
    }

    #[test]
    fn invalid_game_mode_is_fatal() {
        let root = temp_root();
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(CONFIG_FILE), r#"{"gamemode":"HARDCORE"}"#).unwrap();

        assert!(Launcher::new(&root).build().is_err());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn custom_generator_can_back_the_default_world() {
        struct Void;
        impl WorldGenerator for Void {
            fn name(&self) -> &str {
                "void"
            }
            fn spawn_position(&self) -> realm_shared::math::Vec3 {
                realm_shared::math::Vec3::new(0.0, 100.0, 0.0)
            }
            fn generate(&self, _chunk: &mut crate::world::Chunk, _palette: &BlockPalette) {}
        }

        let (server, _queue) = Launcher::new(temp_root())
            .config(ServerConfig {
                generator: "VOID".into(),
                ..ServerConfig::default()
            })
            .storage(StorageProvider::Memory)
            .generator(Arc::new(Void))
            .build()
            .unwrap();

        let spawn = server.worlds().default_world().unwrap().spawn_location();
        assert_eq!(spawn.position.y, 100.0);
    }
}
