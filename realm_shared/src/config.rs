//! Configuration system.
//!
//! Server configuration lives in `properties.json` under the server root.
//! A missing file is created with defaults; missing keys fall back to their
//! per-field defaults. Invalid values (e.g. an unknown game mode) are fatal.

use std::{fmt, fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

/// File name of the server configuration, relative to the server root.
pub const CONFIG_FILE: &str = "properties.json";

/// Game mode assigned to newly joined sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameMode {
    #[serde(alias = "survival")]
    Survival,
    #[serde(alias = "creative")]
    Creative,
    #[serde(alias = "adventure")]
    Adventure,
    #[serde(alias = "spectator")]
    Spectator,
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameMode::Survival => "SURVIVAL",
            GameMode::Creative => "CREATIVE",
            GameMode::Adventure => "ADVENTURE",
            GameMode::Spectator => "SPECTATOR",
        };
        f.write_str(name)
    }
}

/// Root server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. `0.0.0.0`.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Sessions beyond this count are turned away at join.
    #[serde(default = "default_max_players", rename = "maxplayers")]
    pub max_players: usize,
    #[serde(default = "default_motd")]
    pub motd: String,
    #[serde(default = "default_submotd")]
    pub submotd: String,
    #[serde(default = "default_game_mode", rename = "gamemode")]
    pub game_mode: GameMode,
    /// World loaded at startup and used as the fallback spawn.
    #[serde(default = "default_world", rename = "defaultworld")]
    pub default_world: String,
    /// Generator name used for the default world.
    #[serde(default = "default_generator")]
    pub generator: String,
    #[serde(default, rename = "forceResourcePacks")]
    pub force_resource_packs: bool,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    19132
}

fn default_max_players() -> usize {
    20
}

fn default_motd() -> String {
    "Realm".to_string()
}

fn default_submotd() -> String {
    "A fresh Realm server".to_string()
}

fn default_game_mode() -> GameMode {
    GameMode::Creative
}

fn default_world() -> String {
    "world".to_string()
}

fn default_generator() -> String {
    "flat".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            max_players: default_max_players(),
            motd: default_motd(),
            submotd: default_submotd(),
            game_mode: default_game_mode(),
            default_world: default_world(),
            generator: default_generator(),
            force_resource_packs: false,
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads the config at `path`, writing defaults there first if it does not exist.
    ///
    /// The file is rewritten after loading so newly introduced keys show up
    /// with their defaults.
    pub fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        let cfg = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            Self::from_json_str(&raw)
                .with_context(|| format!("parse config {}", path.display()))?
        } else {
            info!(path = %path.display(), "Writing default configuration");
            Self::default()
        };
        cfg.save(path)?;
        Ok(cfg)
    }

    /// Writes the config as pretty JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, raw).with_context(|| format!("write config {}", path.display()))
    }

    /// Socket address string the transport binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
