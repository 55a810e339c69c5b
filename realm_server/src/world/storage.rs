//! World persistence.
//!
//! Only the level descriptor is persisted; chunk data is regenerated from the
//! world's generator on load.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;

use super::LevelDescriptor;

const LEVEL_FILE: &str = "level.json";

/// Backing store of one world.
pub trait LevelStorage: Send {
    /// Reads the saved descriptor, `None` if the world has never been saved.
    fn load(&mut self) -> anyhow::Result<Option<LevelDescriptor>>;
    fn open(&mut self) -> anyhow::Result<()>;
    fn save(&mut self, descriptor: &LevelDescriptor) -> anyhow::Result<()>;
    fn close(&mut self) -> anyhow::Result<()>;
}

/// Stores `level.json` inside a per-world directory.
#[derive(Debug, Clone)]
pub struct FileLevelStorage {
    dir: PathBuf,
}

impl FileLevelStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn level_path(&self) -> PathBuf {
        self.dir.join(LEVEL_FILE)
    }
}

impl LevelStorage for FileLevelStorage {
    fn load(&mut self) -> anyhow::Result<Option<LevelDescriptor>> {
        let path = self.level_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let descriptor =
            serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
        Ok(Some(descriptor))
    }

    fn open(&mut self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| format!("create {}", self.dir.display()))
    }

    fn save(&mut self, descriptor: &LevelDescriptor) -> anyhow::Result<()> {
        let path = self.level_path();
        let raw = serde_json::to_string_pretty(descriptor).context("serialize level descriptor")?;
        fs::write(&path, raw).with_context(|| format!("write {}", path.display()))
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Keeps the descriptor in memory for the lifetime of the world.
#[derive(Debug, Clone, Default)]
pub struct MemoryLevelStorage {
    saved: Option<LevelDescriptor>,
}

impl LevelStorage for MemoryLevelStorage {
    fn load(&mut self) -> anyhow::Result<Option<LevelDescriptor>> {
        Ok(self.saved.clone())
    }

    fn open(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn save(&mut self, descriptor: &LevelDescriptor) -> anyhow::Result<()> {
        self.saved = Some(descriptor.clone());
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Chooses the storage a registry creates for a newly loaded world.
#[derive(Debug, Clone)]
pub enum StorageProvider {
    /// One sub-directory per world, named after the lower-cased world name.
    Directory(PathBuf),
    /// Nothing outlives the process.
    Memory,
}

impl StorageProvider {
    pub fn directory(root: &Path) -> Self {
        StorageProvider::Directory(root.to_path_buf())
    }

    pub fn create(&self, world: &str) -> Box<dyn LevelStorage> {
        match self {
            StorageProvider::Directory(root) => {
                Box::new(FileLevelStorage::new(root.join(world.to_lowercase())))
            }
            StorageProvider::Memory => Box::new(MemoryLevelStorage::default()),
        }
    }
}
