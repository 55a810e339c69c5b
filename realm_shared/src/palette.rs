//! Static block palette.
//!
//! Maps block names to dense runtime ids. The palette is built once at
//! startup, either from `data/block_palette.json` or from the built-in table,
//! and is read-only afterwards.

use std::{collections::HashMap, fs, path::Path};

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::debug;

/// Dense runtime id of a block state.
pub type BlockId = u16;

/// Name of the block every palette must contain at id 0.
pub const AIR: &str = "minecraft:air";

const BUILTIN: &[&str] = &[
    AIR,
    "minecraft:stone",
    "minecraft:dirt",
    "minecraft:grass",
    "minecraft:bedrock",
];

#[derive(Deserialize)]
struct PaletteFile {
    blocks: Vec<String>,
}

/// Read-only block palette.
#[derive(Debug, Clone)]
pub struct BlockPalette {
    names: Vec<String>,
    ids: HashMap<String, BlockId>,
}

impl BlockPalette {
    /// Palette with the built-in block table.
    pub fn builtin() -> Self {
        let names: Vec<String> = BUILTIN.iter().map(|s| s.to_string()).collect();
        let ids = names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), id as BlockId))
            .collect();
        Self { names, ids }
    }

    /// Builds a palette from names in id order. `names[0]` must be air.
    pub fn from_names(names: Vec<String>) -> anyhow::Result<Self> {
        if names.first().map(String::as_str) != Some(AIR) {
            bail!("block palette must start with {AIR}");
        }
        if names.len() > BlockId::MAX as usize {
            bail!("block palette has {} entries", names.len());
        }
        let mut ids = HashMap::with_capacity(names.len());
        for (id, name) in names.iter().enumerate() {
            if ids.insert(name.clone(), id as BlockId).is_some() {
                bail!("duplicate block {name} in palette");
            }
        }
        Ok(Self { names, ids })
    }

    /// Parses `{ "blocks": [..] }`.
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let file: PaletteFile = serde_json::from_str(s).context("parse block palette")?;
        Self::from_names(file.blocks)
    }

    /// Loads the palette file if present, otherwise the built-in table.
    pub fn load_or_builtin(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No palette file, using built-in blocks");
            return Ok(Self::builtin());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read block palette {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("load {}", path.display()))
    }

    pub fn id(&self, name: &str) -> Option<BlockId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: BlockId) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn air(&self) -> BlockId {
        0
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
