//! Resource packs offered to clients at login.
//!
//! Each pack is a directory under `resource_packs/` with a `manifest.json`
//! naming its uuid, version and display name.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use realm_shared::net::ResourcePackEntry;
use serde::Deserialize;
use tracing::{info, warn};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Deserialize)]
struct Manifest {
    uuid: String,
    version: String,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePack {
    pub uuid: String,
    pub version: String,
    pub name: String,
    pub path: PathBuf,
    /// Total size of the pack's files in bytes.
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct ResourcePackManager {
    packs: Vec<ResourcePack>,
}

impl ResourcePackManager {
    /// Scans `dir` for packs. A missing directory means no packs; a pack with
    /// a broken manifest is skipped with a warning.
    pub fn load_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut manager = Self::default();
        if !dir.is_dir() {
            return Ok(manager);
        }

        let mut dirs: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("read {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        for path in dirs {
            match load_pack(&path) {
                Ok(pack) => {
                    info!(pack = %pack.name, uuid = %pack.uuid, version = %pack.version, "Resource pack loaded");
                    manager.packs.push(pack);
                }
                Err(e) => warn!(path = %path.display(), error = %format!("{e:#}"), "Skipping resource pack"),
            }
        }
        Ok(manager)
    }

    pub fn packs(&self) -> &[ResourcePack] {
        &self.packs
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Pack list as announced to clients.
    pub fn entries(&self) -> Vec<ResourcePackEntry> {
        self.packs
            .iter()
            .map(|p| ResourcePackEntry {
                uuid: p.uuid.clone(),
                version: p.version.clone(),
                size: p.size,
            })
            .collect()
    }
}

fn load_pack(dir: &Path) -> anyhow::Result<ResourcePack> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&manifest_path)
        .with_context(|| format!("read {}", manifest_path.display()))?;
    let manifest: Manifest = serde_json::from_str(&raw)
        .with_context(|| format!("parse {}", manifest_path.display()))?;
    Ok(ResourcePack {
        uuid: manifest.uuid,
        version: manifest.version,
        name: manifest.name,
        path: dir.to_path_buf(),
        size: dir_size(dir)?,
    })
}

fn dir_size(dir: &Path) -> anyhow::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry?;
        let meta = entry.metadata()?;
        total += if meta.is_dir() {
            dir_size(&entry.path())?
        } else {
            meta.len()
        };
    }
    Ok(total)
}
