//! User-maintained `manual_games.json` (name -> executable path)

use super::{ProbeError, SourceProbe};
use crate::title::{LaunchRef, Source, Title};
use gamehub_config::HubConfig;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The manual games list file
#[derive(Debug, Clone)]
pub struct ManualList {
    path: PathBuf,
}

impl ManualList {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries; a missing file is an empty list
    pub fn load(&self) -> Result<BTreeMap<String, PathBuf>, ProbeError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let raw = fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw).map_err(|e| ProbeError::manifest(&self.path, e))
    }

    fn save(&self, entries: &BTreeMap<String, PathBuf>) -> Result<(), ProbeError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json =
            serde_json::to_string_pretty(entries).map_err(|e| ProbeError::manifest(&self.path, e))?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Add or replace an entry
    pub fn add(&self, name: &str, path: &Path) -> Result<(), ProbeError> {
        let mut entries = self.load()?;
        entries.insert(name.trim().to_string(), path.to_path_buf());
        self.save(&entries)?;
        info!("Added manual game {} -> {}", name.trim(), path.display());
        Ok(())
    }

    /// Remove an entry, returning whether it existed
    pub fn remove(&self, name: &str) -> Result<bool, ProbeError> {
        let mut entries = self.load()?;
        if entries.remove(name.trim()).is_none() {
            return Ok(false);
        }
        self.save(&entries)?;
        info!("Removed manual game {}", name.trim());
        Ok(true)
    }
}

pub struct ManualProbe {
    list: ManualList,
}

impl ManualProbe {
    pub fn new(list: ManualList) -> Self {
        Self { list }
    }
}

impl SourceProbe for ManualProbe {
    fn source(&self) -> Source {
        Source::Manual
    }

    fn discover(&self, _config: &HubConfig) -> Result<Vec<Title>, ProbeError> {
        let titles = self
            .list
            .load()?
            .into_iter()
            .filter(|(name, path)| {
                let keep = !name.trim().is_empty() && path.exists();
                if !keep {
                    debug!("Manual: skipping {} ({} missing)", name, path.display());
                }
                keep
            })
            .map(|(name, path)| Title::new(name, LaunchRef::Executable(path.clone()), Some(path)))
            .collect();

        Ok(titles)
    }
}
