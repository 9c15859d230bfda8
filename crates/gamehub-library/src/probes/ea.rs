//! EA app / Origin: client registry entries corroborated against the
//! Windows uninstall list or the Start Menu
//!
//! The client's own registry keeps entries for uninstalled games, so an
//! entry is only accepted with physical evidence: an uninstall record whose
//! folder holds more than [`MIN_INSTALL_BYTES`], or, for games that never
//! appear in the uninstall list, a matching Start Menu shortcut.

use super::{ProbeError, SourceProbe};
use crate::registry::Registry;
use crate::title::{LaunchRef, Source, Title, TitleId};
use crate::validation::{self, MIN_INSTALL_BYTES};
use gamehub_config::HubConfig;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub const UNINSTALL_KEYS: [&str; 2] = [
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
    r"SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall",
];

pub const CLIENT_KEYS: [&str; 3] = [
    r"SOFTWARE\WOW6432Node\Origin Games",
    r"SOFTWARE\Electronic Arts\EA Games",
    r"SOFTWARE\WOW6432Node\Electronic Arts\EA Games",
];

pub struct EaProbe {
    registry: Arc<dyn Registry>,
    start_menu_roots: Vec<PathBuf>,
    min_install_bytes: u64,
}

impl EaProbe {
    pub fn new(registry: Arc<dyn Registry>, start_menu_roots: Vec<PathBuf>) -> Self {
        Self {
            registry,
            start_menu_roots,
            min_install_bytes: MIN_INSTALL_BYTES,
        }
    }

    /// Override the folder size threshold
    pub fn with_min_install_bytes(mut self, bytes: u64) -> Self {
        self.min_install_bytes = bytes;
        self
    }

    /// Cleaned display name -> install location, from the OS uninstall list
    fn uninstall_map(&self) -> HashMap<String, PathBuf> {
        let mut map = HashMap::new();

        for key in UNINSTALL_KEYS {
            let Ok(subkeys) = self.registry.subkeys(key) else {
                continue;
            };
            for sub in subkeys {
                let path = format!("{}\\{}", key, sub);
                let name = self.registry.string_value(&path, "DisplayName").ok().flatten();
                let location = self
                    .registry
                    .string_value(&path, "InstallLocation")
                    .ok()
                    .flatten();

                if let (Some(name), Some(location)) = (name, location)
                    && !name.trim().is_empty()
                    && !location.trim().is_empty()
                {
                    map.insert(validation::clean_name(&name), PathBuf::from(location));
                }
            }
        }

        map
    }

    /// Decide whether a client entry is really installed
    fn corroborate(
        &self,
        name: &str,
        uninstall: &HashMap<String, PathBuf>,
    ) -> Option<Option<PathBuf>> {
        match uninstall.get(&validation::clean_name(name)) {
            Some(path) if validation::exceeds_size(path, self.min_install_bytes) => {
                Some(Some(path.clone()))
            }
            Some(path) => {
                debug!("EA: ignoring ghost entry {} ({})", name, path.display());
                None
            }
            None if validation::has_start_menu_shortcut(&self.start_menu_roots, name) => {
                Some(None)
            }
            None => {
                debug!("EA: no evidence for {}", name);
                None
            }
        }
    }
}

impl SourceProbe for EaProbe {
    fn source(&self) -> Source {
        Source::Ea
    }

    fn discover(&self, _config: &HubConfig) -> Result<Vec<Title>, ProbeError> {
        let clients: Vec<(&str, Vec<String>)> = CLIENT_KEYS
            .iter()
            .filter_map(|key| Some((*key, self.registry.subkeys(key).ok()?)))
            .collect();

        if clients.is_empty() {
            return Err(ProbeError::SourceUnavailable(
                "No EA client registry keys".into(),
            ));
        }

        let uninstall = self.uninstall_map();
        let mut seen = HashSet::new();
        let mut titles = Vec::new();

        for (key, launch_ids) in clients {
            for launch_id in launch_ids {
                let entry = format!("{}\\{}", key, launch_id);
                let Some(name) = self
                    .registry
                    .string_value(&entry, "DisplayName")
                    .ok()
                    .flatten()
                    .filter(|name| !name.trim().is_empty())
                else {
                    continue;
                };

                if !seen.insert(TitleId::new(Source::Ea, &name)) {
                    continue;
                }

                if let Some(install_path) = self.corroborate(&name, &uninstall) {
                    info!("EA: found {}", name.trim());
                    titles.push(Title::new(&name, LaunchRef::EaGame(launch_id), install_path));
                }
            }
        }

        Ok(titles)
    }
}
