//! Steam: registry install root, library folders, `appmanifest_*.acf`

use super::{ProbeError, SourceProbe};
use crate::registry::Registry;
use crate::title::{LaunchRef, Source, Title};
use crate::vdf;
use gamehub_config::HubConfig;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const STEAM_REGISTRY_KEY: &str = r"SOFTWARE\WOW6432Node\Valve\Steam";
pub const MANIFEST_PREFIX: &str = "appmanifest_";
pub const MANIFEST_SUFFIX: &str = ".acf";

const STEAMAPPS: &str = "steamapps";
const LIBRARY_FOLDERS: &str = "libraryfolders.vdf";

/// Whether a file name looks like a Steam app manifest
pub fn is_app_manifest(file_name: &str) -> bool {
    file_name.starts_with(MANIFEST_PREFIX) && file_name.ends_with(MANIFEST_SUFFIX)
}

pub struct SteamProbe {
    registry: Arc<dyn Registry>,
    root_override: Option<PathBuf>,
}

impl SteamProbe {
    pub fn new(registry: Arc<dyn Registry>, root_override: Option<PathBuf>) -> Self {
        Self {
            registry,
            root_override,
        }
    }

    /// Steam client install root
    pub fn install_root(&self) -> Result<PathBuf, ProbeError> {
        if let Some(root) = &self.root_override {
            return Ok(root.clone());
        }

        self.registry
            .string_value(STEAM_REGISTRY_KEY, "InstallPath")
            .map_err(|e| ProbeError::SourceUnavailable(format!("Steam: {}", e)))?
            .map(PathBuf::from)
            .ok_or_else(|| ProbeError::SourceUnavailable("Steam InstallPath not set".into()))
    }

    /// Primary `steamapps` plus every library listed in `libraryfolders.vdf`
    pub fn library_dirs(&self) -> Result<Vec<PathBuf>, ProbeError> {
        let primary = self.install_root()?.join(STEAMAPPS);
        let mut dirs = BTreeSet::from([primary.clone()]);

        let descriptor = primary.join(LIBRARY_FOLDERS);
        if descriptor.exists() {
            match read_library_folders(&descriptor) {
                Ok(paths) => dirs.extend(paths.into_iter().map(|p| p.join(STEAMAPPS))),
                Err(e) => warn!("Skipping library folders: {}", e),
            }
        }

        Ok(dirs.into_iter().collect())
    }
}

impl SourceProbe for SteamProbe {
    fn source(&self) -> Source {
        Source::Steam
    }

    fn discover(&self, config: &HubConfig) -> Result<Vec<Title>, ProbeError> {
        let extra: Vec<&PathBuf> = config
            .scan_paths
            .iter()
            .filter(|path| path.is_dir() && path.file_name().is_some_and(|n| n == STEAMAPPS))
            .collect();

        let mut dirs: BTreeSet<PathBuf> = match self.library_dirs() {
            Ok(dirs) => dirs.into_iter().collect(),
            Err(e) if extra.is_empty() => return Err(e),
            Err(e) => {
                warn!("Steam client not found ({}), scanning configured paths only", e);
                BTreeSet::new()
            }
        };
        dirs.extend(extra.into_iter().cloned());

        let mut titles = Vec::new();
        for dir in dirs.iter().filter(|dir| dir.is_dir()) {
            titles.extend(scan_steamapps(dir));
        }
        Ok(titles)
    }
}

/// Read every app manifest in a `steamapps` directory, skipping bad ones
pub fn scan_steamapps(dir: &Path) -> Vec<Title> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut titles = Vec::new();
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_app_manifest(&name) {
            continue;
        }

        match read_app_manifest(&entry.path(), dir) {
            Ok(title) => {
                debug!("Steam: {} ({})", title.name(), title.launch_uri());
                titles.push(title);
            }
            Err(e) => warn!("{}", e),
        }
    }
    titles
}

fn read_app_manifest(path: &Path, steamapps: &Path) -> Result<Title, ProbeError> {
    let raw = fs::read_to_string(path)?;
    let doc = vdf::parse(&raw).map_err(|e| ProbeError::manifest(path, e))?;
    let state = doc
        .get_block("AppState")
        .ok_or_else(|| ProbeError::manifest(path, "no AppState block"))?;

    let name = state
        .get_str("name")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ProbeError::manifest(path, "no name"))?;
    let app_id: u64 = state
        .get_str("appid")
        .and_then(|id| id.trim().parse().ok())
        .ok_or_else(|| ProbeError::manifest(path, "missing or non-numeric appid"))?;
    let install_dir = state.get_str("installdir").unwrap_or_default();

    Ok(Title::new(
        name,
        LaunchRef::SteamApp(app_id),
        Some(steamapps.join("common").join(install_dir)),
    ))
}

fn read_library_folders(path: &Path) -> Result<Vec<PathBuf>, ProbeError> {
    let raw = fs::read_to_string(path)?;
    let doc = vdf::parse(&raw).map_err(|e| ProbeError::manifest(path, e))?;
    let folders = doc
        .get_block("libraryfolders")
        .ok_or_else(|| ProbeError::manifest(path, "no libraryfolders block"))?;

    Ok(folders
        .iter()
        .filter_map(|(_, value)| value.as_block()?.get_str("path"))
        .map(PathBuf::from)
        .collect())
}
