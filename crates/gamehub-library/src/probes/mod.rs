//! Source probes: per-platform discovery of installed titles

mod ea;
mod epic;
mod manual;
mod steam;

pub use ea::EaProbe;
pub use epic::EpicProbe;
pub use manual::{ManualList, ManualProbe};
pub use steam::SteamProbe;

use crate::registry::{Registry, RegistryError};
use crate::title::{Source, Title};
use gamehub_config::{DataDir, HubConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Malformed manifest {path}: {reason}")]
    ManifestParse { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl ProbeError {
    pub(crate) fn manifest(path: &Path, reason: impl ToString) -> Self {
        ProbeError::ManifestParse {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// A discovery routine for one source.
///
/// Implementations do blocking filesystem and registry work; the scanner
/// runs them on the blocking pool.
pub trait SourceProbe: Send + Sync {
    fn source(&self) -> Source;

    fn discover(&self, config: &HubConfig) -> Result<Vec<Title>, ProbeError>;
}

/// Filesystem locations the probes and the change watcher look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocations {
    /// Steam install root; looked up in the registry when `None`
    pub steam_root: Option<PathBuf>,

    /// Epic launcher `.item` manifest directory
    pub epic_manifests: PathBuf,

    /// Per-machine and per-user Start Menu program trees
    pub start_menu_roots: Vec<PathBuf>,

    /// Application data directory
    pub data_dir: PathBuf,

    /// The user's manual games list
    pub manual_games_file: PathBuf,
}

impl SourceLocations {
    /// Standard Windows locations derived from the environment
    pub fn from_env(data: &DataDir) -> Self {
        let program_data = std::env::var_os("ProgramData")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"));

        let mut start_menu_roots = vec![program_data.join(START_MENU_PROGRAMS)];
        if let Some(app_data) = std::env::var_os("APPDATA") {
            start_menu_roots.push(PathBuf::from(app_data).join(START_MENU_PROGRAMS));
        }

        Self {
            steam_root: None,
            epic_manifests: program_data
                .join("Epic")
                .join("EpicGamesLauncher")
                .join("Data")
                .join("Manifests"),
            start_menu_roots,
            data_dir: data.root().to_path_buf(),
            manual_games_file: data.manual_games_file(),
        }
    }

    /// The four standard probes in scan order
    pub fn probes(&self, registry: Arc<dyn Registry>) -> Vec<Arc<dyn SourceProbe>> {
        vec![
            Arc::new(SteamProbe::new(registry.clone(), self.steam_root.clone())),
            Arc::new(EpicProbe::new(self.epic_manifests.clone())),
            Arc::new(EaProbe::new(registry, self.start_menu_roots.clone())),
            Arc::new(ManualProbe::new(ManualList::new(
                self.manual_games_file.clone(),
            ))),
        ]
    }

    /// Directories worth watching for library changes
    pub fn watch_paths(&self, registry: Arc<dyn Registry>, config: &HubConfig) -> Vec<PathBuf> {
        let steam = SteamProbe::new(registry, self.steam_root.clone());
        let mut paths = steam.library_dirs().unwrap_or_default();
        paths.push(self.epic_manifests.clone());
        paths.extend(config.scan_paths.iter().cloned());
        paths.push(self.data_dir.clone());

        paths.sort();
        paths.dedup();
        paths.retain(|path| path.is_dir());
        paths
    }
}

const START_MENU_PROGRAMS: &str = r"Microsoft\Windows\Start Menu\Programs";
