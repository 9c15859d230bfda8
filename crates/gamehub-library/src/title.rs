//! Title record and its identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Stored value marking "cover lookup attempted, nothing found"
pub const MISSING_COVER: &str = "MISSING";

/// Platform a title was discovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    /// Steam client libraries
    Steam,
    /// Epic Games launcher manifests
    EpicGames,
    /// EA / Origin publisher client
    Ea,
    /// User-added entries from the manual games list
    Manual,
}

impl Source {
    pub const ALL: [Source; 4] = [Source::Steam, Source::EpicGames, Source::Ea, Source::Manual];

    /// Name used in identities and in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Steam => "Steam",
            Source::EpicGames => "Epic Games",
            Source::Ea => "EA",
            Source::Manual => "Other Games",
        }
    }

    /// Parse a stored source name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|source| source.as_str() == name)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a title is started within its source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LaunchRef {
    /// Numeric Steam app id
    SteamApp(u64),
    /// Epic launcher app name
    EpicApp(String),
    /// EA launch id (the client registry subkey)
    EaGame(String),
    /// Executable or install path of a manual entry
    Executable(PathBuf),
}

impl LaunchRef {
    pub fn source(&self) -> Source {
        match self {
            LaunchRef::SteamApp(_) => Source::Steam,
            LaunchRef::EpicApp(_) => Source::EpicGames,
            LaunchRef::EaGame(_) => Source::Ea,
            LaunchRef::Executable(_) => Source::Manual,
        }
    }

    /// Flat string form written to the `launch_id` column
    pub fn to_stored(&self) -> String {
        match self {
            LaunchRef::SteamApp(id) => id.to_string(),
            LaunchRef::EpicApp(app) | LaunchRef::EaGame(app) => app.clone(),
            LaunchRef::Executable(path) => path.to_string_lossy().into_owned(),
        }
    }

    /// Rebuild from the stored column. Manual entries prefer the install path.
    pub fn from_stored(source: Source, raw: &str, install_path: Option<&Path>) -> Option<Self> {
        let raw = raw.trim();
        let present = !raw.is_empty() && raw != "None";

        match source {
            Source::Steam => raw.parse().ok().map(LaunchRef::SteamApp),
            Source::EpicGames if present => Some(LaunchRef::EpicApp(raw.to_string())),
            Source::Ea if present => Some(LaunchRef::EaGame(raw.to_string())),
            Source::Manual => install_path
                .map(Path::to_path_buf)
                .or_else(|| present.then(|| PathBuf::from(raw)))
                .map(LaunchRef::Executable),
            _ => None,
        }
    }
}

/// Catalog key: `source|name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TitleId(String);

impl TitleId {
    pub fn new(source: Source, name: &str) -> Self {
        Self(format!("{}|{}", source.as_str(), name.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cover artwork state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "url", rename_all = "snake_case")]
pub enum CoverArt {
    /// Never looked up
    #[default]
    Unset,
    /// Lookup succeeded
    Resolved(String),
    /// Lookup attempted and found nothing; never retried
    Missing,
}

impl CoverArt {
    pub fn is_unset(&self) -> bool {
        matches!(self, CoverArt::Unset)
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            CoverArt::Resolved(url) => Some(url),
            _ => None,
        }
    }

    /// Value for the `grid_image_url` column
    pub fn to_stored(&self) -> Option<String> {
        match self {
            CoverArt::Unset => None,
            CoverArt::Resolved(url) => Some(url.clone()),
            CoverArt::Missing => Some(MISSING_COVER.to_string()),
        }
    }

    pub fn from_stored(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => CoverArt::Unset,
            Some(MISSING_COVER) => CoverArt::Missing,
            Some(url) => CoverArt::Resolved(url.to_string()),
        }
    }
}

/// User-recorded performance figures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub avg_fps: Option<String>,
    pub best_ping: Option<String>,
}

/// A discovered or manually added game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    name: String,
    launch: LaunchRef,

    /// Verified install directory, if the probe could confirm one
    pub install_path: Option<PathBuf>,

    pub favorite: bool,
    pub hidden: bool,

    /// Epoch seconds of the last committed session
    pub last_played: Option<i64>,
    pub playtime_seconds: u64,

    pub cover: CoverArt,
    pub stats: PerformanceStats,
}

impl Title {
    /// Create a title; the name is trimmed and the source follows the launch reference
    pub fn new(name: impl AsRef<str>, launch: LaunchRef, install_path: Option<PathBuf>) -> Self {
        Self {
            name: name.as_ref().trim().to_string(),
            launch,
            install_path,
            favorite: false,
            hidden: false,
            last_played: None,
            playtime_seconds: 0,
            cover: CoverArt::Unset,
            stats: PerformanceStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Source {
        self.launch.source()
    }

    pub fn launch(&self) -> &LaunchRef {
        &self.launch
    }

    pub fn id(&self) -> TitleId {
        TitleId::new(self.source(), &self.name)
    }

    /// URI or path handed to the OS to start the title
    pub fn launch_uri(&self) -> String {
        match &self.launch {
            LaunchRef::SteamApp(id) => format!("steam://run/{}", id),
            LaunchRef::EpicApp(app) => {
                format!("com.epicgames.launcher://apps/{}?action=launch&silent=true", app)
            }
            LaunchRef::EaGame(id) => format!("origin://launchgame/{}", id),
            LaunchRef::Executable(path) => path.to_string_lossy().into_owned(),
        }
    }

    /// Wide header artwork, available for Steam titles only
    pub fn hero_image_url(&self) -> Option<String> {
        match self.launch {
            LaunchRef::SteamApp(id) => Some(format!(
                "https://steamcdn-a.akamaihd.net/steam/apps/{}/header.jpg",
                id
            )),
            _ => None,
        }
    }
}
