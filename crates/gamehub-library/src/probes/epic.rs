//! Epic Games launcher: JSON `.item` manifests

use super::{ProbeError, SourceProbe};
use crate::title::{LaunchRef, Source, Title};
use gamehub_config::HubConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const ITEM_SUFFIX: &str = ".item";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemManifest {
    display_name: String,
    app_name: String,
    #[serde(default)]
    install_location: Option<String>,
}

pub struct EpicProbe {
    manifests_dir: PathBuf,
}

impl EpicProbe {
    pub fn new(manifests_dir: PathBuf) -> Self {
        Self { manifests_dir }
    }
}

impl SourceProbe for EpicProbe {
    fn source(&self) -> Source {
        Source::EpicGames
    }

    fn discover(&self, _config: &HubConfig) -> Result<Vec<Title>, ProbeError> {
        if !self.manifests_dir.is_dir() {
            return Err(ProbeError::SourceUnavailable(format!(
                "Epic manifests not found at {}",
                self.manifests_dir.display()
            )));
        }

        let mut titles = Vec::new();
        for entry in fs::read_dir(&self.manifests_dir)?.filter_map(Result::ok) {
            let path = entry.path();
            if !entry.file_name().to_string_lossy().ends_with(ITEM_SUFFIX) {
                continue;
            }

            match read_item(&path) {
                Ok(title) => {
                    debug!("Epic: {}", title.name());
                    titles.push(title);
                }
                Err(e) => warn!("{}", e),
            }
        }

        Ok(titles)
    }
}

fn read_item(path: &Path) -> Result<Title, ProbeError> {
    let raw = fs::read_to_string(path)?;
    let item: ItemManifest =
        serde_json::from_str(&raw).map_err(|e| ProbeError::manifest(path, e))?;

    if item.display_name.trim().is_empty() {
        return Err(ProbeError::manifest(path, "empty DisplayName"));
    }

    Ok(Title::new(
        &item.display_name,
        LaunchRef::EpicApp(item.app_name),
        item.install_location
            .filter(|location| !location.is_empty())
            .map(PathBuf::from),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reads_item_manifests() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("A1B2.item"),
            r#"{"DisplayName": "Alan Wake 2", "AppName": "Dill", "InstallLocation": "C:\\Games\\AlanWake2"}"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.item"), "{ not json").unwrap();
        fs::write(dir.path().join("readme.txt"), "ignored").unwrap();

        let titles = EpicProbe::new(dir.path().to_path_buf())
            .discover(&HubConfig::default())
            .unwrap();

        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].name(), "Alan Wake 2");
        assert_eq!(titles[0].launch(), &LaunchRef::EpicApp("Dill".into()));
        assert_eq!(
            titles[0].install_path,
            Some(PathBuf::from(r"C:\Games\AlanWake2"))
        );
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let probe = EpicProbe::new(dir.path().join("Manifests"));
        assert!(matches!(
            probe.discover(&HubConfig::default()),
            Err(ProbeError::SourceUnavailable(_))
        ));
    }
}
