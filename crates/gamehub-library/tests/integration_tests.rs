//! Integration tests for discovery, reconciliation and persistence

use gamehub_config::{DataDir, HubConfig};
use gamehub_library::probes::{ManualList, SourceLocations};
use gamehub_library::registry::MemoryRegistry;
use gamehub_library::{
    CoverArt, FieldUpdate, GameDatabase, LaunchRef, Library, LibraryEvent, Refresher, Scanner,
    Source, SteamGridDb, TitleId,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A fake machine: a Steam library, Epic manifests and a data directory
struct TestEnvironment {
    temp_dir: TempDir,
    steam_root: PathBuf,
    epic_manifests: PathBuf,
    data: DataDir,
}

impl TestEnvironment {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let steam_root = temp_dir.path().join("Steam");
        let epic_manifests = temp_dir.path().join("Epic").join("Manifests");
        let data = DataDir::new(temp_dir.path().join("Game Hub"));

        fs::create_dir_all(steam_root.join("steamapps")).unwrap();
        fs::create_dir_all(&epic_manifests).unwrap();
        data.ensure().unwrap();

        Self {
            temp_dir,
            steam_root,
            epic_manifests,
            data,
        }
    }

    fn add_steam_app(&self, app_id: u64, name: &str) {
        let body = format!(
            "\"AppState\"\n{{\n\t\"appid\"\t\t\"{}\"\n\t\"name\"\t\t\"{}\"\n\t\"installdir\"\t\t\"{}\"\n}}\n",
            app_id, name, name
        );
        fs::write(
            self.steam_root
                .join("steamapps")
                .join(format!("appmanifest_{}.acf", app_id)),
            body,
        )
        .unwrap();
    }

    fn epic_item(&self, app: &str) -> PathBuf {
        self.epic_manifests.join(format!("{}.item", app))
    }

    fn add_epic_app(&self, app: &str, name: &str) {
        let body = format!(
            r#"{{"DisplayName": "{}", "AppName": "{}", "InstallLocation": "C:\\Games\\{}"}}"#,
            name, app, app
        );
        fs::write(self.epic_item(app), body).unwrap();
    }

    fn add_manual_exe(&self, name: &str) -> PathBuf {
        let exe = self.temp_dir.path().join(format!("{}.exe", name));
        fs::write(&exe, b"MZ").unwrap();
        self.manual_list().add(name, &exe).unwrap();
        exe
    }

    fn manual_list(&self) -> ManualList {
        ManualList::new(self.data.manual_games_file())
    }

    fn locations(&self) -> SourceLocations {
        SourceLocations {
            steam_root: Some(self.steam_root.clone()),
            epic_manifests: self.epic_manifests.clone(),
            start_menu_roots: Vec::new(),
            data_dir: self.data.root().to_path_buf(),
            manual_games_file: self.data.manual_games_file(),
        }
    }

    fn open_library(&self) -> Arc<Library> {
        let db = GameDatabase::open(self.data.database_file()).unwrap();
        Arc::new(Library::open(db))
    }

    fn refresher(&self, library: Arc<Library>) -> Refresher {
        let scanner = Scanner::standard(&self.locations(), Arc::new(MemoryRegistry::new()));
        Refresher::new(library, scanner)
    }
}

fn names(library: &Library) -> Vec<String> {
    let mut names: Vec<String> = library
        .snapshot()
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_full_scan_from_all_sources() {
    let env = TestEnvironment::new();
    env.add_steam_app(70, "Half-Life");
    env.add_epic_app("Fortnite", "Fortnite");
    env.add_manual_exe("DOOM");

    let library = env.open_library();
    let mut events = library.subscribe();
    let refresher = env.refresher(library.clone());

    let count = refresher
        .refresh::<SteamGridDb>(&HubConfig::default(), None)
        .await
        .unwrap();

    assert_eq!(count, 3);
    assert_eq!(names(&library), vec!["DOOM", "Fortnite", "Half-Life"]);
    assert_eq!(events.try_recv().unwrap(), LibraryEvent::ScanComplete);

    let half_life = library.get(&TitleId::new(Source::Steam, "Half-Life")).unwrap();
    assert_eq!(half_life.launch(), &LaunchRef::SteamApp(70));
    assert_eq!(
        half_life.install_path,
        Some(env.steam_root.join("steamapps").join("common").join("Half-Life"))
    );
    assert!(half_life.cover.is_unset());
}

#[tokio::test]
async fn test_user_state_survives_rescan_and_restart() {
    let env = TestEnvironment::new();
    env.add_steam_app(70, "Half-Life");
    env.add_epic_app("Fortnite", "Fortnite");

    let half_life = TitleId::new(Source::Steam, "Half-Life");
    {
        let library = env.open_library();
        let refresher = env.refresher(library.clone());
        refresher
            .refresh::<SteamGridDb>(&HubConfig::default(), None)
            .await
            .unwrap();

        library
            .update_field(&half_life, FieldUpdate::Favorite(true))
            .unwrap();
        library.record_session(&half_life, 360, 1_700_000_000).unwrap();
        library
            .apply_covers(vec![(half_life.clone(), CoverArt::Missing)])
            .unwrap();

        // Fortnite uninstalled
        fs::remove_file(env.epic_item("Fortnite")).unwrap();
        refresher
            .refresh::<SteamGridDb>(&HubConfig::default(), None)
            .await
            .unwrap();
        assert_eq!(names(&library), vec!["Half-Life"]);
    }

    let library = env.open_library();
    assert_eq!(library.len(), 1);

    let title = library.get(&half_life).unwrap();
    assert!(title.favorite);
    assert_eq!(title.playtime_seconds, 360);
    assert_eq!(title.last_played, Some(1_700_000_000));
    assert_eq!(title.cover, CoverArt::Missing);
}

#[tokio::test]
async fn test_extra_scan_paths_are_used_without_client() {
    let env = TestEnvironment::new();
    let extra = env.temp_dir.path().join("D").join("steamapps");
    fs::create_dir_all(&extra).unwrap();
    fs::write(
        extra.join("appmanifest_400.acf"),
        "\"AppState\"\n{\n\t\"appid\"\t\"400\"\n\t\"name\"\t\"Portal\"\n\t\"installdir\"\t\"Portal\"\n}\n",
    )
    .unwrap();
    fs::write(extra.join("appmanifest_1.acf"), "\"AppState\"\n{\n\t\"name\"").unwrap();

    let mut locations = env.locations();
    locations.steam_root = None;
    let scanner = Scanner::standard(&locations, Arc::new(MemoryRegistry::new()));

    let config = HubConfig {
        scan_paths: vec![extra],
        steamgriddb_api_key: None,
    };
    let report = scanner.scan(&config).await;

    let steam: Vec<&str> = report
        .titles
        .iter()
        .filter(|t| t.source() == Source::Steam)
        .map(|t| t.name())
        .collect();
    assert_eq!(steam, vec!["Portal"]);
    assert!(report.failures.iter().any(|(source, _)| *source == Source::Ea));
}

#[tokio::test]
async fn test_manual_removal_is_explicit() {
    let env = TestEnvironment::new();
    env.add_manual_exe("DOOM");

    let library = env.open_library();
    let refresher = env.refresher(library.clone());
    refresher
        .refresh::<SteamGridDb>(&HubConfig::default(), None)
        .await
        .unwrap();
    assert_eq!(names(&library), vec!["DOOM"]);

    assert!(library.remove_manual(&env.manual_list(), "DOOM").unwrap());
    assert!(library.is_empty());

    refresher
        .refresh::<SteamGridDb>(&HubConfig::default(), None)
        .await
        .unwrap();
    assert!(library.is_empty());
    assert!(env.open_library().is_empty());
}

#[tokio::test]
async fn test_corrupt_catalog_starts_empty_and_rescans() {
    let env = TestEnvironment::new();
    env.add_steam_app(70, "Half-Life");
    fs::write(env.data.database_file(), [0xAB; 4096]).unwrap();

    let db = GameDatabase::open_or_recover(&env.data.database_file()).unwrap();
    let library = Arc::new(Library::open(db));
    assert!(library.is_empty());

    let refresher = env.refresher(library.clone());
    refresher
        .refresh::<SteamGridDb>(&HubConfig::default(), None)
        .await
        .unwrap();
    assert_eq!(names(&library), vec!["Half-Life"]);
    assert_eq!(names(&env.open_library()), vec!["Half-Life"]);
}

#[test]
fn test_legacy_cache_is_imported_once() {
    let env = TestEnvironment::new();
    let cache = env.data.legacy_cache_file();
    fs::write(
        &cache,
        r#"[{"name": "Portal", "source": "Steam", "launch_id": "400", "favorite": true}]"#,
    )
    .unwrap();

    let mut db = GameDatabase::open(env.data.database_file()).unwrap();
    assert_eq!(db.import_legacy_cache(&cache).unwrap(), 1);
    assert!(!Path::new(&cache).exists());

    let library = Library::open(db);
    assert!(library.get(&TitleId::new(Source::Steam, "Portal")).unwrap().favorite);
}
