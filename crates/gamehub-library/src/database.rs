//! Catalog persistence using SQLite

use crate::LibraryError;
use crate::title::{CoverArt, LaunchRef, PerformanceStats, Source, Title};
use rusqlite::{Connection, Transaction, params};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Durable keyed storage for titles
pub trait CatalogStore: Send {
    /// Every stored title
    fn load_all(&self) -> Result<Vec<Title>, LibraryError>;

    /// Insert or replace each title by identity
    fn upsert_all(&mut self, titles: &[Title]) -> Result<(), LibraryError>;

    /// Make the stored rows exactly `titles`, atomically.
    ///
    /// Rows whose identity is not in `titles` are removed, so a failed
    /// commit is fully repaired by the next successful one.
    fn replace_all(&mut self, titles: &[Title]) -> Result<(), LibraryError>;
}

/// Columns added after the first release; never dropped or renamed
const EVOLVED_COLUMNS: [(&str, &str); 2] = [("avg_fps", "TEXT"), ("best_ping", "TEXT")];

/// A row as stored, before the launch reference is rebuilt
struct StoredRow {
    id: String,
    name: String,
    source: String,
    launch_id: Option<String>,
    install_path: Option<String>,
    favorite: Option<bool>,
    hidden: Option<bool>,
    last_played: Option<f64>,
    playtime_seconds: Option<i64>,
    grid_image_url: Option<String>,
    avg_fps: Option<String>,
    best_ping: Option<String>,
}

/// Game catalog database
pub struct GameDatabase {
    conn: Connection,
}

impl GameDatabase {
    /// Open or create a database
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let conn = Connection::open(path)?;

        let db = Self { conn };
        db.init_schema()?;

        Ok(db)
    }

    /// Open the database, setting an unusable file aside.
    ///
    /// A file that cannot be opened is renamed to `<name>.corrupt` and a
    /// fresh database created in its place, so the catalog starts empty and
    /// the next scan rebuilds it. If that also fails the catalog lives in
    /// memory for this run.
    pub fn open_or_recover(path: &Path) -> Result<Self, LibraryError> {
        let err = match Self::open(path) {
            Ok(db) => return Ok(db),
            Err(e) => e,
        };
        warn!("Cannot open {}: {}", path.display(), err);

        let mut aside = path.as_os_str().to_owned();
        aside.push(".corrupt");
        let aside = PathBuf::from(aside);

        match std::fs::rename(path, &aside) {
            Ok(()) => {
                warn!("Moved unreadable catalog to {}", aside.display());
                match Self::open(path) {
                    Ok(db) => return Ok(db),
                    Err(e) => warn!("Cannot create {}: {}", path.display(), e),
                }
            }
            Err(e) => warn!("Cannot move {} aside: {}", path.display(), e),
        }

        warn!("Keeping the catalog in memory until restart");
        Self::in_memory()
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self, LibraryError> {
        let conn = Connection::open_in_memory()?;

        let db = Self { conn };
        db.init_schema()?;

        Ok(db)
    }

    /// Create the table if absent, then add any missing columns
    fn init_schema(&self) -> Result<(), LibraryError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                id TEXT PRIMARY KEY,
                name TEXT,
                source TEXT,
                launch_id TEXT,
                install_path TEXT,
                favorite BOOLEAN,
                hidden BOOLEAN,
                last_played REAL,
                playtime_seconds INTEGER,
                grid_image_url TEXT
            );
        "#,
        )?;

        for (column, kind) in EVOLVED_COLUMNS {
            self.add_column_if_absent(column, kind)?;
        }

        Ok(())
    }

    /// Column names of the games table
    pub fn columns(&self) -> Result<Vec<String>, LibraryError> {
        let mut stmt = self.conn.prepare("PRAGMA table_info(games)")?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>("name"))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn add_column_if_absent(&self, column: &str, kind: &str) -> Result<(), LibraryError> {
        if self.columns()?.iter().any(|c| c == column) {
            return Ok(());
        }

        info!("Migrating database: adding {}", column);
        self.conn
            .execute_batch(&format!("ALTER TABLE games ADD COLUMN {} {}", column, kind))?;
        Ok(())
    }

    /// Get total title count
    pub fn title_count(&self) -> Result<i64, LibraryError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Import the JSON cache written by older releases, then rename it to `.bak`.
    ///
    /// Existing rows win over cache entries. Returns the number of rows added.
    pub fn import_legacy_cache(&mut self, path: &Path) -> Result<usize, LibraryError> {
        if !path.exists() {
            return Ok(0);
        }

        info!("Importing legacy cache {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<LegacyEntry> = serde_json::from_str(&raw)?;

        let tx = self.conn.transaction()?;
        let mut added = 0;
        for entry in &entries {
            let id = format!("{}|{}", entry.source, entry.name.trim());
            added += tx.execute(
                r#"INSERT OR IGNORE INTO games
                   (id, name, source, launch_id, install_path, favorite, hidden,
                    last_played, playtime_seconds, grid_image_url)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                params![
                    id,
                    entry.name.trim(),
                    entry.source,
                    entry.launch_id_string(),
                    entry.install_path,
                    entry.favorite,
                    entry.hidden,
                    entry.last_played,
                    entry.playtime_seconds,
                    entry.grid_image_url,
                ],
            )?;
        }
        tx.commit()?;

        let mut backup = path.as_os_str().to_owned();
        backup.push(".bak");
        std::fs::rename(path, PathBuf::from(backup))?;

        info!("Imported {} of {} cached titles", added, entries.len());
        Ok(added)
    }

    fn write_rows(tx: &Transaction, titles: &[Title]) -> Result<(), LibraryError> {
        let mut stmt = tx.prepare(
            r#"INSERT OR REPLACE INTO games
               (id, name, source, launch_id, install_path, favorite, hidden,
                last_played, playtime_seconds, grid_image_url, avg_fps, best_ping)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
        )?;

        for title in titles {
            stmt.execute(params![
                title.id().as_str(),
                title.name(),
                title.source().as_str(),
                title.launch().to_stored(),
                title
                    .install_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
                title.favorite,
                title.hidden,
                title.last_played.map(|secs| secs as f64),
                title.playtime_seconds as i64,
                title.cover.to_stored(),
                title.stats.avg_fps,
                title.stats.best_ping,
            ])?;
        }
        Ok(())
    }

    fn read_row(row: &rusqlite::Row) -> rusqlite::Result<StoredRow> {
        Ok(StoredRow {
            id: row.get("id")?,
            name: row.get::<_, Option<String>>("name")?.unwrap_or_default(),
            source: row.get::<_, Option<String>>("source")?.unwrap_or_default(),
            launch_id: row.get("launch_id")?,
            install_path: row.get("install_path")?,
            favorite: row.get("favorite")?,
            hidden: row.get("hidden")?,
            last_played: row.get("last_played")?,
            playtime_seconds: row.get("playtime_seconds")?,
            grid_image_url: row.get("grid_image_url")?,
            avg_fps: row.get("avg_fps")?,
            best_ping: row.get("best_ping")?,
        })
    }

    fn row_to_title(row: StoredRow) -> Option<Title> {
        let Some(source) = Source::from_name(&row.source) else {
            warn!("Skipping row {}: unknown source {:?}", row.id, row.source);
            return None;
        };

        let install_path = row
            .install_path
            .filter(|path| !path.is_empty() && path != "Unknown")
            .map(PathBuf::from);
        let Some(launch) = LaunchRef::from_stored(
            source,
            row.launch_id.as_deref().unwrap_or_default(),
            install_path.as_deref(),
        ) else {
            warn!("Skipping row {}: unusable launch id", row.id);
            return None;
        };

        let mut title = Title::new(&row.name, launch, install_path);
        title.favorite = row.favorite.unwrap_or(false);
        title.hidden = row.hidden.unwrap_or(false);
        title.last_played = row
            .last_played
            .filter(|secs| *secs > 0.0)
            .map(|secs| secs as i64);
        title.playtime_seconds = row.playtime_seconds.unwrap_or(0).max(0) as u64;
        title.cover = CoverArt::from_stored(row.grid_image_url.as_deref());
        title.stats = PerformanceStats {
            avg_fps: row.avg_fps.filter(|v| !v.is_empty()),
            best_ping: row.best_ping.filter(|v| !v.is_empty()),
        };
        Some(title)
    }
}

impl CatalogStore for GameDatabase {
    fn load_all(&self) -> Result<Vec<Title>, LibraryError> {
        let mut stmt = self.conn.prepare("SELECT * FROM games ORDER BY id")?;

        let rows = stmt
            .query_map([], Self::read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows.into_iter().filter_map(Self::row_to_title).collect())
    }

    fn upsert_all(&mut self, titles: &[Title]) -> Result<(), LibraryError> {
        let tx = self.conn.transaction()?;
        Self::write_rows(&tx, titles)?;
        tx.commit()?;
        Ok(())
    }

    fn replace_all(&mut self, titles: &[Title]) -> Result<(), LibraryError> {
        let keep: HashSet<String> = titles.iter().map(|t| t.id().as_str().to_string()).collect();

        let tx = self.conn.transaction()?;
        Self::write_rows(&tx, titles)?;

        let stored: Vec<String> = tx
            .prepare("SELECT id FROM games")?
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        let stale: Vec<&String> = stored.iter().filter(|id| !keep.contains(*id)).collect();
        for id in &stale {
            tx.execute("DELETE FROM games WHERE id = ?1", params![id])?;
        }
        tx.commit()?;

        if !stale.is_empty() {
            debug!("Removed {} stale rows", stale.len());
        }
        Ok(())
    }
}

/// Title as written by the old JSON cache
#[derive(Debug, Deserialize)]
struct LegacyEntry {
    name: String,
    source: String,
    #[serde(default)]
    launch_id: Option<serde_json::Value>,
    #[serde(default)]
    install_path: Option<String>,
    #[serde(default)]
    favorite: bool,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    last_played: Option<f64>,
    #[serde(default)]
    playtime_seconds: i64,
    #[serde(default)]
    grid_image_url: Option<String>,
}

impl LegacyEntry {
    fn launch_id_string(&self) -> Option<String> {
        match &self.launch_id {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}
