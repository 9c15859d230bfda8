//! Game catalog service for Game Hub
//!
//! Discovers installed titles across Steam, the Epic launcher, the EA client
//! and a manual list, reconciles them with the persisted catalog without
//! losing user state, measures playtime by watching processes, and fills in
//! cover artwork from SteamGridDB.

mod catalog;
mod covers;
mod database;
mod launcher;
mod pipeline;
pub mod probes;
mod reconcile;
pub mod registry;
mod scanner;
mod title;
mod tracker;
pub mod validation;
mod vdf;

pub use catalog::{FieldUpdate, Library};
pub use covers::{
    ArtworkApi, BATCH_PAUSE, COVER_BATCH_SIZE, CoverFetcher, CoverRunSummary, GridAsset,
    MetadataError, STEAMGRIDDB_API_URL, SearchHit, SteamGridDb, resolve_cover,
};
pub use database::{CatalogStore, GameDatabase};
pub use launcher::open_launch_target;
pub use pipeline::{Refresher, artwork_from_config};
pub use reconcile::{dropped_ids, reconcile};
pub use scanner::{SCAN_WORKERS, ScanReport, Scanner};
pub use title::{CoverArt, LaunchRef, MISSING_COVER, PerformanceStats, Source, Title, TitleId};
pub use tracker::{
    DETECTION_ATTEMPTS, POLL_INTERVAL, PlaytimeTracker, ProcessEntry, ProcessTable,
    SessionOutcome, SystemProcesses, TrackerHandle, TrackerState, claim_processes,
    normalize_path,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Title not found: {0}")]
    TitleNotFound(TitleId),

    #[error("Invalid manual entry: {0}")]
    InvalidManualEntry(String),

    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    #[error("Probe error: {0}")]
    Probe(#[from] probes::ProbeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Notifications for whoever presents the catalog
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryEvent {
    /// A scan was reconciled into the catalog
    ScanComplete,
    /// A batch of cover lookups was committed
    CoversUpdated,
    /// One title changed (session end or direct edit)
    TitleUpdated(Title),
    /// A watched library file changed
    LibraryFileChanged,
}
