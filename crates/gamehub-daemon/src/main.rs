//! Game Hub
//!
//! Background service that keeps the game catalog current: loads it at
//! startup, rescans when library files change, and logs catalog events.

use anyhow::{Context, Result};
use gamehub_config::{DataDir, HubConfig};
use gamehub_library::probes::SourceLocations;
use gamehub_library::registry::system_registry;
use gamehub_library::{
    GameDatabase, Library, LibraryEvent, Refresher, Scanner, artwork_from_config,
};
use gamehub_watcher::LibraryWatcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    info!("Game Hub starting...");

    let data = DataDir::resolve().context("Failed to resolve data directory")?;
    data.ensure()
        .with_context(|| format!("Failed to create {}", data.root().display()))?;
    info!("Data directory: {}", data.root().display());

    let mut db = GameDatabase::open_or_recover(&data.database_file())
        .context("No usable catalog store")?;
    if let Err(e) = db.import_legacy_cache(&data.legacy_cache_file()) {
        warn!("Legacy cache not imported: {}", e);
    }

    let library = Arc::new(Library::open(db));
    tokio::spawn(log_events(library.subscribe()));

    let registry = system_registry();
    let locations = SourceLocations::from_env(&data);
    let refresher = Refresher::new(
        library.clone(),
        Scanner::standard(&locations, registry.clone()),
    );

    let (changes_tx, mut changes_rx) = mpsc::channel(16);
    let config = load_config(&data);
    spawn_watcher(
        locations.watch_paths(registry, &config),
        library.clone(),
        changes_tx,
    );

    if library.is_empty() {
        info!("Library empty, starting initial scan");
        refresh(&refresher, &data).await;
    } else {
        info!("Loaded {} titles", library.len());
    }

    loop {
        tokio::select! {
            Some(path) = changes_rx.recv() => {
                debug!("Rescanning after change to {}", path.display());
                refresh(&refresher, &data).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// Settings are re-read for every refresh so edits apply without a restart
fn load_config(data: &DataDir) -> HubConfig {
    HubConfig::load_or_default(&data.config_file()).unwrap_or_else(|e| {
        warn!("Invalid configuration, using defaults: {}", e);
        HubConfig::default()
    })
}

async fn refresh(refresher: &Refresher, data: &DataDir) {
    let started = Instant::now();
    let config = load_config(data);

    match refresher.refresh(&config, artwork_from_config(&config)).await {
        Ok(count) => info!("Library refreshed: {} titles in {:?}", count, started.elapsed()),
        Err(e) => error!("Library refresh failed: {}", e),
    }
}

/// Forward watcher signals into the refresh loop from a dedicated thread
fn spawn_watcher(paths: Vec<PathBuf>, library: Arc<Library>, changes: mpsc::Sender<PathBuf>) {
    let watcher = match LibraryWatcher::start(&paths) {
        Ok(watcher) => watcher,
        Err(e) => {
            warn!("File watcher not started: {}", e);
            return;
        }
    };

    std::thread::spawn(move || {
        while let Some(change) = watcher.recv() {
            library.notify(LibraryEvent::LibraryFileChanged);
            if changes.blocking_send(change.path).is_err() {
                break;
            }
        }
    });
}

async fn log_events(mut events: broadcast::Receiver<LibraryEvent>) {
    loop {
        match events.recv().await {
            Ok(LibraryEvent::ScanComplete) => info!("Scan complete"),
            Ok(LibraryEvent::CoversUpdated) => info!("Covers updated"),
            Ok(LibraryEvent::TitleUpdated(title)) => info!(
                "{} updated ({}s played)",
                title.name(),
                title.playtime_seconds
            ),
            Ok(LibraryEvent::LibraryFileChanged) => debug!("Library file changed"),
            Err(RecvError::Lagged(missed)) => warn!("Event log skipped {} events", missed),
            Err(RecvError::Closed) => break,
        }
    }
}
