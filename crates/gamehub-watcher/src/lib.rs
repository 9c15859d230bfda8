//! Library file watcher for Game Hub
//!
//! Watches the source manifest directories, the configured scan paths and
//! the application data directory, and reports when a file that defines the
//! library changes. Bursts of changes are debounced.

use notify::event::{CreateKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Minimum spacing between two reported changes
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

const STEAM_MANIFEST_PREFIX: &str = "appmanifest_";
const STEAM_MANIFEST_SUFFIX: &str = ".acf";
const EPIC_ITEM_SUFFIX: &str = ".item";
const EA_INSTALLER_DATA: &str = "installerdata.xml";
const MANUAL_GAMES_FILE: &str = "manual_games.json";

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Nothing to watch")]
    NoPaths,

    #[error("Watch error: {0}")]
    Notify(#[from] notify::Error),
}

/// Whether a changed file can affect the library
pub fn is_relevant(file_name: &str) -> bool {
    (file_name.starts_with(STEAM_MANIFEST_PREFIX) && file_name.ends_with(STEAM_MANIFEST_SUFFIX))
        || file_name.ends_with(EPIC_ITEM_SUFFIX)
        || file_name == EA_INSTALLER_DATA
        || file_name == MANUAL_GAMES_FILE
}

/// Drops events that follow the last accepted one too closely
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Accept or drop an event seen at `now`
    pub fn accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last
            && now.saturating_duration_since(last) < self.window
        {
            return false;
        }
        self.last = Some(now);
        true
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

/// Signal that the library should be rescanned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryChanged {
    /// The file that triggered the signal
    pub path: PathBuf,
}

/// The first relevant file in an event, ignoring directories and reads
fn relevant_path(event: &Event) -> Option<&Path> {
    match event.kind {
        EventKind::Access(_)
        | EventKind::Create(CreateKind::Folder)
        | EventKind::Remove(RemoveKind::Folder) => return None,
        _ => {}
    }

    event
        .paths
        .iter()
        .filter(|path| !path.is_dir())
        .find(|path| {
            path.file_name()
                .is_some_and(|name| is_relevant(&name.to_string_lossy()))
        })
        .map(PathBuf::as_path)
}

fn forward(debouncer: &mut Debouncer, tx: &Sender<LibraryChanged>, event: &Event) {
    let Some(path) = relevant_path(event) else {
        return;
    };
    if !debouncer.accept(Instant::now()) {
        debug!("Debounced change to {}", path.display());
        return;
    }

    info!("Library change detected: {}", path.display());
    let _ = tx.send(LibraryChanged {
        path: path.to_path_buf(),
    });
}

/// Recursive watcher over the library locations
pub struct LibraryWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<LibraryChanged>,
    watched: Vec<PathBuf>,
}

impl LibraryWatcher {
    /// Start watching every existing directory in `paths`
    pub fn start(paths: &[PathBuf]) -> Result<Self, WatchError> {
        let (tx, rx) = channel();
        let mut debouncer = Debouncer::default();

        let mut watcher = notify::recommended_watcher(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => forward(&mut debouncer, &tx, &event),
                Err(e) => warn!("File watcher error: {}", e),
            },
        )?;

        let mut watched = Vec::new();
        for path in paths.iter().filter(|path| path.is_dir()) {
            match watcher.watch(path, RecursiveMode::Recursive) {
                Ok(()) => watched.push(path.clone()),
                Err(e) => warn!("Cannot watch {}: {}", path.display(), e),
            }
        }

        if watched.is_empty() {
            return Err(WatchError::NoPaths);
        }

        info!("File watcher started on {} directories", watched.len());
        Ok(Self {
            _watcher: watcher,
            rx,
            watched,
        })
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Try to receive a change without blocking
    pub fn try_recv(&self) -> Option<LibraryChanged> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next change
    pub fn recv(&self) -> Option<LibraryChanged> {
        self.rx.recv().ok()
    }

    /// Wait for a change with timeout
    pub fn recv_timeout(&self, timeout: Duration) -> Option<LibraryChanged> {
        self.rx.recv_timeout(timeout).ok()
    }
}
