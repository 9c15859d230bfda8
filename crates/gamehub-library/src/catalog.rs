//! The shared in-memory catalog and its persistence boundary

use crate::database::CatalogStore;
use crate::probes::ManualList;
use crate::reconcile::{dropped_ids, reconcile};
use crate::title::{CoverArt, Source, Title, TitleId};
use crate::{LibraryError, LibraryEvent};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// A direct edit requested by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Favorite(bool),
    Hidden(bool),
    AverageFps(String),
    BestPing(String),
}

struct CatalogState {
    titles: Vec<Title>,
    store: Box<dyn CatalogStore>,
}

impl CatalogState {
    fn position(&self, id: &TitleId) -> Option<usize> {
        self.titles.iter().position(|t| &t.id() == id)
    }

    /// Make the store match memory. The in-memory state is kept on failure
    /// and the next successful commit catches the store up.
    fn persist(&mut self) -> Result<(), LibraryError> {
        self.store
            .replace_all(&self.titles)
            .inspect_err(|e| warn!("Failed to persist catalog: {}", e))
    }
}

/// The catalog, owned behind one lock.
///
/// Every mutation locates, mutates and persists while holding the lock, so
/// concurrent commits cannot lose each other's updates. Nothing slow outside
/// the store itself (HTTP, process listing, directory walks) runs under it.
pub struct Library {
    state: Mutex<CatalogState>,
    events: broadcast::Sender<LibraryEvent>,
}

impl Library {
    /// Load the catalog from `store`. A load failure starts an empty catalog.
    pub fn open(store: impl CatalogStore + 'static) -> Self {
        let titles = match store.load_all() {
            Ok(titles) => {
                info!("Loaded {} titles from the catalog store", titles.len());
                titles
            }
            Err(e) => {
                warn!("Failed to load catalog, starting empty: {}", e);
                Vec::new()
            }
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(CatalogState {
                titles,
                store: Box::new(store),
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.events.subscribe()
    }

    /// Broadcast an event; having no subscribers is fine
    pub fn notify(&self, event: LibraryEvent) {
        let _ = self.events.send(event);
    }

    /// Copy of every title
    pub fn snapshot(&self) -> Vec<Title> {
        self.lock().titles.clone()
    }

    pub fn get(&self, id: &TitleId) -> Option<Title> {
        let state = self.lock();
        state.position(id).map(|index| state.titles[index].clone())
    }

    pub fn len(&self) -> usize {
        self.lock().titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().titles.is_empty()
    }

    /// Reconcile a scan into the catalog and commit it.
    ///
    /// Returns the new catalog size. On a store failure the merged catalog
    /// stays in memory and the error is returned.
    pub fn replace_with_scan(&self, scanned: Vec<Title>) -> Result<usize, LibraryError> {
        let mut state = self.lock();

        let merged = reconcile(scanned, &state.titles);
        let dropped = dropped_ids(&state.titles, &merged);
        if !dropped.is_empty() {
            info!("{} titles no longer found, dropping", dropped.len());
        }
        state.titles = merged;

        state.persist()?;
        Ok(state.titles.len())
    }

    /// Apply a direct edit and commit the catalog
    pub fn update_field(&self, id: &TitleId, update: FieldUpdate) -> Result<Title, LibraryError> {
        let mut state = self.lock();
        let index = state
            .position(id)
            .ok_or_else(|| LibraryError::TitleNotFound(id.clone()))?;

        let title = &mut state.titles[index];
        match update {
            FieldUpdate::Favorite(value) => title.favorite = value,
            FieldUpdate::Hidden(value) => title.hidden = value,
            FieldUpdate::AverageFps(value) => title.stats.avg_fps = Some(value),
            FieldUpdate::BestPing(value) => title.stats.best_ping = Some(value),
        }
        let updated = title.clone();

        let persisted = state.persist();
        drop(state);

        self.notify(LibraryEvent::TitleUpdated(updated.clone()));
        persisted.map(|_| updated)
    }

    /// Add a finished play session to a title.
    ///
    /// Returns `None` when the title has left the catalog since launch.
    pub fn record_session(
        &self,
        id: &TitleId,
        seconds: u64,
        ended_at: i64,
    ) -> Result<Option<Title>, LibraryError> {
        let mut state = self.lock();
        let Some(index) = state.position(id) else {
            warn!("Session for {} ended but the title is gone", id);
            return Ok(None);
        };

        let title = &mut state.titles[index];
        title.playtime_seconds = title.playtime_seconds.saturating_add(seconds);
        title.last_played = Some(ended_at);
        let updated = title.clone();

        let persisted = state.persist();
        drop(state);

        info!(
            "Recorded {}s for {} (total {}s)",
            seconds,
            updated.name(),
            updated.playtime_seconds
        );
        self.notify(LibraryEvent::TitleUpdated(updated.clone()));
        persisted.map(|_| Some(updated))
    }

    /// Up to `limit` titles whose cover has never been looked up
    pub fn unset_cover_batch(&self, limit: usize) -> Vec<Title> {
        self.lock()
            .titles
            .iter()
            .filter(|t| t.cover.is_unset())
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn unset_cover_count(&self) -> usize {
        self.lock()
            .titles
            .iter()
            .filter(|t| t.cover.is_unset())
            .count()
    }

    /// Store lookup results and commit the catalog.
    ///
    /// A title whose cover was set in the meantime (for example by a rescan
    /// carrying one forward) keeps its current value. Returns how many
    /// covers were applied.
    pub fn apply_covers(&self, results: Vec<(TitleId, CoverArt)>) -> Result<usize, LibraryError> {
        let mut state = self.lock();
        let mut applied = 0;

        for (id, cover) in results {
            let Some(index) = state.position(&id) else {
                debug!("Cover for {} discarded, title is gone", id);
                continue;
            };
            let title = &mut state.titles[index];
            if title.cover.is_unset() {
                title.cover = cover;
                applied += 1;
            }
        }

        state.persist()?;
        Ok(applied)
    }

    /// Write a manual entry; the next scan brings it into the catalog
    pub fn add_manual(&self, list: &ManualList, name: &str, path: &Path) -> Result<(), LibraryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LibraryError::InvalidManualEntry("name is empty".into()));
        }
        if !path.exists() {
            return Err(LibraryError::InvalidManualEntry(format!(
                "{} does not exist",
                path.display()
            )));
        }

        list.add(name, path)?;
        Ok(())
    }

    /// Remove a manual entry from the list file, the store and the catalog.
    ///
    /// Returns whether anything was removed.
    pub fn remove_manual(&self, list: &ManualList, name: &str) -> Result<bool, LibraryError> {
        let listed = list.remove(name)?;
        let id = TitleId::new(Source::Manual, name);

        let mut state = self.lock();
        let before = state.titles.len();
        state.titles.retain(|t| t.id() != id);
        let removed = state.titles.len() != before;

        if removed {
            info!("Removed {} from the catalog", id);
            state.persist()?;
        }
        Ok(listed || removed)
    }
}
