//! Scan, reconcile, then fill in covers

use crate::catalog::Library;
use crate::covers::{ArtworkApi, CoverFetcher, CoverRunSummary, SteamGridDb};
use crate::scanner::Scanner;
use crate::{LibraryError, LibraryEvent};
use gamehub_config::HubConfig;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// SteamGridDB client for the configured key, if there is one
pub fn artwork_from_config(config: &HubConfig) -> Option<Arc<SteamGridDb>> {
    let key = config.api_key()?;
    match SteamGridDb::new(key) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("Cover lookups disabled: {}", e);
            None
        }
    }
}

/// Runs full library refreshes against one catalog
pub struct Refresher {
    library: Arc<Library>,
    scanner: Scanner,
    cover_task: Mutex<Option<JoinHandle<CoverRunSummary>>>,
}

impl Refresher {
    pub fn new(library: Arc<Library>, scanner: Scanner) -> Self {
        Self {
            library,
            scanner,
            cover_task: Mutex::new(None),
        }
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Scan every source, commit the reconciled catalog and announce it.
    ///
    /// Afterwards the cover pipeline is started in the background when
    /// `artwork` is given, some title has no cover yet, and no earlier run
    /// is still going. Returns the catalog size.
    pub async fn refresh<A: ArtworkApi + 'static>(
        &self,
        config: &HubConfig,
        artwork: Option<Arc<A>>,
    ) -> Result<usize, LibraryError> {
        let report = self.scanner.scan(config).await;
        let committed = self.library.replace_with_scan(report.titles);
        self.library.notify(LibraryEvent::ScanComplete);
        let count = committed?;

        match artwork {
            Some(api) => self.start_covers(api),
            None => debug!("No artwork credentials, skipping cover lookups"),
        }

        Ok(count)
    }

    fn start_covers<A: ArtworkApi + 'static>(&self, api: Arc<A>) {
        if self.library.unset_cover_count() == 0 {
            return;
        }

        let mut task = self.cover_task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Cover fetch already running");
            return;
        }

        info!("Starting cover fetch");
        let fetcher = CoverFetcher::new(api, self.library.clone());
        *task = Some(tokio::spawn(fetcher.run()));
    }

    /// Wait for the current cover run, if any
    pub async fn wait_for_covers(&self) -> Option<CoverRunSummary> {
        let handle = self
            .cover_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        match handle.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Cover fetch task failed: {}", e);
                None
            }
        }
    }
}
