//! Cover artwork lookup against SteamGridDB

use crate::catalog::Library;
use crate::title::{CoverArt, LaunchRef, Title};
use crate::LibraryEvent;
use futures_util::future::join_all;
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const STEAMGRIDDB_API_URL: &str = "https://www.steamgriddb.com/api/v2";

/// Titles looked up concurrently per batch
pub const COVER_BATCH_SIZE: usize = 5;

/// Pause after each batch
pub const BATCH_PAUSE: Duration = Duration::from_millis(1500);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
const GRID_DIMENSIONS: &str = "600x900";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned status {0}")]
    Status(u16),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// A grid image
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GridAsset {
    pub url: String,
}

/// A game matched by name search
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchHit {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<Vec<T>>,
}

/// The three artwork service endpoints the pipeline uses
pub trait ArtworkApi: Send + Sync {
    /// Grids for a Steam app id
    fn grids_for_steam_app(
        &self,
        app_id: u64,
    ) -> impl Future<Output = Result<Vec<GridAsset>, MetadataError>> + Send;

    /// Games whose name matches `term`
    fn autocomplete(
        &self,
        term: &str,
    ) -> impl Future<Output = Result<Vec<SearchHit>, MetadataError>> + Send;

    /// Grids for a game id returned by search
    fn grids_for_game(
        &self,
        game_id: u64,
    ) -> impl Future<Output = Result<Vec<GridAsset>, MetadataError>> + Send;
}

/// SteamGridDB HTTP client
pub struct SteamGridDb {
    base: Url,
    api_key: String,
    client: reqwest::Client,
}

impl SteamGridDb {
    pub fn new(api_key: impl Into<String>) -> Result<Self, MetadataError> {
        let base = Url::parse(STEAMGRIDDB_API_URL)
            .map_err(|e| MetadataError::InvalidUrl(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("GameHub/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base,
            api_key: api_key.into(),
            client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, MetadataError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| MetadataError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: Url,
        grid: bool,
    ) -> Result<Vec<T>, MetadataError> {
        debug!("GET {}", url);

        let mut request = self.client.get(url).bearer_auth(&self.api_key);
        if grid {
            request = request.query(&[("dimensions", GRID_DIMENSIONS)]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(MetadataError::Status(response.status().as_u16()));
        }

        let body: ApiResponse<T> = response.json().await?;
        Ok(body.data.unwrap_or_default())
    }
}

impl ArtworkApi for SteamGridDb {
    async fn grids_for_steam_app(&self, app_id: u64) -> Result<Vec<GridAsset>, MetadataError> {
        let url = self.endpoint(&["grids", "steam", &app_id.to_string()])?;
        self.fetch(url, true).await
    }

    async fn autocomplete(&self, term: &str) -> Result<Vec<SearchHit>, MetadataError> {
        let url = self.endpoint(&["search", "autocomplete", term])?;
        self.fetch(url, false).await
    }

    async fn grids_for_game(&self, game_id: u64) -> Result<Vec<GridAsset>, MetadataError> {
        let url = self.endpoint(&["grids", "game", &game_id.to_string()])?;
        self.fetch(url, true).await
    }
}

fn first_url(grids: Vec<GridAsset>) -> Option<String> {
    grids
        .into_iter()
        .map(|grid| grid.url)
        .find(|url| !url.is_empty())
}

async fn search_grid<A: ArtworkApi>(api: &A, name: &str) -> Result<Option<String>, MetadataError> {
    let Some(hit) = api.autocomplete(name).await?.into_iter().next() else {
        return Ok(None);
    };
    Ok(first_url(api.grids_for_game(hit.id).await?))
}

/// Look up the cover for one title.
///
/// Steam titles try their app id first. Everything else, and any Steam
/// miss, goes through name search. All failures are soft and end in
/// [`CoverArt::Missing`].
pub async fn resolve_cover<A: ArtworkApi>(api: &A, title: &Title) -> CoverArt {
    if let LaunchRef::SteamApp(app_id) = title.launch() {
        match api.grids_for_steam_app(*app_id).await {
            Ok(grids) => {
                if let Some(url) = first_url(grids) {
                    return CoverArt::Resolved(url);
                }
            }
            Err(e) => debug!("Steam grid lookup for {} failed: {}", title.name(), e),
        }
    }

    match search_grid(api, title.name()).await {
        Ok(Some(url)) => CoverArt::Resolved(url),
        Ok(None) => {
            debug!("No cover found for {}", title.name());
            CoverArt::Missing
        }
        Err(e) => {
            warn!("Cover lookup for {} failed: {}", title.name(), e);
            CoverArt::Missing
        }
    }
}

/// Totals of one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverRunSummary {
    pub batches: usize,
    pub resolved: usize,
    pub missing: usize,
}

/// Resolves every unset cover in batches
pub struct CoverFetcher<A> {
    api: Arc<A>,
    library: Arc<Library>,
    batch_size: usize,
    pause: Duration,
}

impl<A: ArtworkApi> CoverFetcher<A> {
    pub fn new(api: Arc<A>, library: Arc<Library>) -> Self {
        Self {
            api,
            library,
            batch_size: COVER_BATCH_SIZE,
            pause: BATCH_PAUSE,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Run until no title is left unset.
    ///
    /// The unset set is read fresh from the catalog before every batch.
    pub async fn run(self) -> CoverRunSummary {
        let mut summary = CoverRunSummary::default();
        info!(
            "Fetching covers for {} titles",
            self.library.unset_cover_count()
        );

        loop {
            let batch = self.library.unset_cover_batch(self.batch_size);
            if batch.is_empty() {
                break;
            }

            let api = self.api.as_ref();
            let results = join_all(
                batch
                    .iter()
                    .map(|title| async move { (title.id(), resolve_cover(api, title).await) }),
            )
            .await;

            for (_, cover) in &results {
                match cover {
                    CoverArt::Resolved(_) => summary.resolved += 1,
                    _ => summary.missing += 1,
                }
            }

            if let Err(e) = self.library.apply_covers(results) {
                warn!("Cover batch not persisted: {}", e);
            }
            self.library.notify(LibraryEvent::CoversUpdated);
            summary.batches += 1;

            tokio::time::sleep(self.pause).await;
        }

        info!(
            "Cover fetch finished: {} resolved, {} missing",
            summary.resolved, summary.missing
        );
        summary
    }
}
