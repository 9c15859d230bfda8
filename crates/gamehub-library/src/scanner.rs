//! Concurrent scan across all source probes

use crate::probes::{SourceLocations, SourceProbe};
use crate::registry::Registry;
use crate::title::{Source, Title};
use gamehub_config::HubConfig;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Probes allowed to run at the same time
pub const SCAN_WORKERS: usize = 4;

/// Result of a scan
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Titles from every probe that succeeded, in probe order
    pub titles: Vec<Title>,
    /// Probes that failed, with the reason
    pub failures: Vec<(Source, String)>,
    pub duration_ms: u64,
}

/// Runs source probes on the blocking pool and gathers their output
pub struct Scanner {
    probes: Vec<Arc<dyn SourceProbe>>,
    workers: Arc<Semaphore>,
}

impl Scanner {
    pub fn new(probes: Vec<Arc<dyn SourceProbe>>) -> Self {
        Self {
            probes,
            workers: Arc::new(Semaphore::new(SCAN_WORKERS)),
        }
    }

    /// Scanner over the four standard probes
    pub fn standard(locations: &SourceLocations, registry: Arc<dyn Registry>) -> Self {
        Self::new(locations.probes(registry))
    }

    /// Run every probe concurrently.
    ///
    /// A failing or panicking probe contributes nothing; the others are
    /// unaffected. An empty result is a valid scan. Titles are not
    /// deduplicated here.
    pub async fn scan(&self, config: &HubConfig) -> ScanReport {
        let started = Instant::now();
        info!("Starting game scan across {} sources", self.probes.len());

        let mut tasks = JoinSet::new();
        for (index, probe) in self.probes.iter().enumerate() {
            let Ok(permit) = self.workers.clone().acquire_owned().await else {
                break;
            };
            let probe = probe.clone();
            let config = config.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                (index, probe.source(), probe.discover(&config))
            });
        }

        let mut per_probe: Vec<(usize, Vec<Title>)> = Vec::new();
        let mut report = ScanReport::default();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, source, Ok(titles))) => {
                    info!("{}: {} titles", source, titles.len());
                    per_probe.push((index, titles));
                }
                Ok((_, source, Err(e))) => {
                    warn!("{} probe failed: {}", source, e);
                    report.failures.push((source, e.to_string()));
                }
                Err(e) => error!("Probe task aborted: {}", e),
            }
        }

        per_probe.sort_by_key(|(index, _)| *index);
        report.titles = per_probe.into_iter().flat_map(|(_, titles)| titles).collect();
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "Scan complete: {} titles in {} ms",
            report.titles.len(),
            report.duration_ms
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::ProbeError;
    use crate::title::LaunchRef;

    struct FixedProbe(Source, Vec<&'static str>);

    impl SourceProbe for FixedProbe {
        fn source(&self) -> Source {
            self.0
        }

        fn discover(&self, _config: &HubConfig) -> Result<Vec<Title>, ProbeError> {
            Ok(self
                .1
                .iter()
                .map(|name| Title::new(name, LaunchRef::EpicApp(name.to_string()), None))
                .collect())
        }
    }

    struct FailingProbe;

    impl SourceProbe for FailingProbe {
        fn source(&self) -> Source {
            Source::Ea
        }

        fn discover(&self, _config: &HubConfig) -> Result<Vec<Title>, ProbeError> {
            Err(ProbeError::SourceUnavailable("not installed".into()))
        }
    }

    struct PanickingProbe;

    impl SourceProbe for PanickingProbe {
        fn source(&self) -> Source {
            Source::Manual
        }

        fn discover(&self, _config: &HubConfig) -> Result<Vec<Title>, ProbeError> {
            panic!("probe blew up");
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let scanner = Scanner::new(vec![
            Arc::new(FixedProbe(Source::EpicGames, vec!["Fortnite", "Alan Wake 2"])),
            Arc::new(FailingProbe),
            Arc::new(PanickingProbe),
            Arc::new(FixedProbe(Source::EpicGames, vec!["Hades"])),
        ]);

        let report = scanner.scan(&HubConfig::default()).await;
        let names: Vec<&str> = report.titles.iter().map(Title::name).collect();
        assert_eq!(names, vec!["Fortnite", "Alan Wake 2", "Hades"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, Source::Ea);
    }

    #[tokio::test]
    async fn test_all_failing_is_empty_scan() {
        let scanner = Scanner::new(vec![Arc::new(FailingProbe), Arc::new(FailingProbe)]);
        let report = scanner.scan(&HubConfig::default()).await;
        assert!(report.titles.is_empty());
        assert_eq!(report.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let scanner = Scanner::new(vec![
            Arc::new(FixedProbe(Source::EpicGames, vec!["Hades"])),
            Arc::new(FixedProbe(Source::EpicGames, vec!["Hades"])),
        ]);
        assert_eq!(scanner.scan(&HubConfig::default()).await.titles.len(), 2);
    }
}
