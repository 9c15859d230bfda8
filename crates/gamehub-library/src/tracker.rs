//! Playtime measurement by watching a title's processes

use crate::catalog::Library;
use crate::title::TitleId;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Delay between process polls, in both phases
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Polls before a launch with no matching process is given up
pub const DETECTION_ATTEMPTS: u32 = 12;

/// One running process as seen by a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent: Option<u32>,
    /// Executable path; `None` when access was denied
    pub exe: Option<PathBuf>,
}

/// Source of process information
pub trait ProcessTable: Send + Sync {
    /// Every visible process
    fn snapshot(&self) -> Vec<ProcessEntry>;

    fn is_running(&self, pid: u32) -> bool;
}

/// The operating system's process table
pub struct SystemProcesses {
    system: Mutex<System>,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcesses {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::All, true);

        system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                parent: process.parent().map(|p| p.as_u32()),
                exe: process.exe().map(Path::to_path_buf),
            })
            .collect()
    }

    fn is_running(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).is_some()
    }
}

/// Canonical textual form of a path for prefix comparison.
///
/// Separators become `/`, `.` and `..` are resolved lexically and trailing
/// separators dropped. On Windows the result is ASCII case-folded.
pub fn normalize_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");

    let mut parts: Vec<&str> = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    let mut normalized = parts.join("/");
    if raw.starts_with('/') {
        normalized.insert(0, '/');
    }
    if cfg!(windows) {
        normalized.make_ascii_lowercase();
    }
    normalized
}

/// Whether `exe` lies under `root`, comparing whole path components
fn is_within(exe: &str, root: &str) -> bool {
    if root.is_empty() || root == "/" {
        return false;
    }
    exe == root || exe.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
}

/// Processes running from `root`, plus all their descendants
pub fn claim_processes(snapshot: &[ProcessEntry], root: &Path) -> HashSet<u32> {
    let root = normalize_path(root);

    let mut claimed: HashSet<u32> = snapshot
        .iter()
        .filter(|p| {
            p.exe
                .as_deref()
                .is_some_and(|exe| is_within(&normalize_path(exe), &root))
        })
        .map(|p| p.pid)
        .collect();

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for process in snapshot {
        if let Some(parent) = process.parent {
            children.entry(parent).or_default().push(process.pid);
        }
    }

    let mut pending: Vec<u32> = claimed.iter().copied().collect();
    while let Some(pid) = pending.pop() {
        for child in children.get(&pid).into_iter().flatten() {
            if claimed.insert(*child) {
                pending.push(*child);
            }
        }
    }

    claimed
}

/// Lifecycle of one tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Waiting for the title's process to appear
    Armed,
    /// Process found, measuring
    Tracking,
    /// Session recorded
    Committed,
    /// Nothing matched within the detection window
    Abandoned,
}

/// How a tracker finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Committed { seconds: u64 },
    Abandoned,
}

/// Handle to a running tracker
pub struct TrackerHandle {
    title: TitleId,
    state: watch::Receiver<TrackerState>,
    task: JoinHandle<SessionOutcome>,
}

impl TrackerHandle {
    pub fn title(&self) -> &TitleId {
        &self.title
    }

    pub fn state(&self) -> TrackerState {
        *self.state.borrow()
    }

    /// Wait for the tracker to reach a terminal state
    pub async fn wait(self) -> SessionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Tracker for {} aborted: {}", self.title, e);
                SessionOutcome::Abandoned
            }
        }
    }
}

/// Measures one launch of one title
pub struct PlaytimeTracker {
    title: TitleId,
    install_path: PathBuf,
    processes: Arc<dyn ProcessTable>,
    library: Arc<Library>,
    interval: Duration,
    attempts: u32,
}

impl PlaytimeTracker {
    pub fn new(
        title: TitleId,
        install_path: PathBuf,
        processes: Arc<dyn ProcessTable>,
        library: Arc<Library>,
    ) -> Self {
        Self {
            title,
            install_path,
            processes,
            library,
            interval: POLL_INTERVAL,
            attempts: DETECTION_ATTEMPTS,
        }
    }

    pub fn with_timing(mut self, interval: Duration, attempts: u32) -> Self {
        self.interval = interval;
        self.attempts = attempts;
        self
    }

    /// Start tracking in the background
    pub fn spawn(self) -> TrackerHandle {
        let (state_tx, state_rx) = watch::channel(TrackerState::Armed);
        let title = self.title.clone();
        let task = tokio::spawn(self.run(state_tx));

        TrackerHandle {
            title,
            state: state_rx,
            task,
        }
    }

    async fn run(self, state: watch::Sender<TrackerState>) -> SessionOutcome {
        let started = Instant::now();

        let Some(mut tracked) = self.detect().await else {
            info!(
                "No process found under {} for {}, session not recorded",
                self.install_path.display(),
                self.title
            );
            state.send_replace(TrackerState::Abandoned);
            return SessionOutcome::Abandoned;
        };

        info!("Tracking {} ({} processes)", self.title, tracked.len());
        state.send_replace(TrackerState::Tracking);

        while !tracked.is_empty() {
            tokio::time::sleep(self.interval).await;
            tracked = self.still_running(tracked).await;
        }

        let seconds = started.elapsed().as_secs();
        let ended_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        if let Err(e) = self.library.record_session(&self.title, seconds, ended_at) {
            warn!("Session for {} not persisted: {}", self.title, e);
        }

        state.send_replace(TrackerState::Committed);
        SessionOutcome::Committed { seconds }
    }

    async fn detect(&self) -> Option<HashSet<u32>> {
        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.interval).await;

            let processes = self.processes.clone();
            let root = self.install_path.clone();
            let claimed = tokio::task::spawn_blocking(move || {
                claim_processes(&processes.snapshot(), &root)
            })
            .await
            .unwrap_or_default();

            if !claimed.is_empty() {
                return Some(claimed);
            }
            debug!("{}: no process yet (attempt {})", self.title, attempt);
        }
        None
    }

    async fn still_running(&self, tracked: HashSet<u32>) -> HashSet<u32> {
        let processes = self.processes.clone();
        tokio::task::spawn_blocking(move || {
            tracked
                .into_iter()
                .filter(|pid| processes.is_running(*pid))
                .collect()
        })
        .await
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LibraryEvent;
    use crate::database::{CatalogStore, GameDatabase};
    use crate::title::{LaunchRef, Title};

    /// Processes that appear after a number of snapshots and exit after a
    /// number of liveness checks
    struct ScriptedProcesses {
        entries: Vec<ProcessEntry>,
        visible_after: usize,
        lifetimes: HashMap<u32, usize>,
        calls: Mutex<(usize, HashMap<u32, usize>)>,
    }

    impl ScriptedProcesses {
        fn new(entries: Vec<ProcessEntry>, visible_after: usize, lifetimes: &[(u32, usize)]) -> Self {
            Self {
                entries,
                visible_after,
                lifetimes: lifetimes.iter().copied().collect(),
                calls: Mutex::new((0, HashMap::new())),
            }
        }
    }

    impl ProcessTable for ScriptedProcesses {
        fn snapshot(&self) -> Vec<ProcessEntry> {
            let mut calls = self.calls.lock().unwrap();
            calls.0 += 1;
            if calls.0 > self.visible_after {
                self.entries.clone()
            } else {
                Vec::new()
            }
        }

        fn is_running(&self, pid: u32) -> bool {
            let mut calls = self.calls.lock().unwrap();
            let seen = calls.1.entry(pid).or_default();
            *seen += 1;
            *seen <= self.lifetimes.get(&pid).copied().unwrap_or(0)
        }
    }

    fn entry(pid: u32, parent: Option<u32>, exe: &str) -> ProcessEntry {
        ProcessEntry {
            pid,
            parent,
            exe: Some(PathBuf::from(exe)),
        }
    }

    fn foo_library() -> (Arc<Library>, TitleId) {
        let foo = Title::new(
            "Foo",
            LaunchRef::Executable(PathBuf::from("/games/Foo/Foo.exe")),
            Some(PathBuf::from("/games/Foo")),
        );
        let mut db = GameDatabase::in_memory().unwrap();
        db.upsert_all(std::slice::from_ref(&foo)).unwrap();
        (Arc::new(Library::open(db)), foo.id())
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/games/Foo/")), "/games/Foo");
        assert_eq!(normalize_path(Path::new("/games/./Bar/../Foo")), "/games/Foo");
        assert_eq!(
            normalize_path(Path::new(r"C:\Games\Foo\bin")),
            if cfg!(windows) { "c:/games/foo/bin" } else { "C:/Games/Foo/bin" }
        );
    }

    #[test]
    fn test_prefix_match_respects_components() {
        let snapshot = vec![
            entry(1, None, "/games/Foo/Foo.exe"),
            entry(2, None, "/games/FooBar/FooBar.exe"),
            ProcessEntry {
                pid: 3,
                parent: None,
                exe: None,
            },
        ];
        let claimed = claim_processes(&snapshot, Path::new("/games/Foo"));
        assert_eq!(claimed, HashSet::from([1]));
    }

    #[test]
    fn test_descendants_are_claimed() {
        let snapshot = vec![
            entry(10, Some(1), "/games/Foo/Foo.exe"),
            entry(11, Some(10), "/usr/bin/helper"),
            entry(12, Some(11), "/usr/bin/crash-reporter"),
            entry(20, Some(1), "/usr/bin/unrelated"),
        ];
        let claimed = claim_processes(&snapshot, Path::new("/games/Foo"));
        assert_eq!(claimed, HashSet::from([10, 11, 12]));
    }

    #[test]
    fn test_root_path_claims_nothing() {
        let snapshot = vec![entry(1, None, "/games/Foo/Foo.exe")];
        assert!(claim_processes(&snapshot, Path::new("/")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_is_committed() {
        let (library, id) = foo_library();
        let mut events = library.subscribe();
        let processes = Arc::new(ScriptedProcesses::new(
            vec![
                entry(100, Some(1), "/games/Foo/Foo.exe"),
                entry(101, Some(100), "/opt/anticheat/service"),
            ],
            0,
            &[(100, 2), (101, 3)],
        ));

        let handle =
            PlaytimeTracker::new(id.clone(), PathBuf::from("/games/Foo"), processes, library.clone())
                .spawn();
        assert_eq!(handle.state(), TrackerState::Armed);

        // found at 5s; the child outlives the parent and is gone at 25s
        let outcome = handle.wait().await;
        assert_eq!(outcome, SessionOutcome::Committed { seconds: 25 });

        let title = library.get(&id).unwrap();
        assert_eq!(title.playtime_seconds, 25);
        assert!(title.last_played.is_some());
        assert!(matches!(
            events.try_recv().unwrap(),
            LibraryEvent::TitleUpdated(t) if t.playtime_seconds == 25
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_counts_from_detection_start() {
        let (library, id) = foo_library();
        let processes = Arc::new(ScriptedProcesses::new(
            vec![entry(100, None, "/games/Foo/Foo.exe")],
            2,
            &[(100, 1)],
        ));

        let outcome =
            PlaytimeTracker::new(id.clone(), PathBuf::from("/games/Foo"), processes, library)
                .spawn()
                .wait()
                .await;
        // visible on the third poll (15s), alive for one check (20s), gone at 25s
        assert_eq!(outcome, SessionOutcome::Committed { seconds: 25 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_process_is_abandoned() {
        let (library, id) = foo_library();
        let processes = Arc::new(ScriptedProcesses::new(
            vec![entry(7, None, "/games/Other/Other.exe")],
            0,
            &[],
        ));

        let handle =
            PlaytimeTracker::new(id.clone(), PathBuf::from("/games/Foo"), processes, library.clone())
                .spawn();
        let started = Instant::now();
        assert_eq!(handle.wait().await, SessionOutcome::Abandoned);
        assert_eq!(started.elapsed(), POLL_INTERVAL * DETECTION_ATTEMPTS);

        let title = library.get(&id).unwrap();
        assert_eq!(title.playtime_seconds, 0);
        assert!(title.last_played.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_timing() {
        let (library, id) = foo_library();
        let processes = Arc::new(ScriptedProcesses::new(Vec::new(), 0, &[]));

        let handle = PlaytimeTracker::new(id, PathBuf::from("/games/Foo"), processes, library)
            .with_timing(Duration::from_secs(1), 3)
            .spawn();
        let started = Instant::now();
        assert_eq!(handle.wait().await, SessionOutcome::Abandoned);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
