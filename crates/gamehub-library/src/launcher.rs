//! Starting titles through the platform opener

use crate::catalog::Library;
use crate::title::{Title, TitleId};
use crate::tracker::{PlaytimeTracker, ProcessTable, TrackerHandle};
use crate::LibraryError;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::info;

/// Command that hands `target` (a URI or a path) to the OS
fn opener_command(target: &str) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };

    cmd.arg(target);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());
    cmd
}

/// Open a title's launch target without waiting for it
pub fn open_launch_target(title: &Title) -> Result<(), LibraryError> {
    let target = title.launch_uri();
    info!("Launching {} via {}", title.name(), target);

    opener_command(&target)
        .spawn()
        .map_err(|e| LibraryError::LaunchFailed(format!("{}: {}", target, e)))?;
    Ok(())
}

impl Library {
    /// Launch a title and, when its install path is known, track the session.
    ///
    /// Must be called inside a tokio runtime. Returns `None` when no tracker
    /// was armed.
    pub fn launch(
        self: &Arc<Self>,
        id: &TitleId,
        processes: Arc<dyn ProcessTable>,
    ) -> Result<Option<TrackerHandle>, LibraryError> {
        let title = self
            .get(id)
            .ok_or_else(|| LibraryError::TitleNotFound(id.clone()))?;

        open_launch_target(&title)?;

        let Some(install_path) = title.install_path.clone() else {
            info!("{} has no install path, playtime not tracked", title.name());
            return Ok(None);
        };

        let handle = PlaytimeTracker::new(title.id(), install_path, processes, self.clone()).spawn();
        Ok(Some(handle))
    }
}
