// ABOUTME: Non-recursive filesystem watch on a session's current directory
//
// Only entry-level changes matter for the listing: create, remove and rename.
// The watch follows the session: `watch()` drops the previous target first.

use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::RefreshTrigger;

/// Whether an event changes what a directory listing would show
pub fn is_listing_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}

pub struct DirectoryWatcher {
    watcher: RecommendedWatcher,
    watched: Option<PathBuf>,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("watched", &self.watched)
            .finish_non_exhaustive()
    }
}

impl DirectoryWatcher {
    /// Create a watcher that reports listing changes as `RefreshTrigger::Filesystem`
    pub fn new(triggers: mpsc::UnboundedSender<RefreshTrigger>) -> notify::Result<Self> {
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) if is_listing_change(&event.kind) => {
                trace!(kind = ?event.kind, paths = ?event.paths, "Directory entry changed");
                let _ = triggers.send(RefreshTrigger::Filesystem);
            }
            Ok(_) => {}
            Err(e) => debug!("Filesystem watch error: {}", e),
        })?;

        Ok(Self {
            watcher,
            watched: None,
        })
    }

    pub fn watched(&self) -> Option<&Path> {
        self.watched.as_deref()
    }

    /// Point the watch at `dir`, releasing the previous directory
    pub fn watch(&mut self, dir: &Path) -> notify::Result<()> {
        if self.watched.as_deref() == Some(dir) {
            return Ok(());
        }

        if let Some(previous) = self.watched.take() {
            // The old directory may already be gone
            if let Err(e) = self.watcher.unwatch(&previous) {
                debug!(dir = %previous.display(), "Unwatch failed: {}", e);
            }
        }

        self.watcher.watch(dir, RecursiveMode::NonRecursive)?;
        self.watched = Some(dir.to_path_buf());
        debug!(dir = %dir.display(), "Watching directory");
        Ok(())
    }
}
