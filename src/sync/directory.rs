// ABOUTME: Per-session DirectorySync worker: debounced, sequential, stale-safe refreshes
//
// The authoritative directory lives in a watch channel written by the registry.
// The worker lists whatever directory is current when a batch fires and throws the
// result away if the directory moved on while the listing ran.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, info, warn};

use super::debounce::debounce;
use super::listing::{DirectoryLister, ListingOutcome};
use super::watcher::DirectoryWatcher;
use super::RefreshTrigger;
use crate::config::AppConfig;
use crate::git::GitStatusProbe;
use crate::models::{DirectoryState, GitStatus, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub debounce: Duration,
    pub git_poll_interval: Option<Duration>,
    /// Disable the OS watch (directory reports and manual refreshes still work)
    pub watch_filesystem: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(150),
            git_poll_interval: None,
            watch_filesystem: true,
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            debounce: config.debounce_window(),
            git_poll_interval: config.git_poll_interval(),
            watch_filesystem: true,
        }
    }
}

/// Handle to one session's sync worker. Dropping it stops the worker.
#[derive(Debug)]
pub struct DirectorySync {
    session: SessionId,
    cwd: watch::Sender<PathBuf>,
    triggers: mpsc::UnboundedSender<RefreshTrigger>,
    state: watch::Receiver<DirectoryState>,
    git: watch::Receiver<GitStatus>,
    task: JoinHandle<()>,
}

impl DirectorySync {
    /// Start syncing `directory`; an initial refresh is queued right away
    pub fn spawn(
        session: SessionId,
        directory: PathBuf,
        lister: DirectoryLister,
        probe: GitStatusProbe,
        options: SyncOptions,
    ) -> Self {
        let (cwd_tx, cwd_rx) = watch::channel(directory.clone());
        let (state_tx, state_rx) = watch::channel(DirectoryState::new(directory));
        let (git_tx, git_rx) = watch::channel(GitStatus::not_a_repository());
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        let watcher = if options.watch_filesystem {
            match DirectoryWatcher::new(trigger_tx.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(session = %session, "Filesystem watcher unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let worker = SyncWorker {
            session: session.clone(),
            cwd: cwd_rx,
            state: state_tx,
            git: git_tx,
            lister,
            probe,
            watcher,
        };
        let task = tokio::spawn(worker.run(debounce(options.debounce, trigger_rx), options.git_poll_interval));

        let _ = trigger_tx.send(RefreshTrigger::Manual);

        Self {
            session,
            cwd: cwd_tx,
            triggers: trigger_tx,
            state: state_rx,
            git: git_rx,
            task,
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// The shell reported `path` as its working directory
    pub fn directory_changed(&self, path: PathBuf) {
        self.cwd.send_if_modified(|current| {
            if *current == path {
                false
            } else {
                *current = path;
                true
            }
        });
        let _ = self.triggers.send(RefreshTrigger::DirectoryChanged);
    }

    pub fn request_refresh(&self) {
        let _ = self.triggers.send(RefreshTrigger::Manual);
    }

    pub fn current_directory(&self) -> PathBuf {
        self.cwd.borrow().clone()
    }

    pub fn state(&self) -> DirectoryState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DirectoryState> {
        self.state.clone()
    }

    pub fn git_status(&self) -> GitStatus {
        self.git.borrow().clone()
    }

    pub fn subscribe_git(&self) -> watch::Receiver<GitStatus> {
        self.git.clone()
    }
}

impl Drop for DirectorySync {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct SyncWorker {
    session: SessionId,
    cwd: watch::Receiver<PathBuf>,
    state: watch::Sender<DirectoryState>,
    git: watch::Sender<GitStatus>,
    lister: DirectoryLister,
    probe: GitStatusProbe,
    watcher: Option<DirectoryWatcher>,
}

impl SyncWorker {
    async fn run(mut self, mut batches: mpsc::UnboundedReceiver<Vec<RefreshTrigger>>, poll: Option<Duration>) {
        let mut poll = poll.map(|period| interval_at(Instant::now() + period, period));

        loop {
            tokio::select! {
                batch = batches.recv() => match batch {
                    Some(batch) => self.refresh(&batch).await,
                    None => break,
                },
                _ = next_poll(&mut poll) => {
                    let target = self.current();
                    self.probe_git(&target).await;
                }
            }
        }

        debug!(session = %self.session, "Directory sync stopped");
    }

    fn current(&self) -> PathBuf {
        self.cwd.borrow().clone()
    }

    fn is_stale(&self, target: &Path) -> bool {
        *self.cwd.borrow() != target
    }

    async fn refresh(&mut self, batch: &[RefreshTrigger]) {
        let target = self.current();
        debug!(session = %self.session, dir = %target.display(), triggers = ?batch, "Refreshing listing");

        self.retarget_watch(&target);

        let outcome = self.lister.list(&target).await;
        if self.is_stale(&target) {
            debug!(session = %self.session, dir = %target.display(), "Discarding stale listing");
            return;
        }

        self.state.send_modify(|state| match outcome {
            ListingOutcome::Complete(entries) => state.apply_listing(&target, entries, None),
            ListingOutcome::Partial(entries, warning) => state.apply_listing(&target, entries, Some(warning)),
            // Keep showing the last good listing
            ListingOutcome::Failed(error) => state.record_failure(error),
        });

        self.probe_git(&target).await;
    }

    fn retarget_watch(&mut self, target: &Path) {
        let Some(watcher) = self.watcher.as_mut() else {
            return;
        };
        if watcher.watched() == Some(target) {
            return;
        }
        if let Err(e) = watcher.watch(target) {
            warn!(session = %self.session, dir = %target.display(), "Cannot watch directory: {}", e);
        }
    }

    async fn probe_git(&self, target: &Path) {
        match self.probe.probe(target).await {
            Ok(status) if !self.is_stale(target) => {
                let changed = *self.git.borrow() != status;
                if changed {
                    info!(session = %self.session, branch = %status.branch, repo = status.is_repository, "Git status changed");
                }
                self.git.send_replace(status);
            }
            Ok(_) => debug!(session = %self.session, "Discarding stale git status"),
            Err(e) => warn!(session = %self.session, dir = %target.display(), "Git probe failed: {}", e),
        }
    }
}

async fn next_poll(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
