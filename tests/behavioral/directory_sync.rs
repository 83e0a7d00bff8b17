// ABOUTME: Behavioral tests for DirectorySync using the real listing command

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use termsync::config::AppConfig;
use termsync::git::GitStatusProbe;
use termsync::models::{DirectoryEntry, DirectoryState, GitStatus, SessionId};
use termsync::runner::{CommandOutput, CommandRunner, CommandSpec, RunError, SystemRunner};
use termsync::sync::{DirectoryLister, DirectorySync, SyncOptions};

use super::fixtures::TestRepo;
use crate::{require_git, require_ls};

/// Real commands, counting how often the listing program runs
#[derive(Default)]
struct CountingRunner {
    listings: AtomicUsize,
}

impl CountingRunner {
    fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for CountingRunner {
    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput, RunError> {
        if spec.program == AppConfig::default().sync.listing_program {
            self.listings.fetch_add(1, Ordering::SeqCst);
        }
        SystemRunner.run(spec).await
    }
}

fn spawn_sync(dir: &Path) -> DirectorySync {
    spawn_sync_with(dir, Arc::new(SystemRunner), false)
}

fn spawn_sync_with(dir: &Path, runner: Arc<dyn CommandRunner>, watch_filesystem: bool) -> DirectorySync {
    let config = AppConfig::default();
    let options = SyncOptions {
        debounce: Duration::from_millis(if watch_filesystem { 150 } else { 20 }),
        git_poll_interval: None,
        watch_filesystem,
    };
    DirectorySync::spawn(
        SessionId::from("sync-test"),
        dir.to_path_buf(),
        DirectoryLister::from_config(runner.clone(), &config),
        GitStatusProbe::from_config(runner, &config),
        options,
    )
}

async fn wait_for_state(
    rx: &mut watch::Receiver<DirectoryState>,
    mut done: impl FnMut(&DirectoryState) -> bool,
) -> DirectoryState {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            {
                let state = rx.borrow_and_update();
                if done(&state) {
                    return state.clone();
                }
            }
            rx.changed().await.expect("sync worker stopped");
        }
    })
    .await
    .expect("timed out waiting for directory state")
}

async fn wait_for_git(rx: &mut watch::Receiver<GitStatus>, mut done: impl FnMut(&GitStatus) -> bool) -> GitStatus {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            {
                let status = rx.borrow_and_update();
                if done(&status) {
                    return status.clone();
                }
            }
            rx.changed().await.expect("sync worker stopped");
        }
    })
    .await
    .expect("timed out waiting for git status")
}

fn has(state: &DirectoryState, entry: &DirectoryEntry) -> bool {
    state.entries.contains(entry)
}

#[tokio::test]
async fn test_initial_listing_marks_directories_and_hidden_files() -> Result<()> {
    require_ls!();
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("notes.txt"), "x")?;
    std::fs::write(dir.path().join(".env"), "x")?;
    std::fs::create_dir(dir.path().join("src"))?;

    let sync = spawn_sync(dir.path());
    let mut rx = sync.subscribe_state();
    let state = wait_for_state(&mut rx, |s| s.refreshed_at.is_some()).await;

    assert_eq!(state.path, dir.path());
    assert_eq!(state.entries.len(), 3);
    assert!(has(&state, &DirectoryEntry::file("notes.txt")));
    assert!(has(&state, &DirectoryEntry::file(".env")));
    assert!(has(&state, &DirectoryEntry::directory("src")));
    assert!(!state.has_error());
    Ok(())
}

#[tokio::test]
async fn test_follows_directory_changes() -> Result<()> {
    require_ls!();
    let dir = TempDir::new()?;
    let child = dir.path().join("child");
    std::fs::create_dir(&child)?;
    std::fs::write(child.join("inner.rs"), "fn main() {}")?;

    let sync = spawn_sync(dir.path());
    let mut rx = sync.subscribe_state();
    wait_for_state(&mut rx, |s| s.refreshed_at.is_some()).await;

    sync.directory_changed(child.clone());
    assert_eq!(sync.current_directory(), child);

    let state = wait_for_state(&mut rx, |s| s.path == child).await;
    assert_eq!(state.entries, vec![DirectoryEntry::file("inner.rs")]);
    Ok(())
}

#[tokio::test]
async fn test_manual_refresh_picks_up_new_files() -> Result<()> {
    require_ls!();
    let dir = TempDir::new()?;

    let sync = spawn_sync(dir.path());
    let mut rx = sync.subscribe_state();
    let initial = wait_for_state(&mut rx, |s| s.refreshed_at.is_some()).await;
    assert!(initial.entries.is_empty());

    std::fs::write(dir.path().join("fresh.log"), "x")?;
    sync.request_refresh();

    let state = wait_for_state(&mut rx, |s| !s.entries.is_empty()).await;
    assert_eq!(state.entries, vec![DirectoryEntry::file("fresh.log")]);
    Ok(())
}

#[tokio::test]
async fn test_missing_directory_keeps_last_listing() -> Result<()> {
    require_ls!();
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("kept.txt"), "x")?;

    let sync = spawn_sync(dir.path());
    let mut rx = sync.subscribe_state();
    wait_for_state(&mut rx, |s| s.refreshed_at.is_some()).await;

    let gone: PathBuf = dir.path().join("removed-meanwhile");
    sync.directory_changed(gone);

    let state = wait_for_state(&mut rx, |s| s.has_error()).await;
    assert_eq!(state.path, dir.path());
    assert_eq!(state.entries, vec![DirectoryEntry::file("kept.txt")]);
    Ok(())
}

#[tokio::test]
async fn test_publishes_git_status_for_repository() -> Result<()> {
    require_ls!();
    require_git!();
    let repo = TestRepo::new()?;
    std::fs::write(repo.path().join("untracked.txt"), "x")?;

    let sync = spawn_sync(repo.path());
    let mut rx = sync.subscribe_git();
    let status = wait_for_git(&mut rx, |s| s.is_repository).await;

    assert_eq!(status.branch, repo.current_branch()?);
    assert_eq!(status.untracked, 1);
    Ok(())
}

#[tokio::test]
async fn test_watched_directory_refreshes_once_per_burst() -> Result<()> {
    require_ls!();
    let dir = TempDir::new()?;
    let runner = Arc::new(CountingRunner::default());

    let sync = spawn_sync_with(dir.path(), runner.clone(), true);
    let mut rx = sync.subscribe_state();
    wait_for_state(&mut rx, |s| s.refreshed_at.is_some()).await;
    assert_eq!(runner.listings(), 1);

    // No request_refresh: the watcher alone has to notice these
    for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
        std::fs::write(dir.path().join(name), "x")?;
    }

    let state = wait_for_state(&mut rx, |s| s.entries.len() == 5).await;
    assert!(has(&state, &DirectoryEntry::file("e.txt")));

    // Let any straggling events settle, then check the burst was debounced
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(runner.listings(), 2);
    Ok(())
}

#[tokio::test]
async fn test_watch_follows_directory_changes() -> Result<()> {
    require_ls!();
    let dir = TempDir::new()?;
    let child = dir.path().join("child");
    std::fs::create_dir(&child)?;

    let sync = spawn_sync_with(dir.path(), Arc::new(SystemRunner), true);
    let mut rx = sync.subscribe_state();
    wait_for_state(&mut rx, |s| s.refreshed_at.is_some()).await;

    sync.directory_changed(child.clone());
    let state = wait_for_state(&mut rx, |s| s.path == child).await;
    assert!(state.entries.is_empty());

    std::fs::write(child.join("created-later.rs"), "fn main() {}")?;

    let state = wait_for_state(&mut rx, |s| !s.entries.is_empty()).await;
    assert_eq!(state.path, child);
    assert_eq!(state.entries, vec![DirectoryEntry::file("created-later.rs")]);
    Ok(())
}
