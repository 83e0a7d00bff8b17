// ABOUTME: Keeps each session's directory listing and git status in step with its shell
//
// - `debounce`: trailing-edge batching of refresh triggers
// - `watcher`: non-recursive filesystem watch on the current directory
// - `listing`: the external listing command and its parser
// - `directory`: the per-session DirectorySync worker tying them together

pub mod debounce;
pub mod directory;
pub mod listing;
pub mod watcher;

pub use debounce::debounce;
pub use directory::{DirectorySync, SyncOptions};
pub use listing::{parse_listing, DirectoryLister, ListingOutcome};
pub use watcher::DirectoryWatcher;

/// Why a refresh was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// The shell reported a new working directory
    DirectoryChanged,
    /// An entry was added, removed or renamed in the watched directory
    Filesystem,
    /// Explicit request (startup, `/refresh`)
    Manual,
}
