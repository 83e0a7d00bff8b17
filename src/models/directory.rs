// ABOUTME: Directory listing state owned by DirectorySync, one per session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_directory: bool,
}

impl DirectoryEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_directory: false }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_directory: true }
    }
}

/// Listing of a session's working directory.
///
/// Entries keep the order the listing command printed them in. A failed refresh
/// only sets `last_error`; the previous entries stay visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryState {
    pub path: PathBuf,
    pub entries: Vec<DirectoryEntry>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl DirectoryState {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: Vec::new(),
            refreshed_at: None,
            last_error: None,
        }
    }

    /// Replace the listing with a fresh result for `path`
    pub fn apply_listing(&mut self, path: &Path, entries: Vec<DirectoryEntry>, warning: Option<String>) {
        self.path = path.to_path_buf();
        self.entries = entries;
        self.refreshed_at = Some(Utc::now());
        self.last_error = warning;
    }

    /// Record a failed refresh without touching the entries
    pub fn record_failure(&mut self, error: String) {
        self.last_error = Some(error);
    }

    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }

    pub fn directories(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter().filter(|e| e.is_directory)
    }
}
