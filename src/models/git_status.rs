// ABOUTME: Git status snapshot for a session's working directory

use serde::{Deserialize, Serialize};

/// Branch and change counts for one directory.
///
/// A snapshot is always produced whole by the probe; consumers replace their copy
/// instead of patching individual fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStatus {
    pub branch: String,
    pub staged: u32,
    pub modified: u32,
    pub untracked: u32,
    pub is_repository: bool,
}

impl GitStatus {
    pub fn not_a_repository() -> Self {
        Self {
            branch: "none".to_string(),
            staged: 0,
            modified: 0,
            untracked: 0,
            is_repository: false,
        }
    }

    pub fn clean(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            staged: 0,
            modified: 0,
            untracked: 0,
            is_repository: true,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.is_repository && (self.staged + self.modified + self.untracked) > 0
    }

    /// Short indicator text, or `None` when the indicator should be hidden entirely
    pub fn indicator(&self) -> Option<String> {
        if !self.is_repository {
            return None;
        }
        if !self.has_changes() {
            return Some(self.branch.clone());
        }
        Some(format!(
            "{} +{} ~{} ?{}",
            self.branch, self.staged, self.modified, self.untracked
        ))
    }
}

impl Default for GitStatus {
    fn default() -> Self {
        Self::not_a_repository()
    }
}
