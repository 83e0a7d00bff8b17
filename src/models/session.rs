// ABOUTME: Session data model representing one workspace backed by a detachable shell process

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Opaque session identifier.
///
/// Ids created by this process are short uuid strings, but ids recovered from the
/// sessions directory are whatever file stem was found there, so no format is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(simple[..12].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Created,    // Spawn/attach pending or failed (see launch_error)
    Active,     // Attached and in the foreground
    Idle,       // Attached but backgrounded
    Terminated, // Process exited or explicitly closed
}

impl SessionStatus {
    pub fn indicator(&self) -> &'static str {
        match self {
            SessionStatus::Created => "◌",
            SessionStatus::Active => "●",
            SessionStatus::Idle => "○",
            SessionStatus::Terminated => "✗",
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionStatus::Terminated)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle transition.
    ///
    /// Terminated is final and nothing returns to Created once a session left it.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (*self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Created, Created | Active | Idle) => true,
            (Active | Idle, Active | Idle) => true,
            (Active | Idle, Created) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub working_directory: PathBuf,
    pub status: SessionStatus,
    pub socket_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// Error sub-state of Created: why the last spawn/attach failed
    pub launch_error: Option<String>,
    /// Whether the assistant CLI currently owns this session's terminal
    pub assistant_attached: bool,
}

impl Session {
    pub fn new(id: SessionId, name: String, working_directory: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            working_directory,
            status: SessionStatus::Created,
            socket_path: None,
            created_at: now,
            last_active: now,
            launch_error: None,
            assistant_attached: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Apply a status transition, returning false (and leaving the session untouched)
    /// when the transition is not allowed.
    pub fn set_status(&mut self, status: SessionStatus) -> bool {
        if self.status == status {
            return true;
        }
        if !self.status.can_transition_to(status) {
            return false;
        }
        self.status = status;
        if status.is_terminated() {
            self.socket_path = None;
            self.assistant_attached = false;
        }
        self.touch();
        true
    }

    pub fn mark_launched(&mut self, socket_path: PathBuf, status: SessionStatus) -> bool {
        if !self.set_status(status) {
            return false;
        }
        self.socket_path = Some(socket_path);
        self.launch_error = None;
        true
    }

    /// Record a failed launch. Nothing is attached afterwards, so an Active
    /// session drops to Idle; returns whether the status changed.
    pub fn mark_launch_failed(&mut self, error: String) -> bool {
        let demoted = self.status == SessionStatus::Active && self.set_status(SessionStatus::Idle);
        self.socket_path = None;
        self.launch_error = Some(error);
        self.touch();
        demoted
    }

    pub fn has_launch_error(&self) -> bool {
        self.launch_error.is_some()
    }

    pub fn set_working_directory(&mut self, path: &Path) -> bool {
        if self.working_directory == path {
            return false;
        }
        self.working_directory = path.to_path_buf();
        self.touch();
        true
    }

    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            name: self.name.clone(),
            current_directory: self.working_directory.clone(),
        }
    }
}

/// Durable sidecar stored next to the multiplexer socket as `<id>.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub name: String,
    pub current_directory: PathBuf,
}
