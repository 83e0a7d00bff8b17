// ABOUTME: Core data models for sessions, directory listings and git status

pub mod directory;
pub mod git_status;
pub mod session;

pub use directory::{DirectoryEntry, DirectoryState};
pub use git_status::GitStatus;
pub use session::{Session, SessionId, SessionMetadata, SessionStatus};
