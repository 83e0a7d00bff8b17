// ABOUTME: CLI list command - show live sessions from the sessions directory
//
// Discovery prunes stale sockets and orphaned sidecars as a side effect.

use anyhow::{Context, Result};
use serde::Serialize;

use super::OutputFormat;
use crate::config::AppConfig;
use crate::multiplexer::{list_existing_sockets, DiscoveredSession};

/// A live session as displayed by `list`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub name: Option<String>,
    pub directory: Option<String>,
    pub socket: String,
}

impl From<&DiscoveredSession> for SessionInfo {
    fn from(session: &DiscoveredSession) -> Self {
        Self {
            id: session.id.to_string(),
            name: session.metadata.as_ref().map(|m| m.name.clone()),
            directory: session
                .metadata
                .as_ref()
                .map(|m| m.current_directory.display().to_string()),
            socket: session.socket_path.display().to_string(),
        }
    }
}

/// Execute the list command
pub fn execute(config: &AppConfig, format: OutputFormat) -> Result<()> {
    let sessions: Vec<SessionInfo> = list_existing_sockets(&config.sessions.root)
        .context("Failed to scan sessions directory")?
        .iter()
        .map(SessionInfo::from)
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sessions)?),
        OutputFormat::Text => output_text(&sessions),
    }
    Ok(())
}

fn output_text(sessions: &[SessionInfo]) {
    if sessions.is_empty() {
        println!("No sessions found.");
        return;
    }

    println!("{:<14} {:<20} DIRECTORY", "ID", "NAME");
    println!("{}", "-".repeat(72));
    for session in sessions {
        println!(
            "{:<14} {:<20} {}",
            session.id,
            truncate(session.name.as_deref().unwrap_or("-"), 20),
            session.directory.as_deref().unwrap_or("-")
        );
    }
}

/// Truncate a string to fit in the given width (character-aware for UTF-8)
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{truncated}...")
}
