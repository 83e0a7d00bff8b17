// ABOUTME: Shared CLI utilities for session lookup
//
// Matching priority:
// 1. Exact id match
// 2. Id prefix match
// 3. Session name prefix match (case-insensitive)

use anyhow::{anyhow, Result};

use crate::multiplexer::DiscoveredSession;

fn display_name(session: &DiscoveredSession) -> &str {
    session
        .metadata
        .as_ref()
        .map(|m| m.name.as_str())
        .unwrap_or("-")
}

/// Find a live session by id (full or prefix) or name prefix
pub fn find_session<'a>(id_or_name: &str, sessions: &'a [DiscoveredSession]) -> Result<&'a DiscoveredSession> {
    if sessions.is_empty() {
        return Err(anyhow!("No sessions found. Run 'termsync' to start one."));
    }

    if let Some(exact) = sessions.iter().find(|s| s.id.as_str() == id_or_name) {
        return Ok(exact);
    }

    let by_id: Vec<&DiscoveredSession> = sessions
        .iter()
        .filter(|s| s.id.as_str().starts_with(id_or_name))
        .collect();
    match by_id.len() {
        1 => return Ok(by_id[0]),
        n if n > 1 => return Err(ambiguous(id_or_name, &by_id)),
        _ => {}
    }

    let name_lower = id_or_name.to_lowercase();
    let by_name: Vec<&DiscoveredSession> = sessions
        .iter()
        .filter(|s| display_name(s).to_lowercase().starts_with(&name_lower))
        .collect();
    match by_name.len() {
        1 => Ok(by_name[0]),
        0 => Err(anyhow!("No session matches '{id_or_name}'")),
        _ => Err(ambiguous(id_or_name, &by_name)),
    }
}

fn ambiguous(query: &str, matches: &[&DiscoveredSession]) -> anyhow::Error {
    let lines: Vec<String> = matches
        .iter()
        .map(|s| format!("  {} ({})", s.id, display_name(s)))
        .collect();
    anyhow!("Ambiguous session '{query}'. Matches:\n{}", lines.join("\n"))
}
