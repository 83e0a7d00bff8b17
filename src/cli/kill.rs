// ABOUTME: CLI kill command - terminate a detached session by id or name

use anyhow::{Context, Result};

use super::util::find_session;
use super::KillArgs;
use crate::config::AppConfig;
use crate::multiplexer::{Multiplexer, ProcessMultiplexer};

/// Execute the kill command
pub async fn execute(args: KillArgs, config: &AppConfig) -> Result<()> {
    let multiplexer = ProcessMultiplexer::from_config(config);
    let sessions = multiplexer
        .list_existing_sockets()
        .context("Failed to scan sessions directory")?;
    let session = find_session(&args.session, &sessions)?;

    multiplexer
        .terminate_session(&session.id)
        .await
        .with_context(|| format!("Failed to terminate session {}", session.id))?;

    println!("Session '{}' terminated.", session.id);
    Ok(())
}
