// ABOUTME: Interactive shell loop: line input routed through the CommandRouter
//
// Output of the active session is streamed to stdout as raw bytes. Each input line
// is classified and sent to the shell, handled internally, or handed to the assistant.
// Leaving the loop detaches from the sessions; their shells keep running.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::models::SessionId;
use crate::multiplexer::{Multiplexer, ProcessMultiplexer};
use crate::registry::{RegistryHandle, SessionEvent, SessionRegistry, TerminalOutput};
use crate::router::{CommandRouter, InternalAction, RouteOutcome, SLASH_COMMANDS};
use crate::runner::{CommandRunner, SystemRunner};

/// Execute the interactive shell
pub async fn execute(config: AppConfig) -> Result<()> {
    let multiplexer: Arc<dyn Multiplexer> = Arc::new(ProcessMultiplexer::from_config(&config));
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let registry = SessionRegistry::new(config.clone(), multiplexer, runner).spawn();

    // Subscribed before bootstrap so later failures are reported as they happen
    let events = registry.subscribe();
    let sessions = registry.bootstrap().await.context("Failed to start sessions")?;
    for session in sessions.iter().filter(|s| s.has_launch_error()) {
        report_launch_failure(&session.id, session.launch_error.as_deref().unwrap_or_default());
    }

    let Some(mut current) = current_session(&registry, None).await? else {
        registry.shutdown().await?;
        anyhow::bail!("No session could be registered; check the sessions directory");
    };

    let active_tx = Arc::new(watch::channel(Some(current.clone())).0);
    let printer = tokio::spawn(print_output(registry.subscribe_output(), active_tx.subscribe()));
    let reporter = tokio::spawn(report_events(events, active_tx.clone()));
    let mut router = CommandRouter::from_config(&config, registry.clone());
    info!(session = %current, "Interactive shell started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match router.route(&current, &line, Vec::new()).await {
            Ok(RouteOutcome::Internal(action)) => {
                if handle_action(&registry, &action).await? {
                    break;
                }
            }
            Ok(RouteOutcome::AttachmentStaged(path)) => {
                eprintln!("[attached {} to your next message]", path.display());
            }
            Ok(outcome) => debug!(session = %current, outcome = ?outcome, "Routed input"),
            Err(e) => eprintln!("error: {e}"),
        }

        if let Some(next) = current_session(&registry, Some(&current)).await? {
            current = next;
        }
        active_tx.send_replace(Some(current.clone()));
    }

    registry.shutdown().await?;
    printer.abort();
    reporter.abort();
    info!("Interactive shell stopped");
    Ok(())
}

/// The session input goes to: the active one, else the first attached one (which
/// becomes active), else a failed one kept around for `/retry` and `/remove`
async fn current_session(registry: &RegistryHandle, previous: Option<&SessionId>) -> Result<Option<SessionId>> {
    if let Some(active) = registry.active().await? {
        return Ok(Some(active.id));
    }

    let sessions = registry.sessions().await?;
    for session in sessions.iter().filter(|s| !s.has_launch_error()) {
        match registry.select(&session.id).await {
            Ok(selected) => return Ok(Some(selected.id)),
            Err(e) => debug!(session = %session.id, error = %e, "Not selectable"),
        }
    }

    if sessions.is_empty() {
        return Ok(None);
    }
    eprintln!("[no running session: use /retry, /remove or /new]");
    let kept = previous
        .filter(|id| sessions.iter().any(|s| &s.id == *id))
        .cloned()
        .unwrap_or_else(|| sessions[0].id.clone());
    Ok(Some(kept))
}

fn report_launch_failure(id: &SessionId, error: &str) {
    eprintln!("[{id}] failed to start: {error} (/retry {id} or /remove {id})");
}

/// Surface registry events the user has to act on, and follow the active session
async fn report_events(
    mut events: broadcast::Receiver<SessionEvent>,
    active: Arc<watch::Sender<Option<SessionId>>>,
) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::LaunchFailed { id, error }) => report_launch_failure(&id, &error),
            Ok(SessionEvent::ActiveChanged { id }) => {
                active.send_replace(Some(id));
            }
            Ok(SessionEvent::Terminated { id }) => eprintln!("[{id}] session ended"),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Session events lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Render an internal action; returns true when the loop should end
async fn handle_action(registry: &RegistryHandle, action: &InternalAction) -> Result<bool> {
    match action {
        InternalAction::Help => {
            println!("Commands: {}", SLASH_COMMANDS.iter().map(|c| format!("/{c}")).collect::<Vec<_>>().join(" "));
            println!("Prefix a line with $ to force it to the shell.");
        }
        InternalAction::ListSessions => {
            for session in registry.sessions().await? {
                let git = registry
                    .git_status(&session.id)
                    .await
                    .ok()
                    .and_then(|status| status.indicator())
                    .unwrap_or_default();
                println!(
                    "{} {:<14} {:<20} {} {}",
                    session.status.indicator(),
                    session.id,
                    session.name,
                    session.working_directory.display(),
                    git
                );
            }
        }
        InternalAction::Clear => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(b"\x1b[2J\x1b[H").await?;
            stdout.flush().await?;
        }
        InternalAction::Quit => return Ok(true),
        InternalAction::NewSession { .. }
        | InternalAction::CloseSession { .. }
        | InternalAction::Switch { .. }
        | InternalAction::Rename { .. }
        | InternalAction::Retry { .. }
        | InternalAction::Remove { .. }
        | InternalAction::Refresh => {
            if let Some(active) = registry.active().await? {
                eprintln!("[{} {}]", active.name, active.working_directory.display());
            }
        }
    }
    Ok(false)
}

async fn print_output(mut output: broadcast::Receiver<TerminalOutput>, active: watch::Receiver<Option<SessionId>>) {
    let mut stdout = tokio::io::stdout();
    loop {
        match output.recv().await {
            Ok(chunk) => {
                if active.borrow().as_ref() != Some(&chunk.id) {
                    continue;
                }
                if stdout.write_all(&chunk.bytes).await.is_err() || stdout.flush().await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Terminal output lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
