// ABOUTME: Behavioral tests for session create/select/close/exit handling in the registry
//
// Verifies the "always at least one session" rule, shell exit vs front-end exit,
// launch failure recovery, and the assistant start-then-forward hand-off.

use anyhow::Result;
use termsync::models::SessionStatus;
use termsync::multiplexer::{is_live_socket, metadata_path, socket_path, MetadataStore};
use termsync::registry::{AssistantDelivery, AssistantInvocation, RegistryError, SessionEvent};
use termsync::terminal::TerminalEvent;

use super::fixtures::{wait_for_event, TestRegistry};

fn invocation(message: &str) -> AssistantInvocation {
    AssistantInvocation {
        start: format!("claude '{message}'\n"),
        forward: format!("{message}\n"),
    }
}

#[tokio::test]
async fn test_bootstrap_empty_directory_creates_main_session() -> Result<()> {
    let reg = TestRegistry::start()?;

    let sessions = reg.handle.bootstrap().await?;

    assert_eq!(sessions.len(), 1);
    let main = &sessions[0];
    assert_eq!(main.name, "main");
    assert_eq!(main.status, SessionStatus::Active);
    assert!(is_live_socket(&socket_path(reg.root(), &main.id)));

    let sidecar = MetadataStore::new(reg.root()).read(&main.id)?;
    assert_eq!(sidecar.map(|m| m.name), Some("main".to_string()));

    // Bootstrapping twice changes nothing
    let again = reg.handle.bootstrap().await?;
    assert_eq!(again.len(), 1);
    assert_eq!(reg.multiplexer.created().len(), 1);

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_create_and_select_switch_active_session() -> Result<()> {
    let reg = TestRegistry::start()?;
    let main = reg.handle.bootstrap().await?.remove(0);

    let api = reg
        .handle
        .create_session(Some("api".to_string()), Some(reg.workdir.path().to_path_buf()))
        .await?;
    assert_eq!(api.status, SessionStatus::Active);
    assert_eq!(api.working_directory, reg.workdir.path());

    let main_now = reg.handle.session(&main.id).await?.expect("main session");
    assert_eq!(main_now.status, SessionStatus::Idle);

    reg.handle.select(&main.id).await?;
    let active = reg.handle.active().await?.expect("active session");
    assert_eq!(active.id, main.id);

    let api_now = reg.handle.session(&api.id).await?.expect("api session");
    assert_eq!(api_now.status, SessionStatus::Idle);

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_closing_last_session_creates_replacement() -> Result<()> {
    let reg = TestRegistry::start()?;
    let first = reg.handle.bootstrap().await?.remove(0);

    let closed = reg.handle.close(&first.id).await?;
    assert_eq!(closed.status, SessionStatus::Terminated);

    let remaining = reg.handle.sessions().await?;
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0].id, first.id);
    assert_eq!(remaining[0].name, "main");
    assert_eq!(remaining[0].working_directory, first.working_directory);

    let active = reg.handle.active().await?.expect("replacement is active");
    assert_eq!(active.id, remaining[0].id);

    assert!(!socket_path(reg.root(), &first.id).exists());
    assert!(!metadata_path(reg.root(), &first.id).exists());

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_close_unknown_session_is_not_found() -> Result<()> {
    let reg = TestRegistry::start()?;
    reg.handle.bootstrap().await?;

    let result = reg.handle.close(&"missing".into()).await;
    assert!(matches!(result, Err(RegistryError::NotFound(_))));

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_shell_exit_terminates_session() -> Result<()> {
    let reg = TestRegistry::start()?;
    let main = reg.handle.bootstrap().await?.remove(0);
    let extra = reg.handle.create_session(Some("extra".to_string()), None).await?;
    let mut events = reg.handle.subscribe();

    reg.multiplexer.kill_shell(&extra.id);

    wait_for_event(&mut events, |e| matches!(e, SessionEvent::Terminated { id } if *id == extra.id)).await;

    let sessions = reg.handle.sessions().await?;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, main.id);
    assert!(!metadata_path(reg.root(), &extra.id).exists());

    // The active session went away, so the survivor takes over
    let active = reg.handle.active().await?.expect("active session");
    assert_eq!(active.id, main.id);

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_front_end_exit_with_live_socket_reattaches() -> Result<()> {
    let reg = TestRegistry::start()?;
    let main = reg.handle.bootstrap().await?.remove(0);
    let mut events = reg.handle.subscribe();

    reg.multiplexer.inject(&main.id, TerminalEvent::Exited);

    wait_for_event(&mut events, |e| {
        matches!(e, SessionEvent::StatusChanged { id, .. } if *id == main.id)
    })
    .await;

    assert_eq!(reg.multiplexer.reattached(), vec![main.id.clone()]);
    assert_eq!(reg.multiplexer.created().len(), 1);

    let session = reg.handle.session(&main.id).await?.expect("session survives");
    assert_eq!(session.status, SessionStatus::Active);
    assert!(!session.has_launch_error());

    // Input reaches the new attachment
    reg.handle.send_input(&main.id, "pwd\n").await?;
    assert_eq!(reg.multiplexer.written(&main.id), "pwd\n");

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_assistant_is_started_then_forwarded() -> Result<()> {
    let reg = TestRegistry::start()?;
    let main = reg.handle.bootstrap().await?.remove(0);
    let mut events = reg.handle.subscribe();

    let first = reg.handle.deliver_to_assistant(&main.id, invocation("hi")).await?;
    let second = reg.handle.deliver_to_assistant(&main.id, invocation("more")).await?;

    assert_eq!(first, AssistantDelivery::Started);
    assert_eq!(second, AssistantDelivery::Forwarded);
    assert_eq!(reg.multiplexer.written(&main.id), "claude 'hi'\nmore\n");

    // A directory report means the shell prompt is back
    let dir = reg.workdir.path().to_path_buf();
    reg.multiplexer
        .inject(&main.id, TerminalEvent::DirectoryChanged(dir.clone()));
    wait_for_event(&mut events, |e| {
        matches!(e, SessionEvent::DirectoryChanged { id, path } if *id == main.id && *path == dir)
    })
    .await;

    let third = reg.handle.deliver_to_assistant(&main.id, invocation("again")).await?;
    assert_eq!(third, AssistantDelivery::Started);

    let session = reg.handle.session(&main.id).await?.expect("session");
    assert_eq!(session.working_directory, dir);
    let sidecar = MetadataStore::new(reg.root()).read(&main.id)?.expect("sidecar");
    assert_eq!(sidecar.current_directory, dir);

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_launch_failure_can_be_retried() -> Result<()> {
    let reg = TestRegistry::start()?;
    let main = reg.handle.bootstrap().await?.remove(0);

    reg.multiplexer.fail_creates(true);
    let flaky = reg.handle.create_session(Some("flaky".to_string()), None).await?;

    assert!(flaky.has_launch_error());
    assert_eq!(flaky.status, SessionStatus::Created);
    let active = reg.handle.active().await?.expect("active session");
    assert_eq!(active.id, main.id);

    let result = reg.handle.send_input(&flaky.id, "ls\n").await;
    assert!(matches!(result, Err(RegistryError::NotAttached(_))));

    reg.multiplexer.fail_creates(false);
    let retried = reg.handle.retry(&flaky.id).await?;

    assert!(!retried.has_launch_error());
    assert_eq!(retried.status, SessionStatus::Idle);
    assert!(is_live_socket(&socket_path(reg.root(), &flaky.id)));

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_front_end_exit_storm_leaves_one_active_session() -> Result<()> {
    let reg = TestRegistry::start()?;
    let main = reg.handle.bootstrap().await?.remove(0);
    let mut events = reg.handle.subscribe();

    // Three reattaches are allowed; each one replaces the attachment we inject into
    for _ in 0..3 {
        reg.multiplexer.inject(&main.id, TerminalEvent::Exited);
        wait_for_event(&mut events, |e| {
            matches!(e, SessionEvent::StatusChanged { id, status: SessionStatus::Active } if *id == main.id)
        })
        .await;
    }
    reg.multiplexer.inject(&main.id, TerminalEvent::Exited);
    wait_for_event(&mut events, |e| {
        matches!(e, SessionEvent::LaunchFailed { id, .. } if *id == main.id)
    })
    .await;

    let failed = reg.handle.session(&main.id).await?.expect("session kept");
    assert!(failed.has_launch_error());
    assert_eq!(failed.status, SessionStatus::Idle);
    assert!(reg.handle.active().await?.is_none());

    let second = reg.handle.create_session(Some("second".to_string()), None).await?;

    let sessions = reg.handle.sessions().await?;
    let active: Vec<_> = sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Active)
        .map(|s| s.id.clone())
        .collect();
    assert_eq!(active, vec![second.id.clone()]);

    // The failed session comes back without stealing the active slot
    let retried = reg.handle.retry(&main.id).await?;
    assert!(!retried.has_launch_error());
    assert_eq!(retried.status, SessionStatus::Idle);
    assert_eq!(reg.handle.active().await?.map(|s| s.id), Some(second.id));

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_session_can_be_removed_but_running_one_cannot() -> Result<()> {
    let reg = TestRegistry::start()?;
    let main = reg.handle.bootstrap().await?.remove(0);

    reg.multiplexer.fail_creates(true);
    let flaky = reg.handle.create_session(None, None).await?;

    reg.handle.remove(&flaky.id).await?;
    assert!(reg.handle.session(&flaky.id).await?.is_none());

    let result = reg.handle.remove(&main.id).await;
    assert!(matches!(result, Err(RegistryError::InvalidState(_))));

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_rename_trims_and_persists() -> Result<()> {
    let reg = TestRegistry::start()?;
    let main = reg.handle.bootstrap().await?.remove(0);

    let renamed = reg.handle.rename(&main.id, "  api server ").await?;
    assert_eq!(renamed.name, "api server");

    let sidecar = MetadataStore::new(reg.root()).read(&main.id)?.expect("sidecar");
    assert_eq!(sidecar.name, "api server");

    let result = reg.handle.rename(&main.id, "   ").await;
    assert!(matches!(result, Err(RegistryError::InvalidState(_))));

    reg.handle.shutdown().await?;
    Ok(())
}
