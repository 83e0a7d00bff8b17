// ABOUTME: Behavioral tests for routing typed input through the registry
//
// Shell commands reach the terminal verbatim, prose reaches the assistant, slash
// commands act on sessions and dropped images ride along with the next message.

use anyhow::Result;
use std::path::PathBuf;
use termsync::config::AppConfig;
use termsync::models::Session;
use termsync::router::{CommandRouter, InternalAction, RouteOutcome};

use super::fixtures::TestRegistry;

async fn setup() -> Result<(TestRegistry, CommandRouter, Session)> {
    let reg = TestRegistry::start()?;
    let main = reg.handle.bootstrap().await?.remove(0);
    let router = CommandRouter::from_config(&AppConfig::default(), reg.handle.clone());
    Ok((reg, router, main))
}

#[tokio::test]
async fn test_shell_command_goes_to_terminal() -> Result<()> {
    let (reg, mut router, main) = setup().await?;

    let outcome = router.route(&main.id, "ls -la", Vec::new()).await?;
    assert_eq!(outcome, RouteOutcome::SentToShell);

    let outcome = router.route(&main.id, "$ hello world how are you", Vec::new()).await?;
    assert_eq!(outcome, RouteOutcome::SentToShell);

    assert_eq!(
        reg.multiplexer.written(&main.id),
        "ls -la\nhello world how are you\n"
    );

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_blank_input_is_ignored() -> Result<()> {
    let (reg, mut router, main) = setup().await?;

    let outcome = router.route(&main.id, "   ", Vec::new()).await?;
    assert_eq!(outcome, RouteOutcome::Ignored);
    assert_eq!(reg.multiplexer.written(&main.id), "");

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_prose_starts_then_forwards_to_assistant() -> Result<()> {
    let (reg, mut router, main) = setup().await?;

    let outcome = router
        .route(&main.id, "explain the build failure please", Vec::new())
        .await?;
    assert_eq!(outcome, RouteOutcome::AssistantStarted);

    let outcome = router
        .route(&main.id, "what changed since yesterday?", Vec::new())
        .await?;
    assert_eq!(outcome, RouteOutcome::AssistantForwarded);

    assert_eq!(
        reg.multiplexer.written(&main.id),
        "claude 'explain the build failure please'\nwhat changed since yesterday?\n"
    );

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_dropped_image_rides_with_next_message() -> Result<()> {
    let (reg, mut router, main) = setup().await?;

    let outcome = router.route(&main.id, "'/tmp/shot.png'", Vec::new()).await?;
    assert_eq!(outcome, RouteOutcome::AttachmentStaged(PathBuf::from("/tmp/shot.png")));
    assert_eq!(router.staged(), &[PathBuf::from("/tmp/shot.png")]);
    assert_eq!(reg.multiplexer.written(&main.id), "");

    let outcome = router
        .route(&main.id, "what is wrong in this screenshot?", Vec::new())
        .await?;
    assert_eq!(outcome, RouteOutcome::AssistantStarted);
    assert!(router.staged().is_empty());

    let written = reg.multiplexer.written(&main.id);
    assert!(written.starts_with("claude "));
    assert!(written.contains("what is wrong in this screenshot? /tmp/shot.png"));

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_explicit_attachment_with_empty_text_uses_default_prompt() -> Result<()> {
    let (reg, mut router, main) = setup().await?;

    let outcome = router
        .route(&main.id, "", vec![PathBuf::from("/tmp/diagram.jpg")])
        .await?;
    assert_eq!(outcome, RouteOutcome::AssistantStarted);
    assert!(reg
        .multiplexer
        .written(&main.id)
        .contains("Analyze this /tmp/diagram.jpg"));

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_slash_commands_manage_sessions() -> Result<()> {
    let (reg, mut router, main) = setup().await?;

    let outcome = router.route(&main.id, "/new api", Vec::new()).await?;
    assert_eq!(
        outcome,
        RouteOutcome::Internal(InternalAction::NewSession {
            name: Some("api".to_string())
        })
    );
    let active = reg.handle.active().await?.expect("active session");
    assert_eq!(active.name, "api");

    let outcome = router.route(&active.id, "/switch main", Vec::new()).await?;
    assert_eq!(
        outcome,
        RouteOutcome::Internal(InternalAction::Switch { id: main.id.clone() })
    );
    assert_eq!(reg.handle.active().await?.map(|s| s.id), Some(main.id.clone()));

    let outcome = router.route(&main.id, "/rename backend", Vec::new()).await?;
    assert_eq!(
        outcome,
        RouteOutcome::Internal(InternalAction::Rename {
            name: "backend".to_string()
        })
    );
    let renamed = reg.handle.session(&main.id).await?.expect("session");
    assert_eq!(renamed.name, "backend");

    let outcome = router.route(&active.id, "/close", Vec::new()).await?;
    assert_eq!(
        outcome,
        RouteOutcome::Internal(InternalAction::CloseSession { id: active.id.clone() })
    );
    assert_eq!(reg.handle.sessions().await?.len(), 1);

    let outcome = router.route(&main.id, "/sessions", Vec::new()).await?;
    assert_eq!(outcome, RouteOutcome::Internal(InternalAction::ListSessions));

    // None of this touched the terminal
    assert_eq!(reg.multiplexer.written(&main.id), "");

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_switch_to_unknown_session_fails() -> Result<()> {
    let (reg, mut router, main) = setup().await?;

    let result = router.route(&main.id, "/switch nowhere", Vec::new()).await;
    assert!(result.is_err());

    reg.handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_sessions_can_be_retried_and_removed_by_name() -> Result<()> {
    let (reg, mut router, main) = setup().await?;

    reg.multiplexer.fail_creates(true);
    router.route(&main.id, "/new flaky", Vec::new()).await?;
    router.route(&main.id, "/new broken", Vec::new()).await?;
    let sessions = reg.handle.sessions().await?;
    let flaky = sessions.iter().find(|s| s.name == "flaky").expect("flaky listed").clone();
    let broken = sessions.iter().find(|s| s.name == "broken").expect("broken listed").clone();
    assert!(flaky.has_launch_error());
    assert!(broken.has_launch_error());
    reg.multiplexer.fail_creates(false);

    let outcome = router.route(&main.id, "/retry flaky", Vec::new()).await?;
    assert_eq!(
        outcome,
        RouteOutcome::Internal(InternalAction::Retry { id: flaky.id.clone() })
    );
    let retried = reg.handle.session(&flaky.id).await?.expect("flaky kept");
    assert!(!retried.has_launch_error());

    let outcome = router.route(&main.id, "/remove broken", Vec::new()).await?;
    assert_eq!(
        outcome,
        RouteOutcome::Internal(InternalAction::Remove { id: broken.id.clone() })
    );
    assert!(reg.handle.session(&broken.id).await?.is_none());

    // Without an argument the command targets the session it was typed in
    let result = router.route(&main.id, "/remove", Vec::new()).await;
    assert!(result.is_err(), "a running session cannot be removed");
    assert_eq!(reg.handle.active().await?.map(|s| s.id), Some(main.id.clone()));

    reg.handle.shutdown().await?;
    Ok(())
}
