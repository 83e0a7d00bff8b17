// ABOUTME: Behavioral tests for reattaching sessions after an application restart
//
// The sessions directory is the only state that survives a restart: sockets say
// which shells are alive, sidecars carry their name and working directory.

use anyhow::Result;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use tempfile::TempDir;
use termsync::models::SessionId;
use termsync::multiplexer::MetadataStore;

use super::fixtures::{spawn_registry, FakeMultiplexer, TestRegistry};

#[tokio::test]
async fn test_restart_restores_name_and_directory() -> Result<()> {
    let first = TestRegistry::start()?;
    first.handle.bootstrap().await?;
    let api = first
        .handle
        .create_session(Some("api".to_string()), Some(first.workdir.path().to_path_buf()))
        .await?;
    first.handle.shutdown().await?;

    let TestRegistry {
        sessions_dir: _sessions_dir,
        workdir,
        multiplexer,
        ..
    } = first;

    let second = spawn_registry(&multiplexer);
    let restored = second.bootstrap().await?;

    assert_eq!(restored.len(), 2);
    let api_again = restored
        .iter()
        .find(|s| s.id == api.id)
        .expect("api session restored");
    assert_eq!(api_again.name, "api");
    assert_eq!(api_again.working_directory, workdir.path());
    assert!(!api_again.has_launch_error());

    // Reattached, never re-created
    assert_eq!(multiplexer.created().len(), 2);
    assert_eq!(multiplexer.reattached().len(), 2);

    second.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_socket_without_metadata_gets_defaults() -> Result<()> {
    let sessions_dir = TempDir::new()?;
    let _listener = UnixListener::bind(sessions_dir.path().join("orphan.sock"))?;
    let multiplexer = FakeMultiplexer::new(sessions_dir.path());

    let handle = spawn_registry(&multiplexer);
    let sessions = handle.bootstrap().await?;

    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, SessionId::from("orphan"));
    assert_eq!(sessions[0].name, "session-orphan");
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
    assert_eq!(sessions[0].working_directory, home);

    // Defaults are written back so the next restart sees the same name
    let sidecar = MetadataStore::new(sessions_dir.path())
        .read(&SessionId::from("orphan"))?
        .expect("sidecar written");
    assert_eq!(sidecar.name, "session-orphan");

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_stale_entries_are_pruned_and_main_created() -> Result<()> {
    let sessions_dir = TempDir::new()?;
    std::fs::write(sessions_dir.path().join("dead.sock"), b"")?;
    std::fs::write(
        sessions_dir.path().join("dead.json"),
        r#"{"name":"dead","currentDirectory":"/"}"#,
    )?;
    let multiplexer = FakeMultiplexer::new(sessions_dir.path());

    let handle = spawn_registry(&multiplexer);
    let sessions = handle.bootstrap().await?;

    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].name, "main");
    assert_ne!(sessions[0].id, SessionId::from("dead"));
    assert!(!sessions_dir.path().join("dead.sock").exists());
    assert!(!sessions_dir.path().join("dead.json").exists());
    assert!(multiplexer.reattached().is_empty());

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_restored_sessions_are_ordered_by_id() -> Result<()> {
    let sessions_dir = TempDir::new()?;
    let _b = UnixListener::bind(sessions_dir.path().join("bbb.sock"))?;
    let _a = UnixListener::bind(sessions_dir.path().join("aaa.sock"))?;
    let multiplexer = FakeMultiplexer::new(sessions_dir.path());

    let handle = spawn_registry(&multiplexer);
    let sessions = handle.bootstrap().await?;

    let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["aaa", "bbb"]);

    let active = handle.active().await?.expect("active session");
    assert_eq!(active.id, SessionId::from("aaa"));

    handle.shutdown().await?;
    Ok(())
}
