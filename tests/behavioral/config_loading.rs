// ABOUTME: Behavioral tests for loading AppConfig from TOML files

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use termsync::config::AppConfig;

#[test]
fn test_full_config_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[sessions]
root = "/var/tmp/termsync-sessions"
shell = "/bin/zsh"

[sessions.environment]
EDITOR = "vim"

[multiplexer]
binary = "/opt/bin/dtach"
attach_timeout_ms = 750
cols = 100
rows = 30

[sync]
debounce_ms = 75
listing_program = "ls"
listing_args = ["-1", "-p"]
listing_timeout_ms = 500

[git]
binary = "/usr/bin/git"
timeout_ms = 1500
poll_interval_secs = 10

[assistant]
command = "assistant"
args = ["--resume"]

[router]
extra_executables = ["terraform", "just"]
"#,
    )?;

    let config = AppConfig::load_from(&path)?;

    assert_eq!(config.sessions.root, PathBuf::from("/var/tmp/termsync-sessions"));
    assert_eq!(config.sessions.shell, "/bin/zsh");
    assert_eq!(config.sessions.environment.get("EDITOR").map(String::as_str), Some("vim"));
    assert_eq!(config.multiplexer.binary, "/opt/bin/dtach");
    assert_eq!(config.attach_timeout(), Duration::from_millis(750));
    assert_eq!((config.multiplexer.cols, config.multiplexer.rows), (100, 30));
    assert_eq!(config.debounce_window(), Duration::from_millis(75));
    assert_eq!(config.sync.listing_args, vec!["-1", "-p"]);
    assert_eq!(config.listing_timeout(), Duration::from_millis(500));
    assert_eq!(config.git_timeout(), Duration::from_millis(1500));
    assert_eq!(config.git_poll_interval(), Some(Duration::from_secs(10)));
    assert_eq!(config.assistant.command, "assistant");
    assert_eq!(config.assistant.args, vec!["--resume"]);
    assert_eq!(config.router.extra_executables, vec!["terraform", "just"]);
    Ok(())
}

#[test]
fn test_empty_file_uses_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "")?;

    let config = AppConfig::load_from(&path)?;

    assert_eq!(config.multiplexer.binary, "dtach");
    assert_eq!(config.assistant.command, "claude");
    assert_eq!(config.git_poll_interval(), None);
    Ok(())
}

#[test]
fn test_invalid_file_names_the_path() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[sync\ndebounce_ms = ")?;

    let err = AppConfig::load_from(&path).expect_err("invalid TOML must fail");

    assert!(format!("{err:#}").contains("broken.toml"));
    Ok(())
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(AppConfig::load_from(&dir.path().join("absent.toml")).is_err());
}

#[test]
fn test_saved_config_loads_back() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("nested").join("config.toml");
    let mut config = AppConfig::default();
    config.sessions.shell = "/bin/bash".to_string();
    config.git.poll_interval_secs = 30;
    config.router.extra_executables = vec!["just".to_string()];

    config.save_to(&path)?;
    let loaded = AppConfig::load_from(&path)?;

    assert_eq!(loaded.sessions.shell, "/bin/bash");
    assert_eq!(loaded.git_poll_interval(), Some(Duration::from_secs(30)));
    assert_eq!(loaded.router.extra_executables, vec!["just"]);
    assert_eq!(loaded.to_toml()?, config.to_toml()?);
    Ok(())
}
