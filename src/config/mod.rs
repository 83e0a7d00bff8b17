// ABOUTME: Configuration management for termsync
// Handles sessions directory, multiplexer, listing, git and assistant settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Session storage and shell settings
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Detachable process multiplexer settings
    #[serde(default)]
    pub multiplexer: MultiplexerConfig,

    /// Directory listing and refresh settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Git status probe settings
    #[serde(default)]
    pub git: GitConfig,

    /// External assistant CLI
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Input classification tweaks
    #[serde(default)]
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding `<id>.sock` and `<id>.json` per session
    #[serde(default = "default_sessions_root")]
    pub root: PathBuf,

    /// Login shell started inside new sessions
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Extra environment variables for new sessions
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            root: default_sessions_root(),
            shell: default_shell(),
            environment: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiplexerConfig {
    /// Multiplexer binary (default: "dtach")
    #[serde(default = "default_multiplexer_binary")]
    pub binary: String,

    /// How long to wait for a socket to appear or an attach to start
    #[serde(default = "default_attach_timeout")]
    pub attach_timeout_ms: u64,

    /// Initial PTY size
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            binary: default_multiplexer_binary(),
            attach_timeout_ms: default_attach_timeout(),
            cols: default_cols(),
            rows: default_rows(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Trailing-edge debounce window for listing refreshes
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Listing command, run the same way a user would type it
    #[serde(default = "default_listing_program")]
    pub listing_program: String,

    #[serde(default = "default_listing_args")]
    pub listing_args: Vec<String>,

    #[serde(default = "default_listing_timeout")]
    pub listing_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce(),
            listing_program: default_listing_program(),
            listing_args: default_listing_args(),
            listing_timeout_ms: default_listing_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_git_binary")]
    pub binary: String,

    #[serde(default = "default_git_timeout")]
    pub timeout_ms: u64,

    /// Periodic re-probe interval in seconds (0 disables)
    #[serde(default = "default_git_poll")]
    pub poll_interval_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_git_binary(),
            timeout_ms: default_git_timeout(),
            poll_interval_secs: default_git_poll(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Assistant CLI started inside the session's shell
    #[serde(default = "default_assistant_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            command: default_assistant_command(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Additional executable names that always route to the shell
    #[serde(default)]
    pub extra_executables: Vec<String>,
}

fn default_sessions_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".termsync").join("sessions"))
        .unwrap_or_else(|| PathBuf::from(".termsync/sessions"))
}

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

fn default_multiplexer_binary() -> String {
    "dtach".to_string()
}

fn default_attach_timeout() -> u64 {
    3000
}

fn default_cols() -> u16 {
    120
}

fn default_rows() -> u16 {
    40
}

fn default_debounce() -> u64 {
    150
}

fn default_listing_program() -> String {
    "ls".to_string()
}

fn default_listing_args() -> Vec<String> {
    vec!["-1".to_string(), "-A".to_string(), "-p".to_string()]
}

fn default_listing_timeout() -> u64 {
    2000
}

fn default_git_binary() -> String {
    "git".to_string()
}

fn default_git_timeout() -> u64 {
    3000
}

fn default_git_poll() -> u64 {
    0
}

fn default_assistant_command() -> String {
    "claude".to_string()
}

impl AppConfig {
    /// Load configuration from default locations
    ///
    /// The first existing file in precedence order is used; defaults otherwise.
    pub fn load() -> Result<Self> {
        for path in Self::get_config_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save configuration to the user config file; returns where it was written
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::get_user_config_dir()?.join("config.toml");
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Get configuration file paths in order of precedence
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        // 1. Local project config
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(".termsync").join("config.toml"));
        }

        // 2. User config (~/.termsync/config.toml)
        if let Ok(config_dir) = Self::get_user_config_dir() {
            paths.push(config_dir.join("config.toml"));
        }

        paths
    }

    fn get_user_config_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home_dir.join(".termsync"))
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.multiplexer.attach_timeout_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.sync.debounce_ms)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_millis(self.sync.listing_timeout_ms)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_millis(self.git.timeout_ms)
    }

    pub fn git_poll_interval(&self) -> Option<Duration> {
        (self.git.poll_interval_secs > 0).then(|| Duration::from_secs(self.git.poll_interval_secs))
    }
}
