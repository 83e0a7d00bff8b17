// ABOUTME: CLI argument parsing and command routing for termsync
//
// Provides command-line interface for:
// - The interactive shell (default)
// - Inspecting and killing detached sessions (list, kill)
// - One-shot probes of the building blocks (classify, git-status, ls)
// - Showing or writing the effective configuration

pub mod config;
pub mod inspect;
pub mod kill;
pub mod list;
pub mod shell;
pub mod util;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Terminal dev shell with detachable sessions and live directory/git state
#[derive(Parser)]
#[command(name = "termsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Config file to use instead of the default lookup
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Output format for commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive shell (default if no command given)
    Shell,

    /// List live sessions in the sessions directory
    List,

    /// Terminate a session
    Kill(KillArgs),

    /// Show how a line of input would be routed
    Classify(ClassifyArgs),

    /// Show git status for a directory
    GitStatus(PathArgs),

    /// List a directory the way the session view does
    Ls(PathArgs),

    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

/// Arguments for the config command
#[derive(clap::Args)]
pub struct ConfigArgs {
    /// Also write it to the user config file (~/.termsync/config.toml)
    #[arg(long)]
    pub write: bool,
}

/// Arguments for the kill command
#[derive(clap::Args)]
pub struct KillArgs {
    /// Session ID (or unique prefix) or name
    pub session: String,
}

/// Arguments for the classify command
#[derive(clap::Args)]
pub struct ClassifyArgs {
    /// Input text
    #[arg(default_value = "")]
    pub text: String,

    /// Attached file (repeatable)
    #[arg(long = "attach")]
    pub attachments: Vec<PathBuf>,
}

/// A directory argument defaulting to the current directory
#[derive(clap::Args)]
pub struct PathArgs {
    pub path: Option<PathBuf>,
}

impl PathArgs {
    pub fn resolve(&self) -> std::io::Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => std::env::current_dir(),
        }
    }
}
