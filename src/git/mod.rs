// ABOUTME: Git status probing for a session's working directory via the git CLI
//
// The probe never mutates the repository. Every call is bounded by the runner
// timeout and runs with GIT_TERMINAL_PROMPT=0 so a credential helper can never block it.

pub mod status;

pub use status::{parse_porcelain, ChangeCounts};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;
use crate::models::GitStatus;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec, RunError};

#[derive(Error, Debug)]
pub enum GitError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

#[derive(Clone)]
pub struct GitStatusProbe {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    timeout: Duration,
}

impl std::fmt::Debug for GitStatusProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitStatusProbe")
            .field("binary", &self.binary)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GitStatusProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            runner,
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(runner: Arc<dyn CommandRunner>, config: &AppConfig) -> Self {
        Self::new(runner, config.git.binary.clone(), config.git_timeout())
    }

    /// Probe `dir`. Outside a work tree this is `GitStatus::not_a_repository()`, not an error.
    pub async fn probe(&self, dir: &Path) -> Result<GitStatus, GitError> {
        let inside = self.git(dir, &["rev-parse", "--is-inside-work-tree"]).await?;
        if !inside.success || inside.stdout.trim() != "true" {
            debug!(dir = %dir.display(), "Not inside a git work tree");
            return Ok(GitStatus::not_a_repository());
        }

        let branch = self.branch(dir).await?;

        let status = self
            .git(dir, &["status", "--porcelain=v1", "--untracked-files=normal"])
            .await?;
        if !status.success {
            return Err(GitError::CommandFailed {
                command: "status".to_string(),
                stderr: status.stderr.trim().to_string(),
            });
        }

        let counts = parse_porcelain(&status.stdout);
        debug!(
            dir = %dir.display(),
            branch = %branch,
            staged = counts.staged,
            modified = counts.modified,
            untracked = counts.untracked,
            "Git status probed"
        );

        Ok(GitStatus {
            branch,
            staged: counts.staged,
            modified: counts.modified,
            untracked: counts.untracked,
            is_repository: true,
        })
    }

    async fn branch(&self, dir: &Path) -> Result<String, GitError> {
        let symbolic = self.git(dir, &["symbolic-ref", "--short", "-q", "HEAD"]).await?;
        let name = symbolic.stdout.trim();
        if symbolic.success && !name.is_empty() {
            return Ok(name.to_string());
        }

        // Detached HEAD, or an unborn branch when this also fails
        let head = self.git(dir, &["rev-parse", "--short", "HEAD"]).await?;
        let sha = head.stdout.trim();
        if head.success && !sha.is_empty() {
            return Ok(format!("detached@{sha}"));
        }

        Ok("none".to_string())
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput, GitError> {
        let spec = CommandSpec::new(&self.binary, dir, self.timeout)
            .args(args.iter().copied())
            .env("GIT_TERMINAL_PROMPT", "0");
        Ok(self.runner.run(spec).await?)
    }
}
