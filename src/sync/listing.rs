// ABOUTME: Runs the external listing command and parses its output into entries

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::models::DirectoryEntry;
use crate::runner::{CommandRunner, CommandSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingOutcome {
    Complete(Vec<DirectoryEntry>),
    /// The command failed part-way; entries are what it printed, with its complaint
    Partial(Vec<DirectoryEntry>, String),
    Failed(String),
}

/// Parse `ls -1 -p` style output: one name per line, directories end in `/`
pub fn parse_listing(stdout: &str) -> Vec<DirectoryEntry> {
    stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| match line.strip_suffix('/') {
            Some(name) => DirectoryEntry::directory(name),
            None => DirectoryEntry::file(line),
        })
        .collect()
}

#[derive(Clone)]
pub struct DirectoryLister {
    runner: Arc<dyn CommandRunner>,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl DirectoryLister {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(runner: Arc<dyn CommandRunner>, config: &AppConfig) -> Self {
        Self::new(
            runner,
            config.sync.listing_program.clone(),
            config.sync.listing_args.clone(),
            config.listing_timeout(),
        )
    }

    pub async fn list(&self, dir: &Path) -> ListingOutcome {
        let spec = CommandSpec::new(&self.program, dir, self.timeout).args(self.args.iter().cloned());

        let output = match self.runner.run(spec).await {
            Ok(output) => output,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Listing command failed");
                return ListingOutcome::Failed(e.to_string());
            }
        };

        let entries = parse_listing(&output.stdout);
        let stderr = output.stderr.trim().to_string();

        match (output.success, entries.is_empty()) {
            (true, _) => {
                debug!(dir = %dir.display(), count = entries.len(), "Listed directory");
                ListingOutcome::Complete(entries)
            }
            (false, true) => {
                let reason = if stderr.is_empty() {
                    format!("{} exited with an error", self.program)
                } else {
                    stderr
                };
                warn!(dir = %dir.display(), error = %reason, "Listing failed");
                ListingOutcome::Failed(reason)
            }
            (false, false) => {
                warn!(dir = %dir.display(), error = %stderr, "Listing incomplete");
                ListingOutcome::Partial(entries, stderr)
            }
        }
    }
}
