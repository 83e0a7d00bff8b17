// ABOUTME: Main entry point for termsync
//
// Binary: termsync
// Usage: termsync [COMMAND]
// - No command: interactive shell over detachable sessions
// - list: show live sessions
// - kill: terminate a session
// - classify: show how input would be routed
// - git-status: git indicator for a directory
// - ls: directory listing as the session view sees it
// - config: print (or write) the effective configuration

#![allow(missing_docs)]

use anyhow::{Context, Result};
use clap::Parser;

use termsync::cli::{self, Commands};
use termsync::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    setup_panic_handler();

    let args = cli::Cli::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load().context("Failed to load configuration")?,
    };

    match args.command {
        Some(Commands::List) => cli::list::execute(&config, args.format),
        Some(Commands::Kill(kill_args)) => cli::kill::execute(kill_args, &config).await,
        Some(Commands::Classify(classify_args)) => cli::inspect::classify(classify_args, &config, args.format),
        Some(Commands::GitStatus(path_args)) => cli::inspect::git_status(path_args, &config, args.format).await,
        Some(Commands::Ls(path_args)) => cli::inspect::ls(path_args, &config, args.format).await,
        Some(Commands::Config(config_args)) => cli::config::execute(config_args, &config),
        Some(Commands::Shell) | None => cli::shell::execute(config).await,
    }
}

fn setup_logging() {
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use tracing_subscriber::prelude::*;

    let log_dir = dirs::home_dir()
        .map(|home| home.join(".termsync").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".termsync/logs"));

    let _ = std::fs::create_dir_all(&log_dir);

    // One JSONL file per run
    let log_file = log_dir.join(format!(
        "termsync-{}.jsonl",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "termsync=info".into());

    match OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(file)
                    .with_ansi(false),
            )
            .with(filter)
            .init(),
        Err(e) => {
            // Logging is best-effort; stderr keeps the interactive output readable enough
            eprintln!("Failed to create log file {}: {}", log_file.display(), e);
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }
}

fn setup_panic_handler() {
    use tracing::error;

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {}", panic_info);
        eprintln!("Application panicked: {}", panic_info);
        eprintln!("Please check the logs in ~/.termsync/logs for more details.");
    }));
}
