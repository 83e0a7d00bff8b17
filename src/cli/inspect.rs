// ABOUTME: One-shot CLI commands exercising the classifier, git probe and listing

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use super::{ClassifyArgs, OutputFormat, PathArgs};
use crate::config::AppConfig;
use crate::git::GitStatusProbe;
use crate::router::{ClassifiedCommand, CommandClassifier};
use crate::runner::SystemRunner;
use crate::sync::{DirectoryLister, ListingOutcome};

fn describe(command: &ClassifiedCommand) -> String {
    match command {
        ClassifiedCommand::SlashCommand { name, argument } if argument.is_empty() => format!("slash command: /{name}"),
        ClassifiedCommand::SlashCommand { name, argument } => format!("slash command: /{name} ({argument})"),
        ClassifiedCommand::ShellCommand(text) => format!("shell: {text}"),
        ClassifiedCommand::ImageAttachment(path) => format!("image attachment: {}", path.display()),
        ClassifiedCommand::AttachedAssistantMessage { text, attachments } => {
            format!("assistant message with {} attachment(s): {text}", attachments.len())
        }
        ClassifiedCommand::NaturalLanguage(text) => format!("assistant: {text}"),
    }
}

/// Execute the classify command
pub fn classify(args: ClassifyArgs, config: &AppConfig, format: OutputFormat) -> Result<()> {
    let classifier = CommandClassifier::new(config.router.extra_executables.clone());
    let result = classifier.classify(&args.text, &args.attachments);

    match format {
        OutputFormat::Text => println!("{}", describe(&result)),
        OutputFormat::Json => println!("{}", json!({ "input": args.text, "route": format!("{result:?}") })),
    }
    Ok(())
}

/// Execute the git-status command
pub async fn git_status(args: PathArgs, config: &AppConfig, format: OutputFormat) -> Result<()> {
    let dir = args.resolve().context("Failed to resolve directory")?;
    let probe = GitStatusProbe::from_config(Arc::new(SystemRunner), config);
    let status = probe
        .probe(&dir)
        .await
        .with_context(|| format!("Git probe failed in {}", dir.display()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Text => match status.indicator() {
            Some(indicator) => println!("{indicator}"),
            None => println!("not a git repository"),
        },
    }
    Ok(())
}

/// Execute the ls command
pub async fn ls(args: PathArgs, config: &AppConfig, format: OutputFormat) -> Result<()> {
    let dir = args.resolve().context("Failed to resolve directory")?;
    let lister = DirectoryLister::from_config(Arc::new(SystemRunner), config);

    let (entries, warning) = match lister.list(&dir).await {
        ListingOutcome::Complete(entries) => (entries, None),
        ListingOutcome::Partial(entries, warning) => (entries, Some(warning)),
        ListingOutcome::Failed(error) => anyhow::bail!("Listing {} failed: {error}", dir.display()),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            for entry in &entries {
                if entry.is_directory {
                    println!("{}/", entry.name);
                } else {
                    println!("{}", entry.name);
                }
            }
        }
    }
    if let Some(warning) = warning {
        eprintln!("warning: {warning}");
    }
    Ok(())
}
