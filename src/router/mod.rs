// ABOUTME: Routes classified input to the shell, an internal action or the assistant
//
// Images dropped on their own are staged and ride along with the next message.
// Whether the assistant is started or forwarded to is decided by the registry,
// which owns the per-session "assistant attached" flag.

pub mod classifier;

pub use classifier::{
    clean_dropped_path, ClassificationRule, ClassifiedCommand, ClassifierInput, CommandClassifier,
    DEFAULT_ATTACHMENT_PROMPT, SLASH_COMMANDS,
};

use std::borrow::Cow;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::{AppConfig, AssistantConfig};
use crate::models::SessionId;
use crate::registry::{AssistantDelivery, AssistantInvocation, RegistryError, RegistryHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalAction {
    Help,
    NewSession { name: Option<String> },
    CloseSession { id: SessionId },
    ListSessions,
    Switch { id: SessionId },
    Rename { name: String },
    Retry { id: SessionId },
    Remove { id: SessionId },
    Refresh,
    Clear,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    SentToShell,
    Internal(InternalAction),
    AttachmentStaged(PathBuf),
    AssistantStarted,
    AssistantForwarded,
    Ignored,
}

fn escape(text: &str) -> Cow<'_, str> {
    shell_escape::escape(Cow::Borrowed(text))
}

fn escaped_paths(attachments: &[PathBuf]) -> Vec<String> {
    attachments
        .iter()
        .map(|p| escape(&p.to_string_lossy()).into_owned())
        .collect()
}

/// Render a message for the assistant CLI, both as a fresh invocation and as input
/// to an already-running assistant
pub fn assistant_invocation(assistant: &AssistantConfig, text: &str, attachments: &[PathBuf]) -> AssistantInvocation {
    let paths = escaped_paths(attachments);

    let mut payload = text.to_string();
    for path in &paths {
        payload.push(' ');
        payload.push_str(path);
    }

    let mut start: Vec<String> = vec![escape(&assistant.command).into_owned()];
    start.extend(assistant.args.iter().map(|a| escape(a).into_owned()));
    start.push(escape(&payload).into_owned());

    AssistantInvocation {
        start: format!("{}\n", start.join(" ")),
        forward: format!("{payload}\n"),
    }
}

pub struct CommandRouter {
    classifier: CommandClassifier,
    registry: RegistryHandle,
    assistant: AssistantConfig,
    staged: Vec<PathBuf>,
}

impl CommandRouter {
    pub fn new(classifier: CommandClassifier, registry: RegistryHandle, assistant: AssistantConfig) -> Self {
        Self {
            classifier,
            registry,
            assistant,
            staged: Vec::new(),
        }
    }

    pub fn from_config(config: &AppConfig, registry: RegistryHandle) -> Self {
        Self::new(
            CommandClassifier::new(config.router.extra_executables.clone()),
            registry,
            config.assistant.clone(),
        )
    }

    pub fn classifier(&self) -> &CommandClassifier {
        &self.classifier
    }

    pub fn staged(&self) -> &[PathBuf] {
        &self.staged
    }

    pub fn clear_staged(&mut self) {
        self.staged.clear();
    }

    /// Route one line of input typed in `session`
    pub async fn route(
        &mut self,
        session: &SessionId,
        text: &str,
        attachments: Vec<PathBuf>,
    ) -> Result<RouteOutcome, RegistryError> {
        let blank = text.trim().is_empty();
        if blank && attachments.is_empty() && self.staged.is_empty() {
            return Ok(RouteOutcome::Ignored);
        }

        // A dropped image is staged even when others are already waiting
        if attachments.is_empty() {
            if let ClassifiedCommand::ImageAttachment(path) = self.classifier.classify(text, &[]) {
                debug!(session = %session, path = %path.display(), "Staged attachment");
                self.staged.push(path.clone());
                return Ok(RouteOutcome::AttachmentStaged(path));
            }
        }

        let mut all_attachments = std::mem::take(&mut self.staged);
        all_attachments.extend(attachments);

        let classified = self.classifier.classify(text, &all_attachments);
        debug!(session = %session, route = ?classified, "Classified input");

        match classified {
            ClassifiedCommand::ShellCommand(command) => {
                if command.is_empty() {
                    return Ok(RouteOutcome::Ignored);
                }
                self.registry
                    .send_input(session, format!("{command}\n").into_bytes())
                    .await?;
                Ok(RouteOutcome::SentToShell)
            }
            ClassifiedCommand::SlashCommand { name, argument } => {
                let action = self.run_internal(session, &name, &argument).await?;
                Ok(RouteOutcome::Internal(action))
            }
            ClassifiedCommand::ImageAttachment(path) => {
                self.staged.push(path.clone());
                Ok(RouteOutcome::AttachmentStaged(path))
            }
            ClassifiedCommand::AttachedAssistantMessage { text, attachments } => {
                self.to_assistant(session, &text, &attachments).await
            }
            ClassifiedCommand::NaturalLanguage(text) => self.to_assistant(session, &text, &[]).await,
        }
    }

    async fn to_assistant(
        &self,
        session: &SessionId,
        text: &str,
        attachments: &[PathBuf],
    ) -> Result<RouteOutcome, RegistryError> {
        let invocation = assistant_invocation(&self.assistant, text, attachments);
        let delivery = self.registry.deliver_to_assistant(session, invocation).await?;
        info!(session = %session, attachments = attachments.len(), delivery = ?delivery, "Routed message to assistant");

        Ok(match delivery {
            AssistantDelivery::Started => RouteOutcome::AssistantStarted,
            AssistantDelivery::Forwarded => RouteOutcome::AssistantForwarded,
        })
    }

    async fn run_internal(
        &mut self,
        session: &SessionId,
        name: &str,
        argument: &str,
    ) -> Result<InternalAction, RegistryError> {
        let action = match name {
            "new" => {
                let name = (!argument.is_empty()).then(|| argument.to_string());
                let created = self.registry.create_session(name.clone(), None).await?;
                info!(session = %created.id, "Created session from command");
                InternalAction::NewSession { name }
            }
            "close" => {
                self.registry.close(session).await?;
                InternalAction::CloseSession { id: session.clone() }
            }
            "switch" => {
                let id = self.resolve_session(argument).await?;
                self.registry.select(&id).await?;
                InternalAction::Switch { id }
            }
            "rename" => {
                self.registry.rename(session, argument).await?;
                InternalAction::Rename {
                    name: argument.to_string(),
                }
            }
            "retry" => {
                let id = self.target_session(session, argument).await?;
                self.registry.retry(&id).await?;
                InternalAction::Retry { id }
            }
            "remove" => {
                let id = self.target_session(session, argument).await?;
                self.registry.remove(&id).await?;
                InternalAction::Remove { id }
            }
            "refresh" => {
                self.registry.refresh(session).await?;
                InternalAction::Refresh
            }
            "clear" => {
                self.clear_staged();
                InternalAction::Clear
            }
            "sessions" => InternalAction::ListSessions,
            "quit" => InternalAction::Quit,
            _ => InternalAction::Help,
        };
        Ok(action)
    }

    /// The named session, or the one the input was typed in
    async fn target_session(&self, session: &SessionId, argument: &str) -> Result<SessionId, RegistryError> {
        if argument.is_empty() {
            Ok(session.clone())
        } else {
            self.resolve_session(argument).await
        }
    }

    /// Find a session by exact id, then by name
    async fn resolve_session(&self, query: &str) -> Result<SessionId, RegistryError> {
        let sessions = self.registry.sessions().await?;
        sessions
            .iter()
            .find(|s| s.id.as_str() == query)
            .or_else(|| sessions.iter().find(|s| s.name == query))
            .map(|s| s.id.clone())
            .ok_or_else(|| RegistryError::NotFound(query.to_string()))
    }
}
