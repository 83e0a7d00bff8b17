// ABOUTME: Session registry: the single owner of session lifecycle state
//
// The registry runs as one tokio task. Everything that mutates sessions (user
// actions, shell directory reports, front-end exits) arrives as a RegistryCommand
// on the same channel, so mutations are applied strictly one at a time.

pub mod actor;

pub use actor::SessionRegistry;

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::models::{DirectoryState, GitStatus, Session, SessionId, SessionStatus};
use crate::multiplexer::{DiscoveryError, MetadataError, MultiplexerError};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session {0} has no attached terminal")]
    NotAttached(SessionId),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Multiplexer error: {0}")]
    Multiplexer(#[from] MultiplexerError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Session registry is not running")]
    Closed,
}

/// Notifications for observers (front-ends, tests)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Created { id: SessionId, name: String },
    StatusChanged { id: SessionId, status: SessionStatus },
    DirectoryChanged { id: SessionId, path: PathBuf },
    Renamed { id: SessionId, name: String },
    LaunchFailed { id: SessionId, error: String },
    Terminated { id: SessionId },
    ActiveChanged { id: SessionId },
}

/// A chunk of terminal output from one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalOutput {
    pub id: SessionId,
    pub bytes: Vec<u8>,
}

/// Both renderings of one assistant message; the registry picks one atomically
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantInvocation {
    /// Shell line starting the assistant with the message as its argument
    pub start: String,
    /// Line typed into an assistant that is already running
    pub forward: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantDelivery {
    Started,
    Forwarded,
}

type Reply<T> = oneshot::Sender<Result<T, RegistryError>>;

#[derive(Debug)]
pub(crate) enum RegistryCommand {
    Bootstrap { reply: Reply<Vec<Session>> },
    Create { name: Option<String>, cwd: Option<PathBuf>, reply: Reply<Session> },
    Select { id: SessionId, reply: Reply<Session> },
    Close { id: SessionId, reply: Reply<Session> },
    Retry { id: SessionId, reply: Reply<Session> },
    Remove { id: SessionId, reply: Reply<Session> },
    Rename { id: SessionId, name: String, reply: Reply<Session> },
    List { reply: oneshot::Sender<Vec<Session>> },
    Get { id: SessionId, reply: oneshot::Sender<Option<Session>> },
    Active { reply: oneshot::Sender<Option<Session>> },
    SendInput { id: SessionId, bytes: Vec<u8>, reply: Reply<()> },
    DeliverToAssistant { id: SessionId, invocation: AssistantInvocation, reply: Reply<AssistantDelivery> },
    Resize { id: SessionId, cols: u16, rows: u16, reply: Reply<()> },
    Refresh { id: SessionId, reply: Reply<()> },
    DirectoryState { id: SessionId, reply: Reply<DirectoryState> },
    GitStatus { id: SessionId, reply: Reply<GitStatus> },
    DirectoryReported { id: SessionId, generation: u64, path: PathBuf },
    ProcessExited { id: SessionId, generation: u64 },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Cheap, cloneable access to a running SessionRegistry
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    commands: mpsc::UnboundedSender<RegistryCommand>,
    events: broadcast::Sender<SessionEvent>,
    output: broadcast::Sender<TerminalOutput>,
}

impl RegistryHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<TerminalOutput> {
        self.output.subscribe()
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> RegistryCommand) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).map_err(|_| RegistryError::Closed)?;
        rx.await.map_err(|_| RegistryError::Closed)?
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).map_err(|_| RegistryError::Closed)?;
        rx.await.map_err(|_| RegistryError::Closed)
    }

    /// Reattach live sessions from the sessions directory, or create the first one
    pub async fn bootstrap(&self) -> Result<Vec<Session>, RegistryError> {
        self.call(|reply| RegistryCommand::Bootstrap { reply }).await
    }

    /// Create and activate a session. A spawn failure is reported on the returned
    /// session (`launch_error`), not as an error.
    pub async fn create_session(
        &self,
        name: Option<String>,
        cwd: Option<PathBuf>,
    ) -> Result<Session, RegistryError> {
        self.call(|reply| RegistryCommand::Create { name, cwd, reply }).await
    }

    pub async fn select(&self, id: &SessionId) -> Result<Session, RegistryError> {
        let id = id.clone();
        self.call(|reply| RegistryCommand::Select { id, reply }).await
    }

    /// Terminate a session. Closing the last one creates its replacement first.
    pub async fn close(&self, id: &SessionId) -> Result<Session, RegistryError> {
        let id = id.clone();
        self.call(|reply| RegistryCommand::Close { id, reply }).await
    }

    pub async fn retry(&self, id: &SessionId) -> Result<Session, RegistryError> {
        let id = id.clone();
        self.call(|reply| RegistryCommand::Retry { id, reply }).await
    }

    /// Drop a session whose launch failed
    pub async fn remove(&self, id: &SessionId) -> Result<Session, RegistryError> {
        let id = id.clone();
        self.call(|reply| RegistryCommand::Remove { id, reply }).await
    }

    pub async fn rename(&self, id: &SessionId, name: impl Into<String>) -> Result<Session, RegistryError> {
        let (id, name) = (id.clone(), name.into());
        self.call(|reply| RegistryCommand::Rename { id, name, reply }).await
    }

    pub async fn sessions(&self) -> Result<Vec<Session>, RegistryError> {
        self.query(|reply| RegistryCommand::List { reply }).await
    }

    pub async fn session(&self, id: &SessionId) -> Result<Option<Session>, RegistryError> {
        let id = id.clone();
        self.query(|reply| RegistryCommand::Get { id, reply }).await
    }

    pub async fn active(&self) -> Result<Option<Session>, RegistryError> {
        self.query(|reply| RegistryCommand::Active { reply }).await
    }

    pub async fn send_input(&self, id: &SessionId, bytes: impl Into<Vec<u8>>) -> Result<(), RegistryError> {
        let (id, bytes) = (id.clone(), bytes.into());
        self.call(|reply| RegistryCommand::SendInput { id, bytes, reply }).await
    }

    /// Start the assistant in the session, or forward to it if it already runs there
    pub async fn deliver_to_assistant(
        &self,
        id: &SessionId,
        invocation: AssistantInvocation,
    ) -> Result<AssistantDelivery, RegistryError> {
        let id = id.clone();
        self.call(|reply| RegistryCommand::DeliverToAssistant { id, invocation, reply })
            .await
    }

    pub async fn resize(&self, id: &SessionId, cols: u16, rows: u16) -> Result<(), RegistryError> {
        let id = id.clone();
        self.call(|reply| RegistryCommand::Resize { id, cols, rows, reply }).await
    }

    pub async fn refresh(&self, id: &SessionId) -> Result<(), RegistryError> {
        let id = id.clone();
        self.call(|reply| RegistryCommand::Refresh { id, reply }).await
    }

    pub async fn directory_state(&self, id: &SessionId) -> Result<DirectoryState, RegistryError> {
        let id = id.clone();
        self.call(|reply| RegistryCommand::DirectoryState { id, reply }).await
    }

    pub async fn git_status(&self, id: &SessionId) -> Result<GitStatus, RegistryError> {
        let id = id.clone();
        self.call(|reply| RegistryCommand::GitStatus { id, reply }).await
    }

    /// Detach every front-end and stop the registry. Shells keep running.
    pub async fn shutdown(&self) -> Result<(), RegistryError> {
        self.query(|reply| RegistryCommand::Shutdown { reply }).await
    }
}
