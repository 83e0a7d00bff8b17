// ABOUTME: SessionRegistry actor task: owns sessions, attachments and per-session sync
//
// Lifecycle: Created -> Idle/Active (attached) -> Terminated.
// - There is always at least one non-terminated session once bootstrapped; closing
//   the last one creates its replacement before the close completes
// - Sidecar metadata is rewritten on every session mutation
// - A front-end exit with a still-live socket is a reattach, not a termination

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{
    AssistantDelivery, AssistantInvocation, RegistryCommand, RegistryError, RegistryHandle,
    SessionEvent, TerminalOutput,
};
use crate::config::AppConfig;
use crate::git::GitStatusProbe;
use crate::models::{DirectoryState, GitStatus, Session, SessionId, SessionStatus};
use crate::multiplexer::{MetadataStore, Multiplexer, SocketHandle};
use crate::runner::CommandRunner;
use crate::sync::{DirectoryLister, DirectorySync, SyncOptions};
use crate::terminal::TerminalEvent;

const DEFAULT_SESSION_NAME: &str = "main";
const EVENT_CAPACITY: usize = 256;
const OUTPUT_CAPACITY: usize = 1024;

/// Automatic reattaches allowed before a session is put in the error state
const MAX_REATTACH_ATTEMPTS: u32 = 3;
/// An attachment that lived this long resets the reattach budget
const STABLE_ATTACH: Duration = Duration::from_secs(5);

struct Attachment {
    handle: SocketHandle,
    generation: u64,
    forwarder: Option<JoinHandle<()>>,
    attached_at: Instant,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

struct SessionEntry {
    session: Session,
    attachment: Option<Attachment>,
    sync: Option<DirectorySync>,
    reattach_attempts: u32,
}

impl SessionEntry {
    fn new(session: Session) -> Self {
        Self {
            session,
            attachment: None,
            sync: None,
            reattach_attempts: 0,
        }
    }
}

pub struct SessionRegistry {
    config: AppConfig,
    multiplexer: Arc<dyn Multiplexer>,
    metadata: MetadataStore,
    lister: DirectoryLister,
    probe: GitStatusProbe,
    sync_options: SyncOptions,
    entries: Vec<SessionEntry>,
    active: Option<SessionId>,
    events: broadcast::Sender<SessionEvent>,
    output: broadcast::Sender<TerminalOutput>,
    commands: Option<mpsc::WeakUnboundedSender<RegistryCommand>>,
    next_generation: u64,
}

impl SessionRegistry {
    pub fn new(config: AppConfig, multiplexer: Arc<dyn Multiplexer>, runner: Arc<dyn CommandRunner>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (output, _) = broadcast::channel(OUTPUT_CAPACITY);

        Self {
            metadata: MetadataStore::new(multiplexer.root()),
            lister: DirectoryLister::from_config(runner.clone(), &config),
            probe: GitStatusProbe::from_config(runner, &config),
            sync_options: SyncOptions::from_config(&config),
            config,
            multiplexer,
            entries: Vec::new(),
            active: None,
            events,
            output,
            commands: None,
            next_generation: 0,
        }
    }

    pub fn with_sync_options(mut self, options: SyncOptions) -> Self {
        self.sync_options = options;
        self
    }

    /// Start the actor task and return a handle to it
    pub fn spawn(mut self) -> RegistryHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.commands = Some(tx.downgrade());

        let handle = RegistryHandle {
            commands: tx,
            events: self.events.clone(),
            output: self.output.clone(),
        };
        tokio::spawn(self.run(rx));
        handle
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RegistryCommand>) {
        while let Some(command) = commands.recv().await {
            if let RegistryCommand::Shutdown { reply } = command {
                self.detach_all();
                let _ = reply.send(());
                info!("Session registry stopped");
                return;
            }
            self.handle(command).await;
        }

        self.detach_all();
        debug!("All registry handles dropped");
    }

    async fn handle(&mut self, command: RegistryCommand) {
        match command {
            RegistryCommand::Bootstrap { reply } => {
                let _ = reply.send(self.bootstrap().await);
            }
            RegistryCommand::Create { name, cwd, reply } => {
                let _ = reply.send(self.create(name, cwd).await);
            }
            RegistryCommand::Select { id, reply } => {
                let _ = reply.send(self.select(&id));
            }
            RegistryCommand::Close { id, reply } => {
                let _ = reply.send(self.close(&id).await);
            }
            RegistryCommand::Retry { id, reply } => {
                let _ = reply.send(self.retry(&id).await);
            }
            RegistryCommand::Remove { id, reply } => {
                let _ = reply.send(self.remove(&id).await);
            }
            RegistryCommand::Rename { id, name, reply } => {
                let _ = reply.send(self.rename(&id, name));
            }
            RegistryCommand::List { reply } => {
                let _ = reply.send(self.snapshots());
            }
            RegistryCommand::Get { id, reply } => {
                let _ = reply.send(self.position(&id).map(|i| self.entries[i].session.clone()));
            }
            RegistryCommand::Active { reply } => {
                let active = self
                    .active
                    .clone()
                    .and_then(|id| self.position(&id))
                    .map(|i| self.entries[i].session.clone());
                let _ = reply.send(active);
            }
            RegistryCommand::SendInput { id, bytes, reply } => {
                let _ = reply.send(self.send_input(&id, &bytes));
            }
            RegistryCommand::DeliverToAssistant { id, invocation, reply } => {
                let _ = reply.send(self.deliver_to_assistant(&id, &invocation));
            }
            RegistryCommand::Resize { id, cols, rows, reply } => {
                let _ = reply.send(self.resize(&id, cols, rows));
            }
            RegistryCommand::Refresh { id, reply } => {
                let _ = reply.send(self.refresh(&id));
            }
            RegistryCommand::DirectoryState { id, reply } => {
                let _ = reply.send(self.directory_state(&id));
            }
            RegistryCommand::GitStatus { id, reply } => {
                let _ = reply.send(self.git_status(&id));
            }
            RegistryCommand::DirectoryReported { id, generation, path } => {
                self.directory_reported(&id, generation, path);
            }
            RegistryCommand::ProcessExited { id, generation } => {
                self.process_exited(&id, generation).await;
            }
            RegistryCommand::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    // --- lookups -----------------------------------------------------------

    fn position(&self, id: &SessionId) -> Option<usize> {
        self.entries.iter().position(|e| &e.session.id == id)
    }

    fn index(&self, id: &SessionId) -> Result<usize, RegistryError> {
        self.position(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    fn snapshot(&self, index: usize) -> Session {
        self.entries[index].session.clone()
    }

    fn snapshots(&self) -> Vec<Session> {
        self.entries.iter().map(|e| e.session.clone()).collect()
    }

    fn attached_handle(&mut self, id: &SessionId) -> Result<&mut SocketHandle, RegistryError> {
        let index = self.index(id)?;
        self.entries[index]
            .attachment
            .as_mut()
            .map(|a| &mut a.handle)
            .ok_or_else(|| RegistryError::NotAttached(id.clone()))
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn persist(&self, index: usize) {
        let session = &self.entries[index].session;
        if let Err(e) = self.metadata.write(&session.id, &session.metadata()) {
            warn!(session = %session.id, error = %e, "Failed to write session metadata");
        }
    }

    fn default_directory(&self) -> PathBuf {
        self.active
            .as_ref()
            .and_then(|id| self.position(id))
            .map(|i| self.entries[i].session.working_directory.clone())
            .or_else(|| std::env::current_dir().ok())
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/"))
    }

    // --- lifecycle ---------------------------------------------------------

    async fn bootstrap(&mut self) -> Result<Vec<Session>, RegistryError> {
        if !self.entries.is_empty() {
            return Ok(self.snapshots());
        }

        let discovered = self.multiplexer.list_existing_sockets()?;
        info!(count = discovered.len(), root = %self.multiplexer.root().display(), "Reattaching existing sessions");

        for found in discovered {
            let (name, cwd, fresh_metadata) = match found.metadata {
                Some(metadata) => (metadata.name, metadata.current_directory, false),
                None => (
                    format!("session-{}", found.id),
                    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
                    true,
                ),
            };

            self.entries.push(SessionEntry::new(Session::new(found.id.clone(), name.clone(), cwd)));
            let index = self.entries.len() - 1;
            if fresh_metadata {
                self.persist(index);
            }
            self.emit(SessionEvent::Created { id: found.id.clone(), name });

            match self
                .multiplexer
                .reattach_session(&found.id, &found.socket_path)
                .await
            {
                Ok(handle) => self.attach(index, handle),
                Err(e) => self.launch_failed(index, e.to_string()),
            }
        }

        if self.entries.is_empty() {
            let cwd = self.default_directory();
            self.create_entry(DEFAULT_SESSION_NAME.to_string(), cwd).await;
        }

        if let Some(first) = self.entries.iter().find(|e| e.attachment.is_some()) {
            let id = first.session.id.clone();
            self.activate(&id)?;
        }

        info!(count = self.entries.len(), "Session registry ready");
        Ok(self.snapshots())
    }

    async fn create(&mut self, name: Option<String>, cwd: Option<PathBuf>) -> Result<Session, RegistryError> {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("session-{}", self.entries.len() + 1));
        let cwd = cwd.unwrap_or_else(|| self.default_directory());

        let index = self.create_entry(name, cwd).await;
        if self.entries[index].attachment.is_some() {
            let id = self.entries[index].session.id.clone();
            self.activate(&id)?;
        }
        Ok(self.snapshot(index))
    }

    /// Register a new session and spawn its shell; returns the entry index
    async fn create_entry(&mut self, name: String, cwd: PathBuf) -> usize {
        let id = SessionId::generate();
        info!(session = %id, name = %name, cwd = %cwd.display(), "Creating session");

        self.entries.push(SessionEntry::new(Session::new(id.clone(), name.clone(), cwd)));
        let index = self.entries.len() - 1;
        self.persist(index);
        self.emit(SessionEvent::Created { id, name });

        self.launch(index).await;
        index
    }

    async fn launch(&mut self, index: usize) {
        let session = &self.entries[index].session;
        let result = self
            .multiplexer
            .create_session(
                &session.id,
                &self.config.sessions.shell,
                &self.config.sessions.environment,
                &session.working_directory,
            )
            .await;

        match result {
            Ok(handle) => self.attach(index, handle),
            Err(e) => self.launch_failed(index, e.to_string()),
        }
    }

    fn attach(&mut self, index: usize, mut handle: SocketHandle) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let id = self.entries[index].session.id.clone();

        let forwarder = handle.take_events().map(|events| {
            tokio::spawn(forward_terminal_events(
                id.clone(),
                generation,
                events,
                self.commands.clone(),
                self.output.clone(),
            ))
        });

        let entry = &mut self.entries[index];
        let status = match entry.session.status {
            SessionStatus::Active => SessionStatus::Active,
            _ => SessionStatus::Idle,
        };
        entry.session.mark_launched(handle.socket_path().to_path_buf(), status);
        entry.attachment = Some(Attachment {
            handle,
            generation,
            forwarder,
            attached_at: Instant::now(),
        });

        if entry.sync.is_none() {
            entry.sync = Some(DirectorySync::spawn(
                id.clone(),
                entry.session.working_directory.clone(),
                self.lister.clone(),
                self.probe.clone(),
                self.sync_options,
            ));
        }

        debug!(session = %id, generation, "Session attached");
        self.emit(SessionEvent::StatusChanged { id, status });
    }

    fn launch_failed(&mut self, index: usize, error: String) {
        let entry = &mut self.entries[index];
        error!(session = %entry.session.id, error = %error, "Session failed to launch");

        entry.attachment = None;
        let demoted = entry.session.mark_launch_failed(error.clone());
        let id = entry.session.id.clone();
        let was_active = self.active.as_ref() == Some(&id);
        if was_active {
            self.active = None;
        }
        if demoted {
            self.emit(SessionEvent::StatusChanged {
                id: id.clone(),
                status: SessionStatus::Idle,
            });
        }
        self.emit(SessionEvent::LaunchFailed { id, error });

        if was_active {
            self.activate_first_attached();
        }
    }

    /// Hand the active slot to the first session that still has a front-end
    fn activate_first_attached(&mut self) {
        let Some(next) = self
            .entries
            .iter()
            .find(|entry| entry.attachment.is_some())
            .map(|entry| entry.session.id.clone())
        else {
            return;
        };
        if let Err(e) = self.activate(&next) {
            warn!(session = %next, error = %e, "Failed to activate fallback session");
        }
    }

    fn activate(&mut self, id: &SessionId) -> Result<(), RegistryError> {
        let index = self.index(id)?;
        if self.entries[index].attachment.is_none() {
            return Err(RegistryError::NotAttached(id.clone()));
        }

        // At most one session is Active at a time
        let previous: Vec<SessionId> = self
            .entries
            .iter()
            .filter(|entry| &entry.session.id != id && entry.session.status == SessionStatus::Active)
            .map(|entry| entry.session.id.clone())
            .collect();
        for prev in previous {
            if let Some(prev_index) = self.position(&prev) {
                if self.entries[prev_index].session.set_status(SessionStatus::Idle) {
                    self.emit(SessionEvent::StatusChanged {
                        id: prev,
                        status: SessionStatus::Idle,
                    });
                }
            }
        }

        self.entries[index].session.set_status(SessionStatus::Active);
        self.active = Some(id.clone());
        self.emit(SessionEvent::StatusChanged {
            id: id.clone(),
            status: SessionStatus::Active,
        });
        self.emit(SessionEvent::ActiveChanged { id: id.clone() });
        Ok(())
    }

    fn select(&mut self, id: &SessionId) -> Result<Session, RegistryError> {
        self.activate(id)?;
        let index = self.index(id)?;
        Ok(self.snapshot(index))
    }

    async fn close(&mut self, id: &SessionId) -> Result<Session, RegistryError> {
        self.index(id)?;
        self.terminate(id).await
    }

    async fn remove(&mut self, id: &SessionId) -> Result<Session, RegistryError> {
        let index = self.index(id)?;
        if self.entries[index].attachment.is_some() {
            return Err(RegistryError::InvalidState(format!(
                "session {id} is running; close it instead"
            )));
        }
        self.terminate(id).await
    }

    /// Remove a session for good, deleting its socket and sidecar
    async fn terminate(&mut self, id: &SessionId) -> Result<Session, RegistryError> {
        if self.entries.len() == 1 {
            let cwd = self.entries[0].session.working_directory.clone();
            info!(session = %id, "Closing last session; creating a replacement");
            self.create_entry(DEFAULT_SESSION_NAME.to_string(), cwd).await;
        }

        let index = self.index(id)?;
        let mut entry = self.entries.remove(index);
        entry.attachment = None;
        entry.sync = None;

        if let Err(e) = self.multiplexer.terminate_session(id).await {
            warn!(session = %id, error = %e, "Failed to clean up session files");
        }

        entry.session.set_status(SessionStatus::Terminated);
        info!(session = %id, name = %entry.session.name, "Session terminated");
        self.emit(SessionEvent::Terminated { id: id.clone() });

        if self.active.as_ref() == Some(id) {
            self.active = None;
            if let Some(next) = self.entries.iter().find(|e| e.attachment.is_some()) {
                let next = next.session.id.clone();
                self.activate(&next)?;
            }
        }

        Ok(entry.session)
    }

    async fn retry(&mut self, id: &SessionId) -> Result<Session, RegistryError> {
        let index = self.index(id)?;
        if !self.entries[index].session.has_launch_error() {
            return Err(RegistryError::InvalidState(format!("session {id} has not failed")));
        }

        info!(session = %id, "Retrying session launch");
        self.entries[index].reattach_attempts = 0;

        if self.multiplexer.is_live(id) {
            let socket = self.multiplexer.socket_path(id);
            match self.multiplexer.reattach_session(id, &socket).await {
                Ok(handle) => self.attach(index, handle),
                Err(e) => self.launch_failed(index, e.to_string()),
            }
        } else {
            self.launch(index).await;
        }

        if self.active.is_none() && self.entries[index].attachment.is_some() {
            self.activate(id)?;
        }
        Ok(self.snapshot(index))
    }

    fn rename(&mut self, id: &SessionId, name: String) -> Result<Session, RegistryError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::InvalidState("session name cannot be empty".to_string()));
        }

        let index = self.index(id)?;
        let session = &mut self.entries[index].session;
        session.name = name.clone();
        session.touch();
        self.persist(index);
        self.emit(SessionEvent::Renamed { id: id.clone(), name });
        Ok(self.snapshot(index))
    }

    fn detach_all(&mut self) {
        for entry in &mut self.entries {
            entry.attachment = None;
            entry.sync = None;
        }
        info!(count = self.entries.len(), "Detached all sessions; shells keep running");
    }

    // --- terminal I/O ------------------------------------------------------

    fn send_input(&mut self, id: &SessionId, bytes: &[u8]) -> Result<(), RegistryError> {
        self.attached_handle(id)?.write_input(bytes)?;
        let index = self.index(id)?;
        self.entries[index].session.touch();
        Ok(())
    }

    fn deliver_to_assistant(
        &mut self,
        id: &SessionId,
        invocation: &AssistantInvocation,
    ) -> Result<AssistantDelivery, RegistryError> {
        let index = self.index(id)?;
        let entry = &mut self.entries[index];
        let attachment = entry
            .attachment
            .as_mut()
            .ok_or_else(|| RegistryError::NotAttached(id.clone()))?;

        let (line, delivery) = if entry.session.assistant_attached {
            (&invocation.forward, AssistantDelivery::Forwarded)
        } else {
            (&invocation.start, AssistantDelivery::Started)
        };
        attachment.handle.write_input(line.as_bytes())?;

        entry.session.assistant_attached = true;
        entry.session.touch();
        info!(session = %id, delivery = ?delivery, "Delivered message to assistant");
        Ok(delivery)
    }

    fn resize(&mut self, id: &SessionId, cols: u16, rows: u16) -> Result<(), RegistryError> {
        self.attached_handle(id)?.resize(cols, rows)?;
        Ok(())
    }

    fn refresh(&self, id: &SessionId) -> Result<(), RegistryError> {
        let index = self.index(id)?;
        if let Some(sync) = &self.entries[index].sync {
            sync.request_refresh();
        }
        Ok(())
    }

    fn directory_state(&self, id: &SessionId) -> Result<DirectoryState, RegistryError> {
        let entry = &self.entries[self.index(id)?];
        Ok(match &entry.sync {
            Some(sync) => sync.state(),
            None => DirectoryState::new(entry.session.working_directory.clone()),
        })
    }

    fn git_status(&self, id: &SessionId) -> Result<GitStatus, RegistryError> {
        let entry = &self.entries[self.index(id)?];
        Ok(entry
            .sync
            .as_ref()
            .map(|sync| sync.git_status())
            .unwrap_or_default())
    }

    // --- notifications from front-ends -------------------------------------

    fn is_current(&self, index: usize, generation: u64) -> bool {
        self.entries[index]
            .attachment
            .as_ref()
            .is_some_and(|a| a.generation == generation)
    }

    fn directory_reported(&mut self, id: &SessionId, generation: u64, path: PathBuf) {
        let Some(index) = self.position(id) else {
            return;
        };
        if !self.is_current(index, generation) {
            return;
        }

        let entry = &mut self.entries[index];
        // The shell printed a prompt, so it owns the terminal again
        entry.session.assistant_attached = false;

        let changed = entry.session.set_working_directory(&path);
        if let Some(sync) = &entry.sync {
            sync.directory_changed(path.clone());
        }

        if changed {
            debug!(session = %id, dir = %path.display(), "Working directory changed");
            self.persist(index);
            self.emit(SessionEvent::DirectoryChanged { id: id.clone(), path });
        }
    }

    async fn process_exited(&mut self, id: &SessionId, generation: u64) {
        let Some(index) = self.position(id) else {
            return;
        };
        if !self.is_current(index, generation) {
            debug!(session = %id, generation, "Ignoring exit of a replaced front-end");
            return;
        }

        let stable = self.entries[index]
            .attachment
            .take()
            .is_some_and(|a| a.attached_at.elapsed() >= STABLE_ATTACH);
        self.entries[index].session.assistant_attached = false;

        if !self.multiplexer.is_live(id) {
            info!(session = %id, "Shell exited");
            if let Err(e) = self.terminate(id).await {
                warn!(session = %id, error = %e, "Failed to terminate exited session");
            }
            return;
        }

        let entry = &mut self.entries[index];
        if stable {
            entry.reattach_attempts = 0;
        }
        entry.reattach_attempts += 1;
        if entry.reattach_attempts > MAX_REATTACH_ATTEMPTS {
            self.launch_failed(index, "terminal front-end keeps exiting".to_string());
            return;
        }

        warn!(session = %id, attempt = entry.reattach_attempts, "Front-end exited but shell is alive; reattaching");
        let socket = self.multiplexer.socket_path(id);
        match self.multiplexer.reattach_session(id, &socket).await {
            Ok(handle) => self.attach(index, handle),
            Err(e) => self.launch_failed(index, e.to_string()),
        }
    }
}

/// Pump one attachment's events into the output broadcast and the registry
async fn forward_terminal_events(
    id: SessionId,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TerminalEvent>,
    commands: Option<mpsc::WeakUnboundedSender<RegistryCommand>>,
    output: broadcast::Sender<TerminalOutput>,
) {
    let notify = |command: RegistryCommand| -> bool {
        commands
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .is_some_and(|tx| tx.send(command).is_ok())
    };

    while let Some(event) = events.recv().await {
        match event {
            TerminalEvent::Output(bytes) => {
                let _ = output.send(TerminalOutput { id: id.clone(), bytes });
            }
            TerminalEvent::DirectoryChanged(path) => {
                if !notify(RegistryCommand::DirectoryReported {
                    id: id.clone(),
                    generation,
                    path,
                }) {
                    return;
                }
            }
            TerminalEvent::Exited => {
                notify(RegistryCommand::ProcessExited { id: id.clone(), generation });
                return;
            }
        }
    }

    // Channel closed without an exit report: treat it as one
    notify(RegistryCommand::ProcessExited { id, generation });
}
