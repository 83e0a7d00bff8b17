// ABOUTME: Detachable shell process management over Unix-domain socket files
//
// Each session's shell lives inside an external multiplexer process bound to
// `<root>/<id>.sock`, so the shell survives application restarts:
// - `create_session` starts the multiplexer in "new" mode and attaches a front-end
// - `reattach_session` attaches a front-end to an existing socket, never a new shell
// - `list_existing_sockets` finds live sockets and prunes stale entries
// - `terminate_session` hangs up the shell, then deletes the socket (and sidecar) idempotently

pub mod discovery;
pub mod dtach;
pub mod metadata;
pub mod pty_wrapper;
pub mod shell_hook;

pub use discovery::{is_live_socket, list_existing_sockets, DiscoveredSession, DiscoveryError};
pub use dtach::ProcessMultiplexer;
pub use metadata::{MetadataError, MetadataStore};
pub use pty_wrapper::PtyAttachment;

use crate::models::SessionId;
use crate::terminal::TerminalEvent;
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum MultiplexerError {
    #[error("Binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Failed to spawn multiplexer: {0}")]
    SpawnFailed(String),

    #[error("Timed out after {0:?} waiting for the session socket")]
    AttachTimedOut(Duration),

    #[error("Socket is not live: {0}")]
    StaleSocket(PathBuf),

    #[error("Socket already exists: {0}")]
    SocketInUse(PathBuf),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Socket file for a session id
pub fn socket_path(root: &Path, id: &SessionId) -> PathBuf {
    root.join(format!("{id}.sock"))
}

/// Sidecar metadata file for a session id
pub fn metadata_path(root: &Path, id: &SessionId) -> PathBuf {
    root.join(format!("{id}.json"))
}

/// Pid of the shell behind a session socket, written by the shell launcher
pub fn pid_path(root: &Path, id: &SessionId) -> PathBuf {
    root.join(format!(".{id}.pid"))
}

/// Send SIGHUP to the shell recorded in `pid_file`, as a closing terminal would.
///
/// Returns whether a signal was delivered. A missing or unreadable pid file, or a
/// shell that already exited, is not an error.
pub(crate) fn hang_up_shell(pid_file: &Path) -> bool {
    let Ok(contents) = std::fs::read_to_string(pid_file) else {
        return false;
    };
    let Ok(pid) = contents.trim().parse::<i32>() else {
        tracing::warn!(path = %pid_file.display(), "Ignoring malformed shell pid file");
        return false;
    };
    if pid <= 1 {
        return false;
    }

    match kill(Pid::from_raw(pid), Signal::SIGHUP) {
        Ok(()) => {
            tracing::debug!(pid, "Sent SIGHUP to session shell");
            true
        }
        Err(Errno::ESRCH) => false,
        Err(e) => {
            tracing::warn!(pid, error = %e, "Failed to hang up session shell");
            false
        }
    }
}

/// Remove a file, treating "already gone" as success.
///
/// Several application instances may prune the same entry concurrently.
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Terminal front-end I/O wired to a multiplexer socket
pub trait TerminalIo: Send {
    fn write_input(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn resize(&mut self, cols: u16, rows: u16) -> io::Result<()>;
    /// Stop the front-end without touching the shell behind the socket
    fn detach(&mut self);
}

/// An attached front-end for one session
pub struct SocketHandle {
    id: SessionId,
    socket_path: PathBuf,
    io: Box<dyn TerminalIo>,
    events: Option<mpsc::UnboundedReceiver<TerminalEvent>>,
}

impl std::fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketHandle")
            .field("id", &self.id)
            .field("socket_path", &self.socket_path)
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl SocketHandle {
    pub fn new(
        id: SessionId,
        socket_path: PathBuf,
        io: Box<dyn TerminalIo>,
        events: mpsc::UnboundedReceiver<TerminalEvent>,
    ) -> Self {
        Self {
            id,
            socket_path,
            io,
            events: Some(events),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn write_input(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.io.write_input(bytes)
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> io::Result<()> {
        self.io.resize(cols, rows)
    }

    /// Take the terminal event stream; only the first caller gets it
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TerminalEvent>> {
        self.events.take()
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.io.detach();
    }
}

#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Directory holding session sockets and sidecars
    fn root(&self) -> &Path;

    async fn create_session(
        &self,
        id: &SessionId,
        shell: &str,
        env: &HashMap<String, String>,
        cwd: &Path,
    ) -> Result<SocketHandle, MultiplexerError>;

    async fn reattach_session(
        &self,
        id: &SessionId,
        socket_path: &Path,
    ) -> Result<SocketHandle, MultiplexerError>;

    fn list_existing_sockets(&self) -> Result<Vec<DiscoveredSession>, DiscoveryError> {
        list_existing_sockets(self.root())
    }

    /// Hang up the session's shell, then delete its socket, sidecar and pid file.
    /// Calling it again is a no-op.
    async fn terminate_session(&self, id: &SessionId) -> Result<(), MultiplexerError> {
        let root = self.root();
        let sock = socket_path(root, id);
        let pid_file = pid_path(root, id);
        // Only a live socket vouches for the recorded pid still being our shell
        if is_live_socket(&sock) {
            hang_up_shell(&pid_file);
        }
        let socket_removed = remove_if_exists(&sock)?;
        remove_if_exists(&metadata_path(root, id))?;
        remove_if_exists(&pid_file)?;
        if socket_removed {
            tracing::info!(session = %id, "Terminated session");
        } else {
            tracing::debug!(session = %id, "Session already terminated");
        }
        Ok(())
    }

    fn socket_path(&self, id: &SessionId) -> PathBuf {
        socket_path(self.root(), id)
    }

    fn is_live(&self, id: &SessionId) -> bool {
        is_live_socket(&socket_path(self.root(), id))
    }
}
