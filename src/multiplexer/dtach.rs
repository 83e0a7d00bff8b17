// ABOUTME: dtach-backed ProcessMultiplexer
//
// "new" mode:     dtach -c <sock> -E -r winch sh -c <launcher> <pidfile> <shell> -l
// "attach" mode:  dtach -a <sock> -E -r winch   (attaches only, never starts a shell)
//
// Both run inside a PTY so the front-end sees a real terminal. The shell lives in
// dtach's master process and survives the front-end (and this application) exiting.
// The launcher records the shell's pid (it execs into the shell) so termination can
// hang it up.

use async_trait::async_trait;
use portable_pty::CommandBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{
    is_live_socket, pid_path, remove_if_exists, shell_hook, socket_path, Multiplexer,
    MultiplexerError, PtyAttachment, SocketHandle,
};
use crate::config::AppConfig;
use crate::models::SessionId;

const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Records its own pid, then execs the shell in place
const SHELL_LAUNCHER: &str = r#"echo $$ > "$1"; shift; exec "$@""#;

/// Generated shell start-up files, kept out of discovery by the leading dot
const SHELL_INTEGRATION_DIR: &str = ".shell-integration";

#[derive(Debug, Clone)]
pub struct ProcessMultiplexer {
    root: PathBuf,
    binary: String,
    attach_timeout: Duration,
    cols: u16,
    rows: u16,
}

impl ProcessMultiplexer {
    pub fn new(root: impl Into<PathBuf>, binary: impl Into<String>, attach_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            binary: binary.into(),
            attach_timeout,
            cols: 120,
            rows: 40,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            root: config.sessions.root.clone(),
            binary: config.multiplexer.binary.clone(),
            attach_timeout: config.attach_timeout(),
            cols: config.multiplexer.cols,
            rows: config.multiplexer.rows,
        }
    }

    fn resolve_binary(name: &str) -> Result<PathBuf, MultiplexerError> {
        which::which(name).map_err(|_| MultiplexerError::BinaryNotFound(name.to_string()))
    }

    fn front_end_command(&self, binary: &Path, args: &[&str]) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(binary);
        cmd.args(args);
        cmd.env("TERM", "xterm-256color");
        cmd
    }

    /// Environment that makes `shell` report its directory; a failure only costs directory tracking
    fn directory_report_env(
        &self,
        id: &SessionId,
        shell: &Path,
        env: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let integration_dir = self.root.join(SHELL_INTEGRATION_DIR);
        shell_hook::directory_report_env(shell, &integration_dir, env).unwrap_or_else(|e| {
            warn!(session = %id, shell = %shell.display(), error = %e, "Failed to install directory report hook");
            HashMap::new()
        })
    }

    /// Spawn the PTY front-end off the async runtime, bounded by `deadline`
    async fn spawn_front_end(
        &self,
        id: &SessionId,
        sock: PathBuf,
        cmd: CommandBuilder,
        deadline: Instant,
    ) -> Result<SocketHandle, MultiplexerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (cols, rows) = (self.cols, self.rows);

        // On timeout the task still finishes; dropping its attachment stops the client
        let spawn = tokio::task::spawn_blocking(move || PtyAttachment::spawn(cmd, cols, rows, tx));
        let attachment = match tokio::time::timeout_at(deadline, spawn).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => return Err(MultiplexerError::SpawnFailed(join_error.to_string())),
            Err(_) => return Err(MultiplexerError::AttachTimedOut(self.attach_timeout)),
        };

        debug!(session = %id, pid = ?attachment.process_id(), "Front-end attached");
        Ok(SocketHandle::new(id.clone(), sock, Box::new(attachment), rx))
    }

    /// Wait until the multiplexer has bound its socket
    async fn wait_for_socket(&self, sock: &Path, deadline: Instant) -> Result<(), MultiplexerError> {
        while Instant::now() < deadline {
            if is_live_socket(sock) {
                return Ok(());
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }
        Err(MultiplexerError::AttachTimedOut(self.attach_timeout))
    }
}

#[async_trait]
impl Multiplexer for ProcessMultiplexer {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn create_session(
        &self,
        id: &SessionId,
        shell: &str,
        env: &HashMap<String, String>,
        cwd: &Path,
    ) -> Result<SocketHandle, MultiplexerError> {
        let deadline = Instant::now() + self.attach_timeout;
        let binary = Self::resolve_binary(&self.binary)?;
        let shell_path = Self::resolve_binary(shell)?;
        let launcher = Self::resolve_binary("sh")?;

        std::fs::create_dir_all(&self.root)?;
        let sock = socket_path(&self.root, id);
        if is_live_socket(&sock) {
            return Err(MultiplexerError::SocketInUse(sock));
        }
        // A leftover non-socket file would make dtach fail to bind
        remove_if_exists(&sock)?;
        let pid_file = pid_path(&self.root, id);
        remove_if_exists(&pid_file)?;

        let sock_arg = sock.to_string_lossy().into_owned();
        let launcher_arg = launcher.to_string_lossy().into_owned();
        let pid_arg = pid_file.to_string_lossy().into_owned();
        let shell_arg = shell_path.to_string_lossy().into_owned();
        let mut cmd = self.front_end_command(
            &binary,
            &[
                "-c",
                &sock_arg,
                "-E",
                "-r",
                "winch",
                &launcher_arg,
                "-c",
                SHELL_LAUNCHER,
                "termsync-launch",
                &pid_arg,
                &shell_arg,
                "-l",
            ],
        );
        cmd.cwd(cwd);
        for (key, value) in env {
            cmd.env(key, value);
        }
        for (key, value) in self.directory_report_env(id, &shell_path, env) {
            cmd.env(key, value);
        }

        info!(session = %id, socket = %sock.display(), cwd = %cwd.display(), "Creating session");
        let handle = self.spawn_front_end(id, sock.clone(), cmd, deadline).await?;

        if let Err(e) = self.wait_for_socket(&sock, deadline).await {
            warn!(session = %id, "Multiplexer never bound its socket");
            drop(handle);
            return Err(e);
        }

        Ok(handle)
    }

    async fn reattach_session(
        &self,
        id: &SessionId,
        socket_path: &Path,
    ) -> Result<SocketHandle, MultiplexerError> {
        if !is_live_socket(socket_path) {
            return Err(MultiplexerError::StaleSocket(socket_path.to_path_buf()));
        }
        let binary = Self::resolve_binary(&self.binary)?;

        let sock_arg = socket_path.to_string_lossy().into_owned();
        let cmd = self.front_end_command(&binary, &["-a", &sock_arg, "-E", "-r", "winch"]);

        info!(session = %id, socket = %socket_path.display(), "Reattaching session");
        let deadline = Instant::now() + self.attach_timeout;
        self.spawn_front_end(id, socket_path.to_path_buf(), cmd, deadline).await
    }
}
