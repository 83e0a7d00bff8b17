// ABOUTME: PTY (Pseudo-Terminal) front-end attached to a multiplexer socket
//
// Runs the multiplexer client inside a PTY, providing:
// - Input writes and terminal resize
// - A reader thread that forwards output and directory reports as TerminalEvents
// - Detach by killing the client process only (the shell keeps running), also on drop

use std::io::{self, Read, Write};

use portable_pty::{Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{MultiplexerError, TerminalIo};
use crate::terminal::{DirectoryReportScanner, TerminalEvent};

const READ_BUFFER_SIZE: usize = 8192;

/// Multiplexer client process running in a PTY
pub struct PtyAttachment {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl PtyAttachment {
    /// Start `cmd` in a new PTY and begin forwarding its output to `events`
    pub fn spawn(
        cmd: CommandBuilder,
        cols: u16,
        rows: u16,
        events: mpsc::UnboundedSender<TerminalEvent>,
    ) -> Result<Self, MultiplexerError> {
        let pty_system = portable_pty::native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| MultiplexerError::SpawnFailed(format!("openpty: {e}")))?;

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| MultiplexerError::SpawnFailed(e.to_string()))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| MultiplexerError::SpawnFailed(format!("pty reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| MultiplexerError::SpawnFailed(format!("pty writer: {e}")))?;

        std::thread::Builder::new()
            .name("pty-reader".to_string())
            .spawn(move || pump_output(reader, events))?;

        Ok(Self {
            master: pair.master,
            writer,
            child,
        })
    }

    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }
}

/// Forward PTY output until EOF, then report the exit
fn pump_output(mut reader: Box<dyn Read + Send>, events: mpsc::UnboundedSender<TerminalEvent>) {
    let mut scanner = DirectoryReportScanner::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let chunk = &buf[..n];
                let reports = scanner.feed(chunk);
                if events.send(TerminalEvent::Output(chunk.to_vec())).is_err() {
                    // Receiver gone: nobody is listening anymore
                    return;
                }
                for path in reports {
                    let _ = events.send(TerminalEvent::DirectoryChanged(path));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // EIO is how Linux reports a closed PTY
                debug!("PTY read ended: {}", e);
                break;
            }
        }
    }

    let _ = events.send(TerminalEvent::Exited);
}

impl TerminalIo for PtyAttachment {
    fn write_input(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()
    }

    fn resize(&mut self, cols: u16, rows: u16) -> io::Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }

    fn detach(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!("Failed to stop terminal front-end: {}", e);
        }
        let _ = self.child.wait();
    }
}

impl Drop for PtyAttachment {
    fn drop(&mut self) {
        self.detach();
    }
}
