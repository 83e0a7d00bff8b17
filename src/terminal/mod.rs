// ABOUTME: Terminal byte-stream adapters
//
// The terminal emulator itself is an external collaborator; the only thing
// the core needs from the stream is the shell's prompt-time directory report.

pub mod osc;

pub use osc::DirectoryReportScanner;

use std::path::PathBuf;

/// Events surfaced by a session's terminal front-end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// Raw output bytes for rendering
    Output(Vec<u8>),
    /// The shell reported its working directory (OSC 7)
    DirectoryChanged(PathBuf),
    /// The front-end's attach process ended
    Exited,
}
