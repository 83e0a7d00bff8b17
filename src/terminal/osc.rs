// ABOUTME: Incremental scanner for OSC 7 working-directory reports in shell output
//
// Shells with directory reporting enabled print `ESC ] 7 ; file://host/path`
// terminated by BEL or `ESC \` every time the prompt is drawn. Output arrives in
// arbitrary chunks, so the scanner keeps its parse state between calls.

use std::path::PathBuf;
use url::Url;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;
const MAX_OSC_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    Escape,
    Osc,
    OscEscape,
}

#[derive(Debug)]
pub struct DirectoryReportScanner {
    state: State,
    buffer: Vec<u8>,
}

impl Default for DirectoryReportScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryReportScanner {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            buffer: Vec::new(),
        }
    }

    /// Feed a chunk of output and return every directory reported in it, in order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<PathBuf> {
        let mut reports = Vec::new();

        for &byte in chunk {
            self.state = match (self.state, byte) {
                (State::Ground, ESC) => State::Escape,
                (State::Ground, _) => State::Ground,
                (State::Escape, b']') => {
                    self.buffer.clear();
                    State::Osc
                }
                (State::Escape, ESC) => State::Escape,
                (State::Escape, _) => State::Ground,
                (State::Osc, BEL) => {
                    reports.extend(self.finish());
                    State::Ground
                }
                (State::Osc, ESC) => State::OscEscape,
                (State::Osc, _) => {
                    if self.buffer.len() >= MAX_OSC_LEN {
                        self.buffer.clear();
                        State::Ground
                    } else {
                        self.buffer.push(byte);
                        State::Osc
                    }
                }
                (State::OscEscape, b'\\') => {
                    reports.extend(self.finish());
                    State::Ground
                }
                // Any other escape aborts the sequence and may start a new one
                (State::OscEscape, b']') => {
                    self.buffer.clear();
                    State::Osc
                }
                (State::OscEscape, _) => {
                    self.buffer.clear();
                    State::Ground
                }
            };
        }

        reports
    }

    fn finish(&mut self) -> Option<PathBuf> {
        let payload = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        let location = payload.strip_prefix("7;")?;
        parse_directory_report(location)
    }
}

/// Parse the body of an OSC 7 report into a local path.
///
/// Format: `file://hostname/path` or `file:///path`; the path is percent-encoded.
/// The hostname is ignored since the session's shell always runs locally.
pub fn parse_directory_report(location: &str) -> Option<PathBuf> {
    if location.starts_with('/') {
        return Some(PathBuf::from(location));
    }

    let parsed = Url::parse(location).ok()?;
    if parsed.scheme() != "file" {
        return None;
    }

    // Re-root on localhost so to_file_path accepts reports from named hosts
    let local = Url::parse(&format!("file://{}", parsed.path())).ok()?;
    local.to_file_path().ok()
}
