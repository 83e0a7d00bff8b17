// ABOUTME: Session socket discovery and stale-entry pruning for the sessions directory
//
// The sessions directory is shared by every running instance of the app:
// - DiscoveredSession: a live socket plus its sidecar metadata (if readable)
// - Liveness is structural only: the path must still be a socket file
// - Stale entries (non-socket `.sock`, orphaned `.json`) are pruned in the same pass
// - Pruning tolerates other instances removing the same files concurrently

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::metadata::read_metadata;
use super::{metadata_path, pid_path, remove_if_exists, socket_path};
use crate::models::{SessionId, SessionMetadata};

#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Sessions directory exists but cannot be read
    #[error("Failed to access sessions directory: {0}")]
    SocketDirAccessFailed(#[source] io::Error),
}

/// A session whose socket is still live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSession {
    pub id: SessionId,
    pub socket_path: PathBuf,
    /// `None` when the sidecar is missing or unreadable
    pub metadata: Option<SessionMetadata>,
}

/// Whether `path` is currently a socket file (symlinks are not followed)
pub fn is_live_socket(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_socket())
        .unwrap_or(false)
}

/// Scan `base_dir` for session entries.
///
/// Every id with a `.sock` or `.json` file is a candidate. Candidates whose socket
/// path is not a socket are pruned together with their sidecar; the rest are
/// returned sorted by id.
pub fn list_existing_sockets(base_dir: &Path) -> Result<Vec<DiscoveredSession>, DiscoveryError> {
    let entries = match fs::read_dir(base_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            // Directory doesn't exist yet - no sessions
            return Ok(Vec::new());
        }
        Err(e) => return Err(DiscoveryError::SocketDirAccessFailed(e)),
    };

    let mut candidates = BTreeSet::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        // Skip in-flight atomic writes from MetadataStore
        if filename.starts_with('.') {
            continue;
        }

        let stem = filename
            .strip_suffix(".sock")
            .or_else(|| filename.strip_suffix(".json"));
        if let Some(stem) = stem.filter(|s| !s.is_empty()) {
            candidates.insert(SessionId::from(stem));
        }
    }

    let mut live = Vec::new();
    let mut pruned = 0;

    for id in candidates {
        let sock = socket_path(base_dir, &id);
        let sidecar = metadata_path(base_dir, &id);

        if !is_live_socket(&sock) {
            prune_entry(&id, &sock, &sidecar, &pid_path(base_dir, &id));
            pruned += 1;
            continue;
        }

        let metadata = match read_metadata(&sidecar) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(session = %id, error = %e, "Ignoring unreadable session metadata");
                None
            }
        };

        live.push(DiscoveredSession {
            id,
            socket_path: sock,
            metadata,
        });
    }

    if pruned > 0 {
        info!(count = pruned, dir = %base_dir.display(), "Pruned stale session entries");
    }
    debug!(dir = %base_dir.display(), count = live.len(), "Discovered live sessions");

    Ok(live)
}

fn prune_entry(id: &SessionId, sock: &Path, sidecar: &Path, pid_file: &Path) {
    debug!(session = %id, "Pruning stale session entry");

    for path in [sock, sidecar, pid_file] {
        if let Err(e) = remove_if_exists(path) {
            warn!(path = %path.display(), error = %e, "Failed to remove stale session file");
        }
    }
}
