// ABOUTME: Durable sidecar metadata (`<id>.json`) stored next to each session socket

use crate::models::{SessionId, SessionMetadata};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::{metadata_path, remove_if_exists};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid metadata in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads and writes session sidecars under the sessions root
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &SessionId) -> PathBuf {
        metadata_path(&self.root, id)
    }

    /// Read a sidecar; a missing file is `Ok(None)`
    pub fn read(&self, id: &SessionId) -> Result<Option<SessionMetadata>, MetadataError> {
        read_metadata(&self.path_for(id))
    }

    /// Write a sidecar atomically (temp file in the same directory, then rename)
    pub fn write(&self, id: &SessionId, metadata: &SessionMetadata) -> Result<(), MetadataError> {
        let path = self.path_for(id);
        let io_err = |source| MetadataError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.root).map_err(io_err)?;

        let mut temp = tempfile::Builder::new()
            .prefix(".tmp-")
            .suffix(".json")
            .tempfile_in(&self.root)
            .map_err(io_err)?;
        let json = serde_json::to_vec_pretty(metadata).map_err(|source| MetadataError::Parse {
            path: path.clone(),
            source,
        })?;
        temp.write_all(&json).map_err(io_err)?;
        temp.persist(&path).map_err(|e| io_err(e.error))?;

        debug!(session = %id, path = %path.display(), "Wrote session metadata");
        Ok(())
    }

    /// Delete a sidecar; deleting a missing one succeeds
    pub fn remove(&self, id: &SessionId) -> Result<(), MetadataError> {
        let path = self.path_for(id);
        remove_if_exists(&path).map_err(|source| MetadataError::Io { path, source })?;
        Ok(())
    }
}

pub(crate) fn read_metadata(path: &Path) -> Result<Option<SessionMetadata>, MetadataError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(MetadataError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| MetadataError::Parse {
            path: path.to_path_buf(),
            source,
        })
}
