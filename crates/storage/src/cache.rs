//! Device-local progress cache backed by a single JSON file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use quiz_core::model::{ProgressSnapshot, SNAPSHOT_SCHEMA_VERSION, SnapshotHeader};
use tokio::fs;

use crate::repository::{ProgressCache, StorageError};

fn io_err(e: std::io::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Decode a stored snapshot, refusing unknown schema versions before touching the body.
///
/// # Errors
///
/// Returns `StorageError::Serialization` for malformed JSON or a version mismatch.
pub fn decode_snapshot(raw: &str) -> Result<ProgressSnapshot, StorageError> {
    let header: SnapshotHeader =
        serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))?;
    if header.schema_version != SNAPSHOT_SCHEMA_VERSION {
        return Err(StorageError::Serialization(format!(
            "unsupported snapshot schema version {} (expected {SNAPSHOT_SCHEMA_VERSION})",
            header.schema_version
        )));
    }
    serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// # Errors
///
/// Returns `StorageError::Serialization` if the snapshot cannot be encoded.
pub fn encode_snapshot(snapshot: &ProgressSnapshot) -> Result<String, StorageError> {
    serde_json::to_string(snapshot).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Keeps one snapshot in a file. Writes go to a sibling temp file first and
/// are renamed into place, so a crash mid-write leaves the previous snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileProgressCache {
    path: PathBuf,
}

impl JsonFileProgressCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ProgressCache for JsonFileProgressCache {
    async fn save(&self, snapshot: &ProgressSnapshot) -> Result<(), StorageError> {
        let body = encode_snapshot(snapshot)?;
        let tmp = self.temp_path();
        fs::write(&tmp, body).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)
    }

    async fn load(&self) -> Result<Option<ProgressSnapshot>, StorageError> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => decode_snapshot(&raw).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(e)),
        }
    }

    async fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(e)),
        }
    }
}
