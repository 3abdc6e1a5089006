//! JSON snapshot files
//!
//! Snapshots are written to a sibling temp file and renamed over the target,
//! so a crash mid-write leaves the previous snapshot intact.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Read a snapshot, `None` if the file does not exist yet
pub async fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !tokio::fs::try_exists(path)
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?
    {
        return Ok(None);
    }

    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Persistence(format!("Failed to read {}: {}", path.display(), e)))?;

    let value = serde_json::from_str(&data)
        .map_err(|e| Error::Deserialization(format!("{}: {}", path.display(), e)))?;

    Ok(Some(value))
}

/// Atomically replace the snapshot at `path`
pub async fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Persistence(e.to_string()))?;
        }
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, data)
        .await
        .map_err(|e| Error::Persistence(format!("Failed to write {}: {}", tmp.display(), e)))?;

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::Persistence(format!("Failed to replace {}: {}", path.display(), e)))?;

    debug!("Wrote snapshot {}", path.display());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
