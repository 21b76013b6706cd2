//! Atomic file operations to prevent torn store documents

use stash_core::{OperationKind, Result, StorageError, TEMP_SUFFIX};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Append a suffix to the full file name, keeping the existing extension
///
/// `store.json` with `.tmp` becomes `store.json.tmp`.
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// A temporary path next to `path` that no other writer uses
///
/// `dir/value.val` becomes `dir/.value.val.<uuid>.tmp`. Use this when
/// several writers may target the same file at once.
pub fn unique_temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    if let Some(file_name) = path.file_name() {
        name.push(file_name);
    }
    name.push(format!(".{}{TEMP_SUFFIX}", Uuid::new_v4()));
    path.with_file_name(name)
}

/// Write data to `path` atomically through `temp_path`
///
/// The content is written and synced to `temp_path`, which is then renamed
/// over `path`. Rename is the only step that makes the new content visible
/// under `path`. On any failure the temporary file is removed and `path` is
/// left untouched.
pub async fn write_atomic(path: &Path, temp_path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|e| {
            StorageError::io(OperationKind::Write, parent, "create parent directory", e)
        })?;
    }

    if let Err(e) = write_synced(temp_path, content).await {
        remove_if_exists(temp_path).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(temp_path, path).await {
        remove_if_exists(temp_path).await;
        return Err(StorageError::io(
            OperationKind::Write,
            path,
            "atomically rename temporary file",
            e,
        ));
    }

    Ok(())
}

/// Write string content to a file atomically
pub async fn write_atomic_string(path: &Path, temp_path: &Path, content: &str) -> Result<()> {
    write_atomic(path, temp_path, content.as_bytes()).await
}

/// Read a file, mapping a missing file to `None`
pub async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(OperationKind::Read, path, "read file", e)),
    }
}

/// Best-effort removal used on cleanup paths
pub async fn remove_if_exists(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove temporary file");
        }
    }
}

async fn write_synced(temp_path: &Path, content: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(temp_path)
        .await
        .map_err(|e| {
            StorageError::io(OperationKind::Write, temp_path, "create temporary file", e)
        })?;

    file.write_all(content).await.map_err(|e| {
        StorageError::io(OperationKind::Write, temp_path, "write temporary file", e)
    })?;

    file.sync_all().await.map_err(|e| {
        StorageError::io(OperationKind::Write, temp_path, "sync temporary file", e)
    })?;

    Ok(())
}
