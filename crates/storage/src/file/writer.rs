//! Write protocol for the on-disk document
//!
//! The document is one JSON object of string values. Every write goes:
//! serialize, validate the round-trip, refresh the backup from a verified
//! primary, write and sync the temporary file, rename it over the primary.

use super::paths::StorePaths;
use stash_core::{OperationKind, Result, StorageError};
use stash_utils::{read_optional, write_atomic_string};
use std::collections::BTreeMap;

/// The full key-value space of a store
pub type Snapshot = BTreeMap<String, String>;

/// Layout of the serialized document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    #[default]
    Pretty,
    Compact,
}

/// Whether a write refreshes the backup before replacing the primary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupPolicy {
    Refresh,
    /// Used while restoring the primary from the backup, which must not be
    /// replaced until the restored primary is in place
    Skip,
}

/// Parse a document
pub fn parse_document(text: &str) -> serde_json::Result<Snapshot> {
    serde_json::from_str(text)
}

/// Serialize a snapshot and check that it parses back to the same map
pub fn encode_document(snapshot: &Snapshot, format: DocumentFormat) -> Result<String> {
    let encoded = match format {
        DocumentFormat::Pretty => serde_json::to_string_pretty(snapshot),
        DocumentFormat::Compact => serde_json::to_string(snapshot),
    }
    .map_err(|e| StorageError::serialization(OperationKind::Write, "<document>", e))?;

    let decoded = parse_document(&encoded).map_err(|e| StorageError::Validation {
        message: format!("serialized document does not parse: {e}"),
    })?;
    if &decoded != snapshot {
        return Err(StorageError::Validation {
            message: format!(
                "serialized document holds {} entries, snapshot holds {}",
                decoded.len(),
                snapshot.len()
            ),
        });
    }

    Ok(encoded)
}

/// Run the full write protocol for `snapshot`
pub async fn write_snapshot(
    paths: &StorePaths,
    snapshot: &Snapshot,
    format: DocumentFormat,
    backup: BackupPolicy,
) -> Result<()> {
    let document = encode_document(snapshot, format)?;

    if backup == BackupPolicy::Refresh {
        refresh_backup(paths).await?;
    }

    write_atomic_string(paths.primary(), paths.temp(), &document).await?;

    tracing::debug!(
        path = %paths.primary().display(),
        entries = snapshot.len(),
        bytes = document.len(),
        "wrote store document"
    );
    Ok(())
}

/// Copy the primary document to the backup location
///
/// Only a primary that parses is copied, so the backup is never replaced by
/// corrupted content. The copy is staged next to the backup and renamed into
/// place. Returns whether the backup was written.
pub async fn refresh_backup(paths: &StorePaths) -> Result<bool> {
    let Some(current) = read_optional(paths.primary()).await? else {
        return Ok(false);
    };

    if let Err(e) = parse_document(&current) {
        tracing::warn!(
            path = %paths.primary().display(),
            error = %e,
            "primary document does not parse, keeping existing backup"
        );
        return Ok(false);
    }

    write_atomic_string(paths.backup(), paths.backup_temp(), &current).await?;
    Ok(true)
}
