//! Initialization-time loading and crash recovery
//!
//! Loading prefers the primary document, falls back to the backup, and
//! treats "neither file exists" as a first run. Any file that exists but
//! cannot be used, with no usable fallback, is reported as corruption
//! instead of being reset to an empty store.

use super::paths::StorePaths;
use super::writer::{self, BackupPolicy, DocumentFormat, Snapshot};
use stash_core::{Result, StorageError};
use stash_utils::read_optional;
use std::path::Path;

/// Where the loaded snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Primary,
    Backup,
    FirstRun,
}

#[derive(Debug)]
pub struct LoadedStore {
    pub entries: Snapshot,
    pub source: LoadSource,
}

enum Document {
    Missing,
    Unusable(String),
    Valid(Snapshot),
}

async fn inspect(path: &Path) -> Document {
    match read_optional(path).await {
        Ok(None) => Document::Missing,
        Ok(Some(text)) => match writer::parse_document(&text) {
            Ok(entries) => Document::Valid(entries),
            Err(e) => Document::Unusable(format!("{}: {e}", path.display())),
        },
        Err(e) => Document::Unusable(e.to_string()),
    }
}

/// Refresh the backup after the primary is known to be good
///
/// The caller's data is already durable in the primary at this point, so a
/// failure here is only logged.
async fn refresh_backup_quietly(paths: &StorePaths) {
    if let Err(e) = writer::refresh_backup(paths).await {
        tracing::warn!(
            path = %paths.backup().display(),
            error = %e,
            "failed to refresh backup"
        );
    }
}

/// Load the store, recovering from the backup if needed
pub async fn load(paths: &StorePaths, format: DocumentFormat) -> Result<LoadedStore> {
    let primary_problem = match inspect(paths.primary()).await {
        Document::Valid(entries) => {
            refresh_backup_quietly(paths).await;
            return Ok(LoadedStore {
                entries,
                source: LoadSource::Primary,
            });
        }
        Document::Missing => None,
        Document::Unusable(reason) => {
            tracing::warn!(reason = %reason, "primary document unusable, trying backup");
            Some(reason)
        }
    };

    match (primary_problem, inspect(paths.backup()).await) {
        (_, Document::Valid(entries)) => {
            tracing::info!(
                path = %paths.primary().display(),
                entries = entries.len(),
                "restoring primary document from backup"
            );
            // The backup is the only good copy until the primary is back
            writer::write_snapshot(paths, &entries, format, BackupPolicy::Skip).await?;
            refresh_backup_quietly(paths).await;
            Ok(LoadedStore {
                entries,
                source: LoadSource::Backup,
            })
        }
        (None, Document::Missing) => {
            tracing::debug!(path = %paths.primary().display(), "initializing new store");
            let entries = Snapshot::new();
            writer::write_snapshot(paths, &entries, format, BackupPolicy::Skip).await?;
            refresh_backup_quietly(paths).await;
            Ok(LoadedStore {
                entries,
                source: LoadSource::FirstRun,
            })
        }
        (Some(primary), Document::Missing) => Err(StorageError::Corruption {
            primary,
            backup: "backup file missing".to_string(),
        }),
        (primary, Document::Unusable(backup)) => Err(StorageError::Corruption {
            primary: primary.unwrap_or_else(|| "primary file missing".to_string()),
            backup,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, StorePaths) {
        let temp_dir = TempDir::new().unwrap();
        let paths = StorePaths::new(temp_dir.path(), "store");
        (temp_dir, paths)
    }

    #[tokio::test]
    async fn test_first_run_creates_primary_and_backup() {
        let (_dir, paths) = setup();
        let loaded = load(&paths, DocumentFormat::Pretty).await.unwrap();

        assert_eq!(loaded.source, LoadSource::FirstRun);
        assert!(loaded.entries.is_empty());
        assert!(paths.primary().exists());
        assert!(paths.backup().exists());
        assert!(!paths.temp().exists());
    }

    #[tokio::test]
    async fn test_valid_primary_refreshes_backup() {
        let (_dir, paths) = setup();
        std::fs::write(paths.primary(), r#"{"a":"1"}"#).unwrap();

        let loaded = load(&paths, DocumentFormat::Pretty).await.unwrap();
        assert_eq!(loaded.source, LoadSource::Primary);
        assert_eq!(loaded.entries.get("a").map(String::as_str), Some("1"));
        assert_eq!(std::fs::read_to_string(paths.backup()).unwrap(), r#"{"a":"1"}"#);
    }

    #[tokio::test]
    async fn test_backup_refresh_failure_does_not_fail_load() {
        let (_dir, paths) = setup();
        std::fs::write(paths.primary(), r#"{"a":"1"}"#).unwrap();
        std::fs::create_dir(paths.backup()).unwrap();

        let loaded = load(&paths, DocumentFormat::Pretty).await.unwrap();
        assert_eq!(loaded.source, LoadSource::Primary);
        assert_eq!(loaded.entries.get("a").map(String::as_str), Some("1"));
        assert!(paths.backup().is_dir());
        assert!(!paths.backup_temp().exists());
        assert_eq!(std::fs::read_to_string(paths.primary()).unwrap(), r#"{"a":"1"}"#);
    }

    #[tokio::test]
    async fn test_missing_primary_restored_from_backup() {
        let (_dir, paths) = setup();
        std::fs::write(paths.backup(), r#"{"b":"2"}"#).unwrap();

        let loaded = load(&paths, DocumentFormat::Compact).await.unwrap();
        assert_eq!(loaded.source, LoadSource::Backup);
        let primary = std::fs::read_to_string(paths.primary()).unwrap();
        assert_eq!(writer::parse_document(&primary).unwrap(), loaded.entries);
    }

    #[tokio::test]
    async fn test_corrupt_primary_with_missing_backup_is_corruption() {
        let (_dir, paths) = setup();
        std::fs::write(paths.primary(), "{\"a\": ").unwrap();

        let err = load(&paths, DocumentFormat::Pretty).await.unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("backup file missing"));
        assert_eq!(std::fs::read_to_string(paths.primary()).unwrap(), "{\"a\": ");
    }

    #[tokio::test]
    async fn test_missing_primary_with_corrupt_backup_is_corruption() {
        let (_dir, paths) = setup();
        std::fs::write(paths.backup(), "garbage").unwrap();

        let err = load(&paths, DocumentFormat::Pretty).await.unwrap_err();
        assert!(err.is_corruption());
        assert!(!paths.primary().exists());
    }
}
