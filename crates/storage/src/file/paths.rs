//! Primary, backup and temporary file locations of a file store

use stash_core::{BACKUP_SUFFIX, PRIMARY_EXTENSION, TEMP_SUFFIX};
use stash_utils::sibling_path;
use std::path::{Path, PathBuf};

/// The files a [`FileBackend`](super::FileBackend) owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    primary: PathBuf,
    backup: PathBuf,
    temp: PathBuf,
    backup_temp: PathBuf,
}

impl StorePaths {
    /// Paths for store `name` inside `dir`, e.g. `dir/name.json`
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        Self::from_primary(dir.as_ref().join(format!("{name}.{PRIMARY_EXTENSION}")))
    }

    /// Derive backup and temporary paths from an explicit primary path
    pub fn from_primary(primary: impl Into<PathBuf>) -> Self {
        let primary = primary.into();
        let backup = sibling_path(&primary, BACKUP_SUFFIX);
        Self {
            backup_temp: sibling_path(&backup, TEMP_SUFFIX),
            temp: sibling_path(&primary, TEMP_SUFFIX),
            backup,
            primary,
        }
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    pub fn temp(&self) -> &Path {
        &self.temp
    }

    /// Staging file for backup refreshes
    pub fn backup_temp(&self) -> &Path {
        &self.backup_temp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_from_dir_and_name() {
        let paths = StorePaths::new("/var/lib/app", "prompts");
        assert_eq!(paths.primary(), Path::new("/var/lib/app/prompts.json"));
        assert_eq!(paths.backup(), Path::new("/var/lib/app/prompts.json.backup"));
        assert_eq!(paths.temp(), Path::new("/var/lib/app/prompts.json.tmp"));
        assert_eq!(
            paths.backup_temp(),
            Path::new("/var/lib/app/prompts.json.backup.tmp")
        );
    }

    #[test]
    fn test_paths_from_primary() {
        let paths = StorePaths::from_primary("data.db");
        assert_eq!(paths.backup(), Path::new("data.db.backup"));
        assert_eq!(paths.temp(), Path::new("data.db.tmp"));
    }
}
