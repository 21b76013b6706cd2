#![allow(dead_code)]

use stash_storage::{FileBackend, FileBackendConfig, StorePaths};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

pub const SHORT_DELAY: Duration = Duration::from_millis(30);

/// A temporary directory holding one store
pub struct TestStore {
    pub dir: TempDir,
    pub paths: StorePaths,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let paths = StorePaths::new(dir.path(), "store");
        Self { dir, paths }
    }

    /// A fresh backend instance over this store's files, as after a restart
    pub fn open(&self) -> FileBackend {
        self.open_with(Self::config(SHORT_DELAY))
    }

    pub fn open_with(&self, config: FileBackendConfig) -> FileBackend {
        FileBackend::with_config(self.paths.clone(), config)
    }

    pub fn config(coalesce_delay: Duration) -> FileBackendConfig {
        FileBackendConfig {
            coalesce_delay,
            ..FileBackendConfig::default()
        }
    }

    pub fn read(&self, path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    pub fn primary_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.read(self.paths.primary())).unwrap()
    }
}
