//! Backend registry
//!
//! One cached instance per [`BackendKind`]. The registry is an ordinary
//! value; applications build one from their [`StorageConfig`] and hand it to
//! whatever needs storage.

use crate::adapter::AtomicAdapter;
use crate::config::StorageConfig;
use crate::file::{FileBackend, StorePaths};
use crate::host::{DirectoryHost, HostBackend};
use crate::memory::MemoryBackend;
use crate::traits::StorageProvider;
use parking_lot::Mutex;
use stash_core::{BackendKind, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Give `backend` serialized updates if it has no native atomicity
pub fn with_atomic_updates(backend: Arc<dyn StorageProvider>) -> Arc<dyn StorageProvider> {
    if backend.capabilities().supports_atomic {
        backend
    } else {
        Arc::new(AtomicAdapter::new(backend))
    }
}

pub struct StorageRegistry {
    config: StorageConfig,
    instances: Mutex<HashMap<BackendKind, Arc<dyn StorageProvider>>>,
}

impl fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cached: Vec<BackendKind> = self.instances.lock().keys().copied().collect();
        cached.sort_by_key(|kind| kind.to_string());
        f.debug_struct("StorageRegistry")
            .field("config", &self.config)
            .field("cached", &cached)
            .finish()
    }
}

impl StorageRegistry {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Directory the host backend keeps its values in
    pub fn host_dir(&self) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.host", self.config.store_name))
    }

    /// The backend for `kind`, constructed on first use
    ///
    /// Construction does no I/O; the file backend loads its document on its
    /// first operation.
    pub fn get(&self, kind: BackendKind) -> Result<Arc<dyn StorageProvider>> {
        let mut instances = self.instances.lock();
        if let Some(instance) = instances.get(&kind) {
            return Ok(Arc::clone(instance));
        }

        let instance = self.build(kind)?;
        tracing::debug!(backend = %kind, "created storage backend");
        instances.insert(kind, Arc::clone(&instance));
        Ok(instance)
    }

    fn build(&self, kind: BackendKind) -> Result<Arc<dyn StorageProvider>> {
        if kind.is_persistent() {
            self.config.validate()?;
        }
        let backend: Arc<dyn StorageProvider> = match kind {
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
            BackendKind::File => Arc::new(FileBackend::with_config(
                StorePaths::new(&self.config.data_dir, &self.config.store_name),
                self.config.file_backend_config(),
            )),
            BackendKind::Host => Arc::new(HostBackend::new(
                DirectoryHost::new(self.host_dir()).with_quota(self.config.host_quota),
            )),
        };
        Ok(with_atomic_updates(backend))
    }

    /// Drop every cached instance
    ///
    /// Instances already handed out keep working; the next `get` builds a
    /// fresh one. Flush file backends before resetting if their pending
    /// writes matter.
    pub fn reset(&self) {
        let dropped = {
            let mut instances = self.instances.lock();
            let count = instances.len();
            instances.clear();
            count
        };
        tracing::debug!(dropped, "reset storage registry");
    }

    /// Backend kinds usable with the current configuration
    pub async fn available_kinds(&self) -> Vec<BackendKind> {
        let mut kinds = vec![BackendKind::Memory];
        match tokio::fs::create_dir_all(&self.config.data_dir).await {
            Ok(()) => kinds.extend([BackendKind::File, BackendKind::Host]),
            Err(e) => tracing::warn!(
                path = %self.config.data_dir.display(),
                error = %e,
                "data directory unavailable, only volatile storage can be used"
            ),
        }
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(temp_dir: &TempDir) -> StorageRegistry {
        StorageRegistry::new(
            StorageConfig::builder()
                .data_dir(temp_dir.path())
                .store_name("prefs")
                .build(),
        )
    }

    #[tokio::test]
    async fn test_get_returns_the_same_instance() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        for kind in BackendKind::ALL {
            let first = registry.get(kind).unwrap();
            let second = registry.get(kind).unwrap();
            assert!(Arc::ptr_eq(&first, &second), "{kind} was rebuilt");
        }
    }

    #[tokio::test]
    async fn test_reset_builds_fresh_instances() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let before = registry.get(BackendKind::Memory).unwrap();
        before.set_item("k", "v").await.unwrap();
        registry.reset();

        let after = registry.get(BackendKind::Memory).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.get_item("k").await.unwrap(), None);
    }

    #[test]
    fn test_host_backend_keeps_native_capabilities() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let caps = registry.get(BackendKind::Host).unwrap().capabilities();
        assert!(!caps.supports_atomic);
        assert_eq!(caps.max_storage_size, registry.config().host_quota);
        assert!(registry.host_dir().ends_with("prefs.host"));
    }

    #[test]
    fn test_invalid_config_fails_only_for_persistent_kinds() {
        let temp_dir = TempDir::new().unwrap();
        let registry = StorageRegistry::new(
            StorageConfig::builder()
                .data_dir(temp_dir.path())
                .store_name("")
                .build(),
        );

        assert!(registry.get(BackendKind::Memory).is_ok());
        assert!(registry.get(BackendKind::File).is_err());
        assert!(registry.get(BackendKind::Host).is_err());
    }

    #[tokio::test]
    async fn test_available_kinds() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);
        assert_eq!(registry.available_kinds().await, BackendKind::ALL.to_vec());

        let blocked = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocked, "file").unwrap();
        let registry = StorageRegistry::new(StorageConfig::builder().data_dir(&blocked).build());
        assert_eq!(registry.available_kinds().await, vec![BackendKind::Memory]);
    }
}
