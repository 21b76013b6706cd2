//! Backend over a host-provided persistent key-value store
//!
//! A host store is whatever persistent map the runtime offers (a browser's
//! local storage, an embedding application's settings store). It only needs
//! plain get/put/delete/list; it has no transactions, so the backend declares
//! no native atomic or batch support.

mod directory;

pub use directory::DirectoryHost;

use crate::traits::StorageProvider;
use async_trait::async_trait;
use stash_core::{Result, StorageCapabilities, StorageError};

/// Key-value store provided by the host environment
#[async_trait]
pub trait HostStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>>;

    async fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key; deleting a missing key succeeds
    async fn delete(&self, key: &str) -> Result<()>;

    async fn keys(&self) -> Result<Vec<String>>;

    /// Maximum size of a single value, if the host enforces one
    fn quota(&self) -> Option<u64> {
        None
    }
}

/// Storage contract over a [`HostStore`]
///
/// Keys are stored under a namespace prefix so that `clear_all` only removes
/// entries that belong to this backend.
pub struct HostBackend<H> {
    host: H,
    namespace: String,
}

impl<H: HostStore> HostBackend<H> {
    pub fn new(host: H) -> Self {
        Self::with_namespace(host, "stash:")
    }

    pub fn with_namespace(host: H, namespace: impl Into<String>) -> Self {
        Self {
            host,
            namespace: namespace.into(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }
}

#[async_trait]
impl<H: HostStore> StorageProvider for HostBackend<H> {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.host.read(&self.scoped(key)).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        if let Some(limit) = self.host.quota() {
            let size = value.len() as u64;
            if size > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_owned(),
                    size,
                    limit,
                });
            }
        }
        self.host.write(&self.scoped(key), value).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.host.delete(&self.scoped(key)).await
    }

    async fn clear_all(&self) -> Result<()> {
        let keys = self.host.keys().await?;
        let owned = keys.iter().filter(|k| k.starts_with(&self.namespace));
        let mut removed = 0usize;
        for key in owned {
            self.host.delete(key).await?;
            removed += 1;
        }
        tracing::debug!(removed, namespace = %self.namespace, "cleared host store");
        Ok(())
    }

    fn capabilities(&self) -> StorageCapabilities {
        StorageCapabilities {
            supports_atomic: false,
            supports_batch: false,
            max_storage_size: self.host.quota(),
        }
    }
}
