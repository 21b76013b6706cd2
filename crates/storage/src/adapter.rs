//! Serialized updates for backends without native atomicity

use crate::traits::{RawModifier, RawUpdateResult, StorageProvider};
use async_trait::async_trait;
use stash_core::{BatchOperation, Result, StorageCapabilities};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Wraps a backend and runs every `update_raw` under one async lock
///
/// Only updates going through the same adapter are serialized against each
/// other. Plain `set_item` calls on the inner backend can still interleave.
pub struct AtomicAdapter {
    inner: Arc<dyn StorageProvider>,
    gate: Mutex<()>,
}

impl AtomicAdapter {
    pub fn new(inner: Arc<dyn StorageProvider>) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }

    pub fn inner(&self) -> &Arc<dyn StorageProvider> {
        &self.inner
    }
}

impl fmt::Debug for AtomicAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicAdapter")
            .field("inner", &self.inner.capabilities())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StorageProvider for AtomicAdapter {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.inner.remove_item(key).await
    }

    async fn clear_all(&self) -> Result<()> {
        self.inner.clear_all().await
    }

    async fn update_raw(&self, key: &str, modifier: RawModifier<'_>) -> RawUpdateResult {
        let _gate = self.gate.lock().await;
        let current = self.inner.get_item(key).await?;
        let next = modifier(current.as_deref())?;
        self.inner.set_item(key, &next).await?;
        Ok(())
    }

    async fn batch_update(&self, operations: Vec<BatchOperation>) -> Result<()> {
        self.inner.batch_update(operations).await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }

    /// The inner backend's native capabilities, unchanged
    fn capabilities(&self) -> StorageCapabilities {
        self.inner.capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostBackend, HostStore};
    use crate::traits::StorageExt;
    use stash_core::UpdateError;
    use std::collections::HashMap;

    /// Host store that yields between every step, so unguarded
    /// read-modify-write sequences interleave
    #[derive(Default)]
    struct YieldingHost {
        values: parking_lot::Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl HostStore for YieldingHost {
        async fn read(&self, key: &str) -> Result<Option<String>> {
            let value = self.values.lock().get(key).cloned();
            tokio::task::yield_now().await;
            Ok(value)
        }

        async fn write(&self, key: &str, value: &str) -> Result<()> {
            tokio::task::yield_now().await;
            self.values.lock().insert(key.to_owned(), value.to_owned());
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.values.lock().remove(key);
            Ok(())
        }

        async fn keys(&self) -> Result<Vec<String>> {
            Ok(self.values.lock().keys().cloned().collect())
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("negative balance")]
    struct Overdrawn;

    fn adapter() -> Arc<AtomicAdapter> {
        let host: Arc<dyn StorageProvider> = Arc::new(HostBackend::new(YieldingHost::default()));
        Arc::new(AtomicAdapter::new(host))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_serialized() {
        let storage = adapter();
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move {
                    storage
                        .update_data("n", |v: Option<u64>| Ok::<_, Overdrawn>(v.unwrap_or(0) + 1))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(storage.get_json::<u64>("n").await.unwrap(), Some(32));
    }

    #[tokio::test]
    async fn test_rejection_releases_the_gate() {
        let storage = adapter();
        storage.set_item("balance", "5").await.unwrap();

        let err = storage
            .update_data("balance", |v: Option<i64>| {
                let next = v.unwrap_or(0) - 10;
                if next < 0 {
                    Err(Overdrawn)
                } else {
                    Ok(next)
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Rejected(Overdrawn)));
        assert_eq!(storage.get_item("balance").await.unwrap().as_deref(), Some("5"));

        let next = storage
            .update_data("balance", |v: Option<i64>| Ok::<_, Overdrawn>(v.unwrap_or(0) - 1))
            .await
            .unwrap();
        assert_eq!(next, 4);
    }

    #[test]
    fn test_reports_inner_capabilities() {
        let caps = adapter().capabilities();
        assert!(!caps.supports_atomic);
        assert!(!caps.supports_batch);
    }
}
