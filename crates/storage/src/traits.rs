//! The storage contract shared by every backend

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use stash_core::{
    BatchOperation, BoxError, OperationKind, Result, StorageCapabilities, StorageError,
    UpdateError,
};

/// Raw read-modify-write step over the stored string
///
/// Receives the current value (if any) and returns the value to store. A
/// `Rejected` error aborts the update without touching the store.
pub type RawModifier<'a> = Box<
    dyn FnOnce(Option<&str>) -> std::result::Result<String, UpdateError<BoxError>> + Send + 'a,
>;

/// Result of [`StorageProvider::update_raw`]
pub type RawUpdateResult = std::result::Result<(), UpdateError<BoxError>>;

/// Object-safe contract implemented by every storage backend
///
/// Callers normally hold an `Arc<dyn StorageProvider>` handed out by the
/// registry and use [`StorageExt`] for typed updates.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Read a value. A missing key is `Ok(None)`, never an error.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is a no-op.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Remove every entry and make the empty store durable before returning
    async fn clear_all(&self) -> Result<()>;

    /// Apply `modifier` to the current value and store its result
    ///
    /// The default implementation is a plain get/modify/set sequence and is
    /// only atomic if nothing else touches the key in between. Backends that
    /// report `supports_atomic` override it; the rest are wrapped in
    /// [`AtomicAdapter`](crate::AtomicAdapter) by the registry.
    async fn update_raw(&self, key: &str, modifier: RawModifier<'_>) -> RawUpdateResult {
        let current = self.get_item(key).await?;
        let next = modifier(current.as_deref())?;
        self.set_item(key, &next).await?;
        Ok(())
    }

    /// Apply all operations, then make the result durable
    async fn batch_update(&self, operations: Vec<BatchOperation>) -> Result<()> {
        for operation in operations {
            match operation {
                BatchOperation::Set { key, value } => self.set_item(&key, &value).await?,
                BatchOperation::Remove { key } => self.remove_item(&key).await?,
            }
        }
        self.flush().await
    }

    /// Force pending writes to durable storage
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Native capabilities of this backend
    fn capabilities(&self) -> StorageCapabilities;
}

/// Typed helpers over the raw contract
#[async_trait]
pub trait StorageExt: StorageProvider {
    /// Atomically transform the JSON value stored under `key`
    ///
    /// The modifier sees `None` when the key is absent. Its error comes back
    /// as [`UpdateError::Rejected`] exactly as returned, and the stored value
    /// is left unchanged. The new value is serialized before the store is
    /// touched, so a value that cannot be serialized never reaches memory.
    async fn update_data<T, E, F>(
        &self,
        key: &str,
        modifier: F,
    ) -> std::result::Result<T, UpdateError<E>>
    where
        T: Serialize + DeserializeOwned + Send,
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce(Option<T>) -> std::result::Result<T, E> + Send,
    {
        let mut committed: Option<T> = None;
        let outcome = {
            let slot = &mut committed;
            let raw: RawModifier<'_> = Box::new(
                move |current: Option<&str>| -> std::result::Result<String, UpdateError<BoxError>> {
                    let current = current
                        .map(serde_json::from_str::<T>)
                        .transpose()
                        .map_err(|e| StorageError::serialization(OperationKind::Read, key, e))?;
                    let next = modifier(current)
                        .map_err(|e| UpdateError::Rejected(Box::new(e) as BoxError))?;
                    let encoded = serde_json::to_string(&next)
                        .map_err(|e| StorageError::serialization(OperationKind::Write, key, e))?;
                    *slot = Some(next);
                    Ok(encoded)
                },
            );
            self.update_raw(key, raw).await
        };

        match outcome {
            Ok(()) => committed.ok_or_else(|| {
                UpdateError::Storage(StorageError::internal(
                    OperationKind::Write,
                    format!("update of '{key}' completed without running its modifier"),
                ))
            }),
            Err(UpdateError::Storage(e)) => Err(UpdateError::Storage(e)),
            Err(UpdateError::Rejected(e)) => match e.downcast::<E>() {
                Ok(e) => Err(UpdateError::Rejected(*e)),
                Err(other) => Err(UpdateError::Storage(StorageError::internal(
                    OperationKind::Write,
                    format!("modifier for '{key}' failed with an unexpected error: {other}"),
                ))),
            },
        }
    }

    /// Read and deserialize a JSON value
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_item(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::serialization(OperationKind::Read, key, e)),
            None => Ok(None),
        }
    }

    /// Serialize and store a JSON value
    async fn set_json<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let encoded = serde_json::to_string(value)
            .map_err(|e| StorageError::serialization(OperationKind::Write, key, e))?;
        self.set_item(key, &encoded).await
    }
}

impl<S: StorageProvider + ?Sized> StorageExt for S {}
