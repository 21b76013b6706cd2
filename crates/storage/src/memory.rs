//! Volatile in-memory backend
//!
//! Nothing here survives the process. It is the reference implementation
//! of the contract in tests and the backend for non-persistent runtimes.

use crate::traits::{RawModifier, RawUpdateResult, StorageProvider};
use async_trait::async_trait;
use parking_lot::RwLock;
use stash_core::{BatchOperation, Result, StorageCapabilities};
use std::collections::BTreeMap;

/// In-memory map backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }
}

#[async_trait]
impl StorageProvider for MemoryBackend {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    async fn update_raw(&self, key: &str, modifier: RawModifier<'_>) -> RawUpdateResult {
        // Read, modify and write under one guard
        let mut entries = self.entries.write();
        let next = modifier(entries.get(key).map(String::as_str))?;
        entries.insert(key.to_owned(), next);
        Ok(())
    }

    async fn batch_update(&self, operations: Vec<BatchOperation>) -> Result<()> {
        let mut entries = self.entries.write();
        for operation in operations {
            match operation {
                BatchOperation::Set { key, value } => {
                    entries.insert(key, value);
                }
                BatchOperation::Remove { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn capabilities(&self) -> StorageCapabilities {
        StorageCapabilities::full()
    }
}
