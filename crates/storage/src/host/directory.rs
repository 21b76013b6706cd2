//! Host store keeping one file per key in a directory

use super::HostStore;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use stash_core::{OperationKind, Result, StorageError};
use stash_utils::{read_optional, unique_temp_path, write_atomic_string};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;

const VALUE_EXTENSION: &str = "val";
const KEY_EXTENSION: &str = "key";
const HASHED_PREFIX: &str = "k-";

/// Longest hex stem used directly as a file name. Leaves room for the
/// extension and the temporary-file suffix under the usual 255-byte limit.
const MAX_HEX_STEM: usize = 200;

/// Directory-backed host store
///
/// File names are the hex encoding of the key, so any key maps to a valid
/// file name on every platform. Keys too long for that are stored under
/// `k-<sha256>.val`, with the key itself in a `k-<sha256>.key` file next to
/// the value.
#[derive(Debug, Clone)]
pub struct DirectoryHost {
    root: PathBuf,
    quota: Option<u64>,
}

/// File name stem for one key
#[derive(Debug, PartialEq, Eq)]
enum Stem {
    Hex(String),
    Hashed(String),
}

impl Stem {
    fn for_key(key: &str) -> Self {
        let encoded = hex::encode(key.as_bytes());
        if encoded.len() <= MAX_HEX_STEM {
            Stem::Hex(encoded)
        } else {
            let digest = Sha256::digest(key.as_bytes());
            Stem::Hashed(format!("{HASHED_PREFIX}{}", hex::encode(digest)))
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Stem::Hex(s) | Stem::Hashed(s) => s,
        }
    }
}

impl DirectoryHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            quota: None,
        }
    }

    pub fn with_quota(mut self, quota: Option<u64>) -> Self {
        self.quota = quota;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, stem: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{stem}.{extension}"))
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.file_path(Stem::for_key(key).as_str(), VALUE_EXTENSION)
    }

    async fn remove_file(&self, path: PathBuf) -> Result<()> {
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(
                OperationKind::Delete,
                path,
                "remove host file",
                e,
            )),
        }
    }

    /// Key stored in the value file at `path`, if it is one
    async fn key_of(&self, path: &Path) -> Result<Option<String>> {
        if path.extension() != Some(OsStr::new(VALUE_EXTENSION)) {
            return Ok(None);
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return Ok(None);
        };

        if stem.starts_with(HASHED_PREFIX) {
            let key = read_optional(&self.file_path(stem, KEY_EXTENSION)).await?;
            if key.is_none() {
                tracing::warn!(path = %path.display(), "hashed value without key file, skipping");
            }
            return Ok(key);
        }
        Ok(decode_hex_stem(stem))
    }
}

fn decode_hex_stem(stem: &str) -> Option<String> {
    let bytes = hex::decode(stem).ok()?;
    String::from_utf8(bytes).ok()
}

#[async_trait]
impl HostStore for DirectoryHost {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        read_optional(&self.value_path(key)).await
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let stem = Stem::for_key(key);
        if let Stem::Hashed(hashed) = &stem {
            // The key file goes first so a listed value always has its key
            let key_path = self.file_path(hashed, KEY_EXTENSION);
            write_atomic_string(&key_path, &unique_temp_path(&key_path), key).await?;
        }
        let path = self.file_path(stem.as_str(), VALUE_EXTENSION);
        write_atomic_string(&path, &unique_temp_path(&path), value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let stem = Stem::for_key(key);
        self.remove_file(self.file_path(stem.as_str(), VALUE_EXTENSION))
            .await?;
        if let Stem::Hashed(hashed) = &stem {
            self.remove_file(self.file_path(hashed, KEY_EXTENSION))
                .await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let list_error =
            |e| StorageError::io(OperationKind::Read, &self.root, "list host directory", e);

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(list_error(e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
            if let Some(key) = self.key_of(&entry.path()).await? {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn quota(&self) -> Option<u64> {
        self.quota
    }
}
