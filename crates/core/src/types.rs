//! Shared domain types for the storage contract

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One step of a batch update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BatchOperation {
    Set { key: String, value: String },
    Remove { key: String },
}

impl BatchOperation {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        BatchOperation::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        BatchOperation::Remove { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            BatchOperation::Set { key, .. } | BatchOperation::Remove { key } => key,
        }
    }
}

/// What a backend supports natively
///
/// This describes the backend itself, not what an adapter layered on top of
/// it provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCapabilities {
    pub supports_atomic: bool,
    pub supports_batch: bool,
    pub max_storage_size: Option<u64>,
}

impl StorageCapabilities {
    /// Capabilities of a backend with atomic updates and batches and no size cap
    pub const fn full() -> Self {
        Self {
            supports_atomic: true,
            supports_batch: true,
            max_storage_size: None,
        }
    }
}

/// Identifier of a backend type, used as the registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    File,
    Host,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Memory, BackendKind::File, BackendKind::Host];

    /// Whether data written through this backend outlives the process
    pub fn is_persistent(self) -> bool {
        !matches!(self, BackendKind::Memory)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::File => write!(f, "file"),
            BackendKind::Host => write!(f, "host"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(BackendKind::Memory),
            "file" => Ok(BackendKind::File),
            "host" => Ok(BackendKind::Host),
            _ => Err(format!("Invalid backend kind: {s}")),
        }
    }
}
