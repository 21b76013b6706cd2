//! Key-value storage engine for stash
//!
//! This crate provides interchangeable storage backends behind one contract:
//! - [`StorageProvider`], the object-safe contract, and [`StorageExt`] with
//!   typed read-modify-write helpers
//! - [`MemoryBackend`], a volatile map
//! - [`HostBackend`], an adapter over a host-provided key-value store
//! - [`FileBackend`], a single JSON document on disk with write coalescing,
//!   atomic replace-on-write and backup-based recovery
//! - [`AtomicAdapter`], which gives non-atomic backends serialized updates
//! - [`StorageRegistry`], one cached instance per backend kind

pub mod adapter;
pub mod config;
pub mod file;
pub mod host;
pub mod memory;
pub mod registry;
pub mod traits;

pub use adapter::AtomicAdapter;
pub use config::{ConfigSource, StorageConfig, StorageConfigBuilder};
pub use file::{
    DocumentFormat, FileBackend, FileBackendConfig, FileBackendStats, FlushOutcome, LoadSource,
    StorePaths, WriteState,
};
pub use host::{DirectoryHost, HostBackend, HostStore};
pub use memory::MemoryBackend;
pub use registry::{with_atomic_updates, StorageRegistry};
pub use traits::{RawModifier, RawUpdateResult, StorageExt, StorageProvider};

pub use stash_core::{
    BackendKind, BatchOperation, OperationKind, Result, StorageCapabilities, StorageError,
    UpdateError,
};
