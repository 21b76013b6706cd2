//! Core domain types, errors, and constants for the `stash` storage engine.
//!
//! Every backend crate builds on the definitions in here so that callers see
//! one error type and one vocabulary regardless of which backend serves them.
//!
//! ## Key Components
//!
//! - **`errors`**: the `StorageError` enum, its operation tag, and the
//!   `UpdateError` wrapper that keeps caller errors apart from engine errors.
//! - **`types`**: batch operations, capability descriptors and backend kinds.
//! - **`constants`**: file suffixes, environment variable names and defaults.

pub mod constants;
pub mod errors;
pub mod types;

pub use self::{
    constants::*,
    errors::{BoxError, OperationKind, RecoveryHint, Result, StorageError, UpdateError},
    types::*,
};
