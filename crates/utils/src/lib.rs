//! Shared utilities for stash
//!
//! This crate provides the file-system, retry and logging helpers used by the
//! storage backends and the CLI.

pub mod atomic_file;
pub mod logging;
pub mod resilience;

pub use atomic_file::*;
pub use resilience::*;
