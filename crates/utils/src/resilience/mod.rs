//! Retry policy for operations that may fail transiently
//!
//! The storage engine uses [`RetryConfig`] as the explicit retry budget of a
//! forced flush instead of keeping a failure counter on the backend.

pub mod retry;

pub use retry::RetryConfig;
