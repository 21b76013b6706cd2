use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for stash operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Boxed error used at the object-safe seams of the storage contract
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The kind of contract operation an engine error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Read,
    Write,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Read => write!(f, "read"),
            OperationKind::Write => write!(f, "write"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Engine-internal storage error
///
/// Every variant maps to one [`OperationKind`] through [`StorageError::operation`].
/// Errors raised by a caller's modifier never end up in here; see [`UpdateError`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// File system failure while reading or writing store files
    #[error("{operation} failed to {action} '{}': {source}", .path.display())]
    Io {
        operation: OperationKind,
        path: PathBuf,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A stored value or document could not be encoded or decoded
    #[error("{operation} of key '{key}' failed to (de)serialize: {source}")]
    Serialization {
        operation: OperationKind,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The serialized document did not survive its own round-trip check
    #[error("write validation failed: {message}")]
    Validation { message: String },

    /// Both the primary and the backup document exist but cannot be used
    #[error("store is corrupted and could not be recovered (primary: {primary}; backup: {backup})")]
    Corruption { primary: String, backup: String },

    /// A bounded operation did not complete in time
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: OperationKind,
        duration: Duration,
    },

    /// The host store refused a value larger than its quota
    #[error("value for key '{key}' is {size} bytes, exceeding the {limit} byte quota")]
    QuotaExceeded { key: String, size: u64, limit: u64 },

    /// Invalid engine configuration
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Invariant breach inside the engine
    #[error("internal {operation} error: {message}")]
    Internal {
        operation: OperationKind,
        message: String,
    },
}

/// Suggested reaction to a storage error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryHint {
    /// Retry the operation
    Retry { after: Duration },

    /// Check file permissions and free space
    CheckPermissions { path: PathBuf },

    /// Restore the primary document from the backup by hand
    RestoreFromBackup,

    /// No automated recovery possible
    Manual { instructions: String },
}

impl StorageError {
    /// Operation tag for caller diagnostics
    #[must_use]
    pub fn operation(&self) -> OperationKind {
        match self {
            StorageError::Io { operation, .. }
            | StorageError::Serialization { operation, .. }
            | StorageError::Timeout { operation, .. }
            | StorageError::Internal { operation, .. } => *operation,
            StorageError::Validation { .. } | StorageError::QuotaExceeded { .. } => {
                OperationKind::Write
            }
            StorageError::Corruption { .. } | StorageError::Configuration { .. } => {
                OperationKind::Read
            }
        }
    }

    /// Check if this error indicates unrecoverable on-disk corruption
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, StorageError::Corruption { .. })
    }

    /// Check if this error is a flush timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, StorageError::Timeout { .. })
    }

    /// Check if this error is transient and can be retried
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self.recovery_hint(), RecoveryHint::Retry { .. })
    }

    /// Get the recovery hint for this error
    #[must_use]
    pub fn recovery_hint(&self) -> RecoveryHint {
        match self {
            StorageError::Io { path, source, .. } => match source.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    RecoveryHint::CheckPermissions { path: path.clone() }
                }
                _ => RecoveryHint::Retry {
                    after: Duration::from_millis(50),
                },
            },
            StorageError::Timeout { .. } => RecoveryHint::Retry {
                after: Duration::from_millis(250),
            },
            StorageError::Corruption { .. } => RecoveryHint::RestoreFromBackup,
            StorageError::Serialization { key, .. } => RecoveryHint::Manual {
                instructions: format!("inspect or remove the value stored under '{key}'"),
            },
            StorageError::QuotaExceeded { .. } => RecoveryHint::Manual {
                instructions: "store a smaller value or raise the host quota".to_string(),
            },
            StorageError::Configuration { message } => RecoveryHint::Manual {
                instructions: format!("fix the storage configuration: {message}"),
            },
            StorageError::Validation { .. } | StorageError::Internal { .. } => {
                RecoveryHint::Manual {
                    instructions: "report this as a bug".to_string(),
                }
            }
        }
    }

    /// Create an I/O error with context
    #[must_use]
    pub fn io(
        operation: OperationKind,
        path: impl Into<PathBuf>,
        action: &'static str,
        source: std::io::Error,
    ) -> Self {
        StorageError::Io {
            operation,
            path: path.into(),
            action,
            source,
        }
    }

    /// Create a serialization error for a key
    #[must_use]
    pub fn serialization(
        operation: OperationKind,
        key: impl Into<String>,
        source: serde_json::Error,
    ) -> Self {
        StorageError::Serialization {
            operation,
            key: key.into(),
            source,
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        StorageError::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(operation: OperationKind, message: impl Into<String>) -> Self {
        StorageError::Internal {
            operation,
            message: message.into(),
        }
    }
}

/// Failure of a read-modify-write update
///
/// `Rejected` carries the modifier's own error exactly as it was returned,
/// so business-logic failures stay distinguishable from engine failures.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError<E> {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("update rejected: {0}")]
    Rejected(E),
}

impl<E> UpdateError<E> {
    /// The storage error, if the engine failed
    pub fn storage(&self) -> Option<&StorageError> {
        match self {
            UpdateError::Storage(e) => Some(e),
            UpdateError::Rejected(_) => None,
        }
    }

    /// Take the caller's error back out, if the modifier rejected the update
    pub fn into_rejected(self) -> Option<E> {
        match self {
            UpdateError::Rejected(e) => Some(e),
            UpdateError::Storage(_) => None,
        }
    }

    /// Map the rejection type, leaving storage errors untouched
    pub fn map_rejected<F, M>(self, f: M) -> UpdateError<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            UpdateError::Storage(e) => UpdateError::Storage(e),
            UpdateError::Rejected(e) => UpdateError::Rejected(f(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn io_error(kind: std::io::ErrorKind) -> StorageError {
        StorageError::io(
            OperationKind::Write,
            "/tmp/store.json",
            "rename temporary file",
            std::io::Error::new(kind, "boom"),
        )
    }

    #[rstest]
    #[case(io_error(std::io::ErrorKind::Other), OperationKind::Write)]
    #[case(
        StorageError::Corruption { primary: "a".into(), backup: "b".into() },
        OperationKind::Read
    )]
    #[case(StorageError::Validation { message: "mismatch".into() }, OperationKind::Write)]
    #[case(
        StorageError::Timeout { operation: OperationKind::Write, duration: Duration::from_secs(1) },
        OperationKind::Write
    )]
    #[case(
        StorageError::internal(OperationKind::Delete, "lost"),
        OperationKind::Delete
    )]
    fn test_operation_tag(#[case] error: StorageError, #[case] expected: OperationKind) {
        assert_eq!(error.operation(), expected);
    }

    #[test]
    fn test_corruption_message_names_both_causes() {
        let error = StorageError::Corruption {
            primary: "expected value at line 1".into(),
            backup: "EOF while parsing".into(),
        };
        let message = error.to_string();
        assert!(message.contains("expected value at line 1"));
        assert!(message.contains("EOF while parsing"));
        assert!(error.is_corruption());
        assert_eq!(error.recovery_hint(), RecoveryHint::RestoreFromBackup);
    }

    #[test]
    fn test_permission_denied_hint() {
        let error = io_error(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(
            error.recovery_hint(),
            RecoveryHint::CheckPermissions { .. }
        ));
        assert!(!error.is_transient());
        assert!(io_error(std::io::ErrorKind::Interrupted).is_transient());
    }

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("quota for team exhausted")]
    struct QuotaRule;

    #[test]
    fn test_update_error_keeps_rejection() {
        let error: UpdateError<QuotaRule> = UpdateError::Rejected(QuotaRule);
        assert!(error.storage().is_none());
        assert_eq!(error.into_rejected(), Some(QuotaRule));

        let error: UpdateError<QuotaRule> =
            StorageError::internal(OperationKind::Write, "x").into();
        assert!(error.storage().is_some());
        assert!(error.map_rejected(|_| 0u8).into_rejected().is_none());
    }
}
