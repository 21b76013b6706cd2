//! File-backed storage engine
//!
//! The whole key-value space lives in memory and is persisted as a single
//! JSON document. Writes are coalesced (see [`WriteSchedule`]), replace the
//! primary file atomically, and keep a backup of the previous good document
//! that initialization falls back to when the primary is damaged.
//!
//! Locking:
//! - the snapshot mutex is synchronous and never held across an `.await`;
//! - every physical write holds the write lock, so two writes never race on
//!   the temporary/primary pair;
//! - `update_raw` holds the update lock for its whole read-modify-write.

mod paths;
mod recovery;
mod schedule;
mod writer;

pub use paths::StorePaths;
pub use recovery::LoadSource;
pub use schedule::{WriteSchedule, WriteState};
pub use writer::{DocumentFormat, Snapshot};

use crate::traits::{RawModifier, RawUpdateResult, StorageProvider};
use async_trait::async_trait;
use parking_lot::Mutex;
use stash_core::{
    BatchOperation, OperationKind, Result, StorageCapabilities, StorageError,
    DEFAULT_COALESCE_DELAY, DEFAULT_FLUSH_RETRIES, DEFAULT_FLUSH_TIMEOUT,
};
use stash_utils::RetryConfig;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use writer::BackupPolicy;

/// Tuning for a [`FileBackend`]
#[derive(Debug, Clone)]
pub struct FileBackendConfig {
    /// Quiet period after the last mutation before a background write
    pub coalesce_delay: Duration,
    /// Upper bound a single flush attempt waits for its write
    pub flush_timeout: Duration,
    /// Retry budget used by [`StorageProvider::flush`]
    pub flush_retry: RetryConfig,
    pub format: DocumentFormat,
}

impl Default for FileBackendConfig {
    fn default() -> Self {
        Self {
            coalesce_delay: DEFAULT_COALESCE_DELAY,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            flush_retry: RetryConfig::with_max_failures(DEFAULT_FLUSH_RETRIES),
            format: DocumentFormat::Pretty,
        }
    }
}

/// Counters describing what a backend has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileBackendStats {
    /// Completed physical writes, excluding the ones made during initialization
    pub writes: u64,
    pub failed_writes: u64,
    /// Initializations that restored the primary from the backup
    pub recoveries: u64,
    /// Dirty generations dropped after a flush timed out or gave up
    pub abandoned_flushes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    writes: AtomicU64,
    failed_writes: AtomicU64,
    recoveries: AtomicU64,
    abandoned_flushes: AtomicU64,
}

/// Result of [`FileBackend::flush_with_retry`]
#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing was pending; no disk I/O happened
    AlreadyClean,
    Flushed {
        attempts: usize,
    },
    /// Every attempt failed; the dirty generation was abandoned
    GaveUp {
        attempts: usize,
        error: StorageError,
    },
    /// The write did not finish within the flush timeout; the dirty
    /// generation was abandoned while the write itself keeps running
    TimedOut {
        attempts: usize,
        waited: Duration,
    },
}

impl FlushOutcome {
    /// Whether everything in memory reached the disk
    pub fn is_durable(&self) -> bool {
        matches!(self, FlushOutcome::AlreadyClean | FlushOutcome::Flushed { .. })
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            FlushOutcome::AlreadyClean | FlushOutcome::Flushed { .. } => Ok(()),
            FlushOutcome::GaveUp { error, .. } => Err(error),
            FlushOutcome::TimedOut { waited, .. } => Err(StorageError::Timeout {
                operation: OperationKind::Write,
                duration: waited,
            }),
        }
    }
}

#[derive(Debug)]
struct State {
    entries: Snapshot,
    schedule: WriteSchedule,
    timer_armed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Timer expiry: write only if the deadline really passed
    Scheduled,
    /// Flush: write only if something is dirty
    IfDirty,
    /// Clear and batch: always write
    Forced,
}

#[derive(Debug)]
struct Shared {
    paths: StorePaths,
    config: FileBackendConfig,
    state: Mutex<State>,
    ready: OnceCell<LoadSource>,
    write_lock: tokio::sync::Mutex<()>,
    update_lock: tokio::sync::Mutex<()>,
    counters: Counters,
}

impl Shared {
    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock())
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.ready.get_or_try_init(|| self.initialize()).await?;
        Ok(())
    }

    async fn initialize(&self) -> Result<LoadSource> {
        let _write = self.write_lock.lock().await;
        let loaded = recovery::load(&self.paths, self.config.format).await?;
        let source = loaded.source;
        if source == LoadSource::Backup {
            self.counters.recoveries.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(
            path = %self.paths.primary().display(),
            entries = loaded.entries.len(),
            source = ?source,
            "loaded store"
        );
        self.with_state(|state| state.entries = loaded.entries);
        Ok(source)
    }

    fn mark_dirty(self: &Arc<Self>, state: &mut State) {
        state.schedule.mark_dirty(Instant::now());
        if !state.timer_armed {
            state.timer_armed = true;
            tokio::spawn(Arc::clone(self).run_timer());
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.with_state(|state| {
            let deadline = state.schedule.deadline();
            if deadline.is_none() {
                state.timer_armed = false;
            }
            deadline
        })
    }

    /// Background task writing once the coalescing deadline has passed
    async fn run_timer(self: Arc<Self>) {
        while let Some(deadline) = self.next_deadline() {
            tokio::time::sleep_until(deadline).await;
            if let Err(e) = self.persist(WriteMode::Scheduled).await {
                tracing::error!(
                    path = %self.paths.primary().display(),
                    error = %e,
                    "background write failed, data stays dirty until the next write or flush"
                );
            }
        }
    }

    fn begin_write(&self, mode: WriteMode) -> Option<Snapshot> {
        self.with_state(|state| {
            let proceed = match mode {
                WriteMode::Scheduled => state.schedule.is_due(Instant::now()),
                WriteMode::IfDirty => state.schedule.is_dirty(),
                WriteMode::Forced => true,
            };
            if !proceed {
                return None;
            }
            state.schedule.begin_write();
            Some(state.entries.clone())
        })
    }

    /// Run the write protocol under the write lock. Returns whether it wrote.
    async fn persist(&self, mode: WriteMode) -> Result<bool> {
        let _write = self.write_lock.lock().await;
        let Some(snapshot) = self.begin_write(mode) else {
            return Ok(false);
        };

        let result =
            writer::write_snapshot(&self.paths, &snapshot, self.config.format, BackupPolicy::Refresh)
                .await;
        let succeeded = result.is_ok();
        self.with_state(|state| state.schedule.finish_write(succeeded));

        if succeeded {
            self.counters.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failed_writes.fetch_add(1, Ordering::Relaxed);
        }
        result.map(|()| true)
    }

    fn abandon_dirty(&self) {
        self.with_state(|state| state.schedule.abandon());
        self.counters.abandoned_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// One bounded flush attempt
    ///
    /// The write runs as its own task so that hitting the timeout does not
    /// cancel it halfway through the protocol.
    async fn flush_once(self: &Arc<Self>) -> Result<bool> {
        if self.with_state(|state| state.schedule.is_clean()) {
            return Ok(false);
        }

        let shared = Arc::clone(self);
        let task = tokio::spawn(async move { shared.persist(WriteMode::IfDirty).await });

        match tokio::time::timeout(self.config.flush_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(StorageError::internal(
                OperationKind::Write,
                format!("flush task failed: {e}"),
            )),
            Err(_) => {
                self.abandon_dirty();
                tracing::warn!(
                    path = %self.paths.primary().display(),
                    timeout_ms = self.config.flush_timeout.as_millis() as u64,
                    "flush timed out, dropping dirty flag"
                );
                Err(StorageError::Timeout {
                    operation: OperationKind::Write,
                    duration: self.config.flush_timeout,
                })
            }
        }
    }

    fn insert(self: &Arc<Self>, key: &str, value: &str) {
        let mut state = self.state.lock();
        state.entries.insert(key.to_owned(), value.to_owned());
        self.mark_dirty(&mut state);
    }

    fn remove(self: &Arc<Self>, key: &str) {
        let mut state = self.state.lock();
        if state.entries.remove(key).is_some() {
            self.mark_dirty(&mut state);
        }
    }

    fn apply_update(self: &Arc<Self>, key: &str, modifier: RawModifier<'_>) -> RawUpdateResult {
        let mut state = self.state.lock();
        let next = modifier(state.entries.get(key).map(String::as_str))?;
        state.entries.insert(key.to_owned(), next);
        self.mark_dirty(&mut state);
        Ok(())
    }
}

/// Storage backend persisting one JSON document per store
///
/// Cloning is cheap and clones share the same store. Construct at most one
/// backend per path; two independent instances on the same files will
/// overwrite each other.
#[derive(Debug, Clone)]
pub struct FileBackend {
    shared: Arc<Shared>,
}

impl FileBackend {
    /// Backend for store `name` in `dir` with default tuning
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Self {
        Self::with_config(StorePaths::new(dir, name), FileBackendConfig::default())
    }

    /// Construct a backend; nothing is read until the first operation
    pub fn with_config(paths: StorePaths, config: FileBackendConfig) -> Self {
        let schedule = WriteSchedule::new(config.coalesce_delay);
        Self {
            shared: Arc::new(Shared {
                paths,
                config,
                state: Mutex::new(State {
                    entries: Snapshot::new(),
                    schedule,
                    timer_armed: false,
                }),
                ready: OnceCell::new(),
                write_lock: tokio::sync::Mutex::new(()),
                update_lock: tokio::sync::Mutex::new(()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.shared.paths
    }

    pub fn config(&self) -> &FileBackendConfig {
        &self.shared.config
    }

    /// Where the data came from, once initialization has succeeded
    pub fn load_source(&self) -> Option<LoadSource> {
        self.shared.ready.get().copied()
    }

    pub fn write_state(&self) -> WriteState {
        self.shared.with_state(|state| state.schedule.state())
    }

    pub fn stats(&self) -> FileBackendStats {
        let counters = &self.shared.counters;
        FileBackendStats {
            writes: counters.writes.load(Ordering::Relaxed),
            failed_writes: counters.failed_writes.load(Ordering::Relaxed),
            recoveries: counters.recoveries.load(Ordering::Relaxed),
            abandoned_flushes: counters.abandoned_flushes.load(Ordering::Relaxed),
        }
    }

    /// Load the store now instead of on the first operation
    pub async fn initialize(&self) -> Result<()> {
        self.shared.ensure_ready().await
    }

    /// Flush pending data, retrying failed attempts per `policy`
    ///
    /// This trades durability for availability: when an attempt times out,
    /// or every attempt in the budget fails, the pending data is no longer
    /// considered dirty and nothing retries it in the background. It stays
    /// in memory and reaches the disk with the next successful write.
    pub async fn flush_with_retry(&self, policy: &RetryConfig) -> FlushOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.shared.flush_once().await {
                Ok(false) if attempts == 1 => return FlushOutcome::AlreadyClean,
                Ok(_) => return FlushOutcome::Flushed { attempts },
                Err(StorageError::Timeout { duration, .. }) => {
                    return FlushOutcome::TimedOut {
                        attempts,
                        waited: duration,
                    }
                }
                Err(error) if attempts < policy.max_attempts() && policy.should_retry(&error) => {
                    let delay = policy.calculate_delay(attempts - 1);
                    tracing::warn!(
                        attempt = attempts,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "flush failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    self.shared.abandon_dirty();
                    tracing::warn!(
                        path = %self.shared.paths.primary().display(),
                        attempts,
                        error = %error,
                        "giving up on unflushed data"
                    );
                    return FlushOutcome::GaveUp { attempts, error };
                }
            }
        }
    }
}

#[async_trait]
impl StorageProvider for FileBackend {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.shared.ensure_ready().await?;
        Ok(self
            .shared
            .with_state(|state| state.entries.get(key).cloned()))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.shared.ensure_ready().await?;
        self.shared.insert(key, value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.shared.ensure_ready().await?;
        self.shared.remove(key);
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        self.shared.ensure_ready().await?;
        self.shared.with_state(|state| state.entries.clear());
        self.shared.persist(WriteMode::Forced).await?;
        Ok(())
    }

    async fn update_raw(&self, key: &str, modifier: RawModifier<'_>) -> RawUpdateResult {
        self.shared.ensure_ready().await?;
        let _update = self.shared.update_lock.lock().await;

        // Make the value the modifier sees the committed one
        if self.shared.with_state(|state| state.schedule.is_dirty()) {
            self.shared.persist(WriteMode::IfDirty).await?;
        }

        self.shared.apply_update(key, modifier)
    }

    async fn batch_update(&self, operations: Vec<BatchOperation>) -> Result<()> {
        self.shared.ensure_ready().await?;
        let count = operations.len();
        self.shared.with_state(|state| {
            for operation in operations {
                match operation {
                    BatchOperation::Set { key, value } => {
                        state.entries.insert(key, value);
                    }
                    BatchOperation::Remove { key } => {
                        state.entries.remove(&key);
                    }
                }
            }
        });
        tracing::debug!(operations = count, "applied batch");
        self.shared.persist(WriteMode::Forced).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let policy = self.shared.config.flush_retry.clone();
        self.flush_with_retry(&policy).await.into_result()
    }

    fn capabilities(&self) -> StorageCapabilities {
        StorageCapabilities::full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flush_outcome_results() {
        assert!(FlushOutcome::AlreadyClean.into_result().is_ok());
        assert!(FlushOutcome::Flushed { attempts: 2 }.is_durable());

        let timed_out = FlushOutcome::TimedOut {
            attempts: 1,
            waited: Duration::from_millis(10),
        };
        assert!(!timed_out.is_durable());
        assert!(timed_out.into_result().unwrap_err().is_timeout());

        let gave_up = FlushOutcome::GaveUp {
            attempts: 3,
            error: StorageError::Validation {
                message: "mismatch".to_string(),
            },
        };
        assert!(matches!(
            gave_up.into_result(),
            Err(StorageError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_construction_does_no_io() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::open(temp_dir.path().join("nested"), "lazy");

        assert!(!backend.paths().primary().exists());
        assert_eq!(backend.load_source(), None);
        assert_eq!(backend.stats(), FileBackendStats::default());

        backend.initialize().await.unwrap();
        assert!(backend.paths().primary().exists());
        assert_eq!(backend.load_source(), Some(LoadSource::FirstRun));
        assert_eq!(backend.write_state(), WriteState::Clean);
    }

    #[tokio::test]
    async fn test_remove_of_missing_key_stays_clean() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::open(temp_dir.path(), "store");

        backend.remove_item("missing").await.unwrap();
        assert_eq!(backend.write_state(), WriteState::Clean);

        backend.set_item("present", "1").await.unwrap();
        assert!(matches!(backend.write_state(), WriteState::Pending { .. }));
    }
}
