/// Constants used throughout the stash codebase
use std::time::Duration;

// On-disk layout
pub const PRIMARY_EXTENSION: &str = "json";
pub const BACKUP_SUFFIX: &str = ".backup";
pub const TEMP_SUFFIX: &str = ".tmp";
pub const DEFAULT_STORE_NAME: &str = "store";
pub const DEFAULT_DATA_DIR_NAME: &str = "stash";

// Environment variable names
pub const STASH_DATA_DIR_VAR: &str = "STASH_DATA_DIR";
pub const STASH_STORE_NAME_VAR: &str = "STASH_STORE_NAME";
pub const STASH_COALESCE_MS_VAR: &str = "STASH_COALESCE_MS";
pub const STASH_FLUSH_TIMEOUT_MS_VAR: &str = "STASH_FLUSH_TIMEOUT_MS";
pub const STASH_FLUSH_RETRIES_VAR: &str = "STASH_FLUSH_RETRIES";

// Write scheduling
pub const DEFAULT_COALESCE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_FLUSH_RETRIES: usize = 3;

// Host store quota, matching the usual browser key-value allowance
pub const DEFAULT_HOST_QUOTA: u64 = 5 * 1024 * 1024;
