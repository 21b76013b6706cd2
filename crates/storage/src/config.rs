//! Storage configuration with precedence tracking
//!
//! Values resolve as defaults, then a JSON config file, then `STASH_*`
//! environment variables, then command line overrides applied by the caller.
use crate::file::{DocumentFormat, FileBackendConfig};
use serde::{Deserialize, Serialize};
use stash_core::{
    OperationKind, Result, StorageError, DEFAULT_COALESCE_DELAY, DEFAULT_DATA_DIR_NAME,
    DEFAULT_FLUSH_RETRIES, DEFAULT_FLUSH_TIMEOUT, DEFAULT_HOST_QUOTA, DEFAULT_STORE_NAME,
    STASH_COALESCE_MS_VAR, STASH_DATA_DIR_VAR, STASH_FLUSH_RETRIES_VAR,
    STASH_FLUSH_TIMEOUT_MS_VAR, STASH_STORE_NAME_VAR,
};
use stash_utils::RetryConfig;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the store files
    pub data_dir: PathBuf,
    /// File name stem of the primary document
    pub store_name: String,
    /// Quiet period before a coalesced write, in milliseconds
    pub coalesce_delay_ms: u64,
    /// Bound on a single flush attempt, in milliseconds
    pub flush_timeout_ms: u64,
    /// Consecutive failed flush attempts before pending data is given up
    pub flush_retries: usize,
    /// Write the document indented
    pub pretty: bool,
    /// Largest value the host backend accepts, in bytes
    pub host_quota: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store_name: DEFAULT_STORE_NAME.to_string(),
            coalesce_delay_ms: DEFAULT_COALESCE_DELAY.as_millis() as u64,
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT.as_millis() as u64,
            flush_retries: DEFAULT_FLUSH_RETRIES,
            pretty: true,
            host_quota: Some(DEFAULT_HOST_QUOTA),
        }
    }
}

/// Per-user data directory, or `.stash` in the working directory when the
/// platform has none
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(DEFAULT_DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{DEFAULT_DATA_DIR_NAME}")))
}

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    Default,
    ConfigFile(PathBuf),
    EnvironmentVariable(String),
    CommandLine,
}

fn parse_number<T: FromStr>(var: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| {
        StorageError::configuration(format!("{var} must be a non-negative integer, got '{raw}': {e}"))
    })
}

impl StorageConfig {
    pub fn builder() -> StorageConfigBuilder {
        StorageConfigBuilder::new()
    }

    /// Load a JSON config file; missing fields keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StorageError::io(OperationKind::Read, path, "read config file", e))?;
        serde_json::from_str(&content).map_err(|e| {
            StorageError::configuration(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Apply `STASH_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<(Self, Vec<ConfigSource>)> {
        self.with_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply `STASH_*` overrides read through `lookup`
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, Vec<ConfigSource>)> {
        let mut sources = Vec::new();
        let mut record = |var: &str| sources.push(ConfigSource::EnvironmentVariable(var.to_string()));

        if let Some(dir) = lookup(STASH_DATA_DIR_VAR).filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
            record(STASH_DATA_DIR_VAR);
        }
        if let Some(name) = lookup(STASH_STORE_NAME_VAR).filter(|v| !v.is_empty()) {
            self.store_name = name;
            record(STASH_STORE_NAME_VAR);
        }
        if let Some(raw) = lookup(STASH_COALESCE_MS_VAR) {
            self.coalesce_delay_ms = parse_number(STASH_COALESCE_MS_VAR, &raw)?;
            record(STASH_COALESCE_MS_VAR);
        }
        if let Some(raw) = lookup(STASH_FLUSH_TIMEOUT_MS_VAR) {
            self.flush_timeout_ms = parse_number(STASH_FLUSH_TIMEOUT_MS_VAR, &raw)?;
            record(STASH_FLUSH_TIMEOUT_MS_VAR);
        }
        if let Some(raw) = lookup(STASH_FLUSH_RETRIES_VAR) {
            self.flush_retries = parse_number(STASH_FLUSH_RETRIES_VAR, &raw)?;
            record(STASH_FLUSH_RETRIES_VAR);
        }

        Ok((self, sources))
    }

    /// Resolve defaults, an optional config file, and the environment
    pub fn resolve(config_file: Option<&Path>) -> Result<(Self, Vec<ConfigSource>)> {
        let mut sources = vec![ConfigSource::Default];
        let base = match config_file {
            Some(path) => {
                sources.push(ConfigSource::ConfigFile(path.to_path_buf()));
                Self::load(path)?
            }
            None => Self::default(),
        };

        let (config, env_sources) = base.with_env_overrides()?;
        sources.extend(env_sources);
        config.validate()?;

        tracing::debug!(
            data_dir = %config.data_dir.display(),
            store = %config.store_name,
            sources = sources.len(),
            "resolved storage configuration"
        );
        Ok((config, sources))
    }

    /// Reject values no backend can work with
    pub fn validate(&self) -> Result<()> {
        if self.store_name.trim().is_empty() {
            return Err(StorageError::configuration("store name must not be empty"));
        }
        if self.store_name.contains(['/', '\\']) {
            return Err(StorageError::configuration(format!(
                "store name '{}' must not contain path separators",
                self.store_name
            )));
        }
        if self.flush_timeout_ms == 0 {
            return Err(StorageError::configuration("flush timeout must be positive"));
        }
        Ok(())
    }

    pub fn coalesce_delay(&self) -> Duration {
        Duration::from_millis(self.coalesce_delay_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn flush_retry(&self) -> RetryConfig {
        RetryConfig::with_max_failures(self.flush_retries)
    }

    pub fn file_backend_config(&self) -> FileBackendConfig {
        FileBackendConfig {
            coalesce_delay: self.coalesce_delay(),
            flush_timeout: self.flush_timeout(),
            flush_retry: self.flush_retry(),
            format: if self.pretty {
                DocumentFormat::Pretty
            } else {
                DocumentFormat::Compact
            },
        }
    }
}

/// Builder for [`StorageConfig`]
#[derive(Debug, Clone, Default)]
pub struct StorageConfigBuilder {
    config: StorageConfig,
}

impl StorageConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn store_name(mut self, name: impl Into<String>) -> Self {
        self.config.store_name = name.into();
        self
    }

    pub fn coalesce_delay(mut self, delay: Duration) -> Self {
        self.config.coalesce_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.config.flush_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn flush_retries(mut self, retries: usize) -> Self {
        self.config.flush_retries = retries;
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.config.pretty = pretty;
        self
    }

    pub fn host_quota(mut self, quota: Option<u64>) -> Self {
        self.config.host_quota = quota;
        self
    }

    pub fn build(self) -> StorageConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.store_name, "store");
        assert_eq!(config.coalesce_delay(), Duration::from_millis(100));
        assert_eq!(config.flush_timeout(), Duration::from_secs(5));
        assert_eq!(config.flush_retry().max_attempts(), 3);
        assert!(config.data_dir.ends_with("stash"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stash.json");
        std::fs::write(&path, r#"{"store_name": "prefs", "pretty": false}"#).unwrap();

        let config = StorageConfig::load(&path).unwrap();
        assert_eq!(config.store_name, "prefs");
        assert!(!config.pretty);
        assert_eq!(config.coalesce_delay_ms, 100);
        assert_eq!(config.file_backend_config().format, DocumentFormat::Compact);
    }

    #[test]
    fn test_invalid_config_file_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stash.json");
        std::fs::write(&path, r#"{"coalesce_delay_ms": "soon"}"#).unwrap();

        let err = StorageConfig::load(&path).unwrap_err();
        assert!(matches!(err, StorageError::Configuration { .. }));
    }

    #[test]
    fn test_env_overrides_are_recorded() {
        let (config, sources) = StorageConfig::default()
            .with_overrides_from(lookup_in(&[
                ("STASH_DATA_DIR", "/tmp/stash-test"),
                ("STASH_COALESCE_MS", " 25 "),
            ]))
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/stash-test"));
        assert_eq!(config.coalesce_delay(), Duration::from_millis(25));
        assert_eq!(
            sources,
            vec![
                ConfigSource::EnvironmentVariable("STASH_DATA_DIR".to_string()),
                ConfigSource::EnvironmentVariable("STASH_COALESCE_MS".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_env_number_is_rejected() {
        let err = StorageConfig::default()
            .with_overrides_from(lookup_in(&[("STASH_FLUSH_RETRIES", "-1")]))
            .unwrap_err();
        assert!(err.to_string().contains("STASH_FLUSH_RETRIES"));
    }

    #[test]
    fn test_validate_rejects_bad_store_names() {
        for name in ["", "  ", "a/b", "a\\b"] {
            let config = StorageConfig::builder().store_name(name).build();
            assert!(config.validate().is_err(), "accepted {name:?}");
        }
        let config = StorageConfig::builder()
            .flush_timeout(Duration::ZERO)
            .build();
        assert!(config.validate().is_err());
    }
}
