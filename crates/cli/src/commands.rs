use anyhow::{bail, Context};
use clap::Subcommand;
use stash_core::BackendKind;
use stash_storage::{StorageExt, StorageRegistry};
use std::io::Write;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the value stored under a key
    Get { key: String },

    /// Store a value
    Set { key: String, value: String },

    /// Remove a key
    #[command(visible_alias = "remove")]
    Rm { key: String },

    /// Remove every entry from the store
    Clear,

    /// Atomically add to an integer value, starting from 0
    Incr {
        key: String,

        /// Amount to add (may be negative)
        #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
        by: i64,
    },

    /// Show the native capabilities of the selected backend
    Caps,

    /// List the backends usable with the current configuration
    Backends,
}

#[derive(Debug, thiserror::Error)]
pub enum IncrError {
    #[error("adding {by} to {current} overflows")]
    Overflow { current: i64, by: i64 },
}

impl Commands {
    fn is_mutating(&self) -> bool {
        matches!(
            self,
            Commands::Set { .. } | Commands::Rm { .. } | Commands::Clear | Commands::Incr { .. }
        )
    }

    pub async fn execute(
        self,
        registry: &StorageRegistry,
        kind: BackendKind,
        out: &mut impl Write,
    ) -> anyhow::Result<()> {
        if let Commands::Backends = self {
            for available in registry.available_kinds().await {
                let note = if available.is_persistent() {
                    "persistent"
                } else {
                    "volatile"
                };
                writeln!(out, "{available}\t{note}")?;
            }
            return Ok(());
        }

        let storage = registry
            .get(kind)
            .with_context(|| format!("failed to open {kind} backend"))?;
        let mutating = self.is_mutating();

        match self {
            Commands::Get { key } => match storage.get_item(&key).await? {
                Some(value) => writeln!(out, "{value}")?,
                None => bail!("key '{key}' not found"),
            },
            Commands::Set { key, value } => storage.set_item(&key, &value).await?,
            Commands::Rm { key } => storage.remove_item(&key).await?,
            Commands::Clear => storage.clear_all().await?,
            Commands::Incr { key, by } => {
                let next = storage
                    .update_data(&key, |current: Option<i64>| {
                        let current = current.unwrap_or(0);
                        current
                            .checked_add(by)
                            .ok_or(IncrError::Overflow { current, by })
                    })
                    .await?;
                writeln!(out, "{next}")?;
            }
            Commands::Caps => {
                let caps = storage.capabilities();
                writeln!(out, "{}", serde_json::to_string_pretty(&caps)?)?;
            }
            Commands::Backends => {}
        }

        if mutating {
            storage
                .flush()
                .await
                .with_context(|| format!("failed to flush {kind} backend"))?;
        }
        Ok(())
    }
}
