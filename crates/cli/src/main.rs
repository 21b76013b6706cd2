use clap::Parser;
use stash_core::BackendKind;
use stash_storage::{ConfigSource, StorageConfig, StorageRegistry};
use std::path::PathBuf;

mod commands;

use commands::Commands;

#[derive(Parser)]
#[command(name = "stash")]
#[command(about = "Inspect and edit stash key-value stores", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the store files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Store name (the primary document is <store>.json)
    #[arg(long, global = true)]
    store: Option<String>,

    /// Backend to operate on (memory, file, host)
    #[arg(short, long, global = true, default_value = "file")]
    backend: BackendKind,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = stash_utils::logging::init("info") {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let (mut config, mut sources) = StorageConfig::resolve(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
        sources.push(ConfigSource::CommandLine);
    }
    if let Some(store) = cli.store {
        config.store_name = store;
        sources.push(ConfigSource::CommandLine);
    }
    config.validate()?;
    tracing::debug!(?sources, "configuration sources");

    let registry = StorageRegistry::new(config);
    let mut stdout = std::io::stdout().lock();
    cli.command.execute(&registry, cli.backend, &mut stdout).await
}
