//! vdisk interactive shell
//!
//! Opens (or creates) the backing file and reads one command per line

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use vdisk_rs::shell;
use vdisk_rs::{EngineConfig, StorageEngine};

#[derive(Parser, Debug)]
#[command(name = "vdisk")]
#[command(about = "Integer file store inside a fixed-size virtual disk")]
struct Args {
    /// Path to the backing file
    #[arg(short = 'd', long)]
    disk: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Backing file size in bytes (new disks only)
    #[arg(long)]
    capacity: Option<u64>,

    /// Memory budget for sorting, in bytes
    #[arg(long)]
    sort_budget: Option<u64>,

    /// Start with an empty catalog and never write it back
    #[arg(long)]
    no_persist: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Args {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_toml_file(path)
                .with_context(|| format!("loading configuration from {:?}", path))?,
            None => EngineConfig::default(),
        };

        if let Some(disk) = &self.disk {
            config = config.with_disk_path(disk);
        }
        if let Some(capacity) = self.capacity {
            config = config.with_capacity(capacity);
        }
        if let Some(budget) = self.sort_budget {
            config = config.with_sort_budget(budget);
        }
        if self.no_persist {
            config = config.with_persistence(false);
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so command output stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = args.engine_config()?;
    info!("Opening virtual disk {:?}", config.disk_path);

    let disk_path = config.disk_path.clone();
    let mut engine = StorageEngine::open(config)
        .with_context(|| format!("opening virtual disk {:?}", disk_path))?;

    let session = shell::run_session(&mut engine, std::io::stdin().lock(), std::io::stdout());
    let closed = engine.close();

    session?;
    closed?;
    Ok(())
}
