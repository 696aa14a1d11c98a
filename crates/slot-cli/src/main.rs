//! # slotd
//!
//! Runs a game server out of one slot of a shared slot pool and swaps the
//! slot on console command.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use slot_config::logging::{init_logging, LogLevel};
use slot_config::{PoolConfig, POOL_CONFIG_FILE};

mod console;
mod daemon;
mod host;
mod render;

/// Threads available to restart-wrapped operations and blocking console reads
const BLOCKING_THREADS: usize = 4;

/// slotd - slot mount daemon
#[derive(Parser)]
#[command(name = "slotd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Pool config file
    #[arg(short, long, env = "SLOTMOUNT_CONFIG", default_value = POOL_CONFIG_FILE)]
    config: PathBuf,

    /// Log debug output (overridden by SLOTMOUNT_LOG / RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default pool config
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Run the server and read console commands (default)
    Run,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init { force } => init_config(&cli.config, force),
        Commands::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .max_blocking_threads(BLOCKING_THREADS)
                .thread_name("slotd")
                .build()
                .context("build runtime")?;
            runtime.block_on(daemon::run(cli.config))
        }
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, use --force to overwrite", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, PoolConfig::default_toml()?)?;
    println!("Wrote {}", path.display());
    println!("Set current_server and available_servers, then run `slotd run`.");
    Ok(())
}
