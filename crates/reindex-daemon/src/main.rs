//! Reindex Lab Daemon
//!
//! Runs the reindex queue worker and the operator tooling around it.
//!
//! # Usage
//!
//! ```bash
//! reindex-daemon serve [--strategy blue-green]
//! reindex-daemon reindex DOC_ID --content TEXT [--simulate-delay-ms 500]
//! reindex-daemon queue enqueue DOC_ID --priority critical
//! reindex-daemon recovery scan
//! reindex-daemon bench --strategy baseline --strategy blue-green
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/reindex-lab/config.toml)
//! 3. Environment variables (REINDEX_*)
//! 4. CLI flags

use anyhow::{Context, Result};
use clap::Parser;

use reindex_daemon::{init_logging, load_settings, run_command, Cli, Runtime};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_logging(&settings)?;

    let runtime = Runtime::open(settings).await?;
    let output = run_command(&runtime, cli.command).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to format output")?
    );
    Ok(())
}
