//! CLI argument parsing for the reindex daemon.
//!
//! Global flags override every other config source.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use reindex_strategy::StrategyKind;
use reindex_types::Priority;

/// Reindex Lab Daemon
///
/// Runs the reindex queue worker and exposes the strategies, queue and
/// recovery tooling as one-shot commands that print JSON.
#[derive(Parser, Debug)]
#[command(name = "reindex-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/reindex-lab/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Document text given inline or read from a file.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct ContentArgs {
    /// Document text
    #[arg(long)]
    pub content: Option<String>,

    /// Read document text from this file
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recover interrupted work, then run the queue worker until signalled
    Serve {
        /// Strategy used for queued jobs (default from config)
        #[arg(short, long)]
        strategy: Option<StrategyKind>,
    },

    /// Replace a document's chunks
    Reindex {
        document_id: String,

        #[command(flatten)]
        content: ContentArgs,

        #[arg(short, long)]
        strategy: Option<StrategyKind>,

        /// Stall between the phases of the reindex
        #[arg(long)]
        simulate_delay_ms: Option<u64>,

        /// Business key stored on each chunk (defaults to the document id)
        #[arg(long)]
        document_number: Option<String>,
    },

    /// Initial load of a document
    Ingest {
        document_id: String,

        document_number: String,

        #[command(flatten)]
        content: ContentArgs,

        #[arg(short, long)]
        strategy: Option<StrategyKind>,
    },

    /// Remove or retire every chunk of a document
    Delete {
        document_id: String,

        #[arg(short, long)]
        strategy: Option<StrategyKind>,
    },

    /// Search chunks through a strategy's visibility rule
    Search {
        query: String,

        #[arg(long, default_value = "10")]
        limit: usize,

        /// Restrict results to these document numbers (repeatable)
        #[arg(long = "document-number")]
        document_numbers: Vec<String>,

        #[arg(short, long)]
        strategy: Option<StrategyKind>,
    },

    /// List every document with its chunk count
    Documents,

    /// Show the stored chunks of one document
    Chunks { document_id: String },

    /// Chunk count, statuses, versions and age range of one document
    Summary { document_id: String },

    /// Drop and recreate the vector collection
    Reset,

    /// Priority queue commands
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },

    /// Recovery and diagnostics commands
    Recovery {
        #[command(subcommand)]
        command: RecoveryCommands,
    },

    /// Measure search availability while each strategy reindexes
    Bench {
        /// Strategies to compare (repeatable, default all)
        #[arg(short, long = "strategy")]
        strategies: Vec<StrategyKind>,

        #[arg(long, default_value = "3")]
        iterations: usize,

        #[arg(long, default_value = "30")]
        query_interval_ms: u64,

        #[arg(long, default_value = "500")]
        delay_ms: u64,
    },

    /// Sample searches across one stalled delete-then-insert reindex
    Gap {
        #[arg(default_value = "race-demo-001")]
        document_id: String,

        #[arg(long, default_value = "500")]
        delay_ms: u64,
    },
}

/// Queue subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum QueueCommands {
    /// Add or replace a document's reindex job
    Enqueue {
        document_id: String,

        /// Business key (defaults to the document id)
        #[arg(long)]
        document_number: Option<String>,

        /// critical, high, normal, low or 1-4
        #[arg(short, long, default_value = "normal")]
        priority: Priority,

        #[arg(short, long, default_value = "CLI request")]
        reason: String,
    },

    /// Show queued jobs grouped by priority
    Status,

    /// 1-based position of a document's job (-1 when not queued)
    Position { document_id: String },

    /// Move a queued job to another priority
    Bump {
        document_id: String,

        priority: Priority,
    },

    /// Record the result of a job
    Complete {
        document_id: String,

        /// Mark the job failed instead of completed
        #[arg(long)]
        failed: bool,

        #[arg(long)]
        error: Option<String>,
    },

    /// Remove finished jobs older than the given age
    Cleanup {
        /// Age in minutes (default from config)
        #[arg(long)]
        older_than_minutes: Option<u64>,
    },

    /// Dequeue and process a single job
    ProcessNext {
        #[arg(short, long)]
        strategy: Option<StrategyKind>,
    },
}

/// Recovery subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum RecoveryCommands {
    /// Report stuck documents, stuck locks and incomplete versions
    Scan {
        /// Marker age threshold in minutes (default from config)
        #[arg(long)]
        document_minutes: Option<u64>,

        /// Lock age threshold in minutes (default from config)
        #[arg(long)]
        lock_minutes: Option<u64>,
    },

    /// Run the startup recovery pass now
    Recover,

    /// Drop a document's in-progress marker
    ClearStatus { document_id: String },

    /// Drop the marker and purge every chunk of the document
    ForceDelete { document_id: String },

    /// Keep only one version of a document's chunks
    CleanupVersions {
        document_id: String,

        #[arg(long)]
        keep: u64,
    },

    /// Delete a document's lock regardless of holder
    ReleaseLock { document_id: String },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
