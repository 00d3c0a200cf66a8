//! Reindex daemon library exports.
//!
//! This crate provides the CLI binary for reindex-lab.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (serve, reindex, queue, recovery, bench)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, ContentArgs, QueueCommands, RecoveryCommands};
pub use commands::{init_logging, load_settings, run_command, serve, Runtime};
