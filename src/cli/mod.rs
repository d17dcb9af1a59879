//! Command-line interface for worker-guard.
//!
//! Provides commands to run the startup guard, register a worker's version,
//! and report roles running stale builds.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
