use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "coach-migrate", version)]
#[command(about = "Apply the coaching platform's database migrations")]
pub struct CliArgs {
    /// Path to a TOML configuration file (default: ./coach-migrate.toml when present)
    #[arg(long, short, env = "COACH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `coach_migrations=trace`. Takes precedence over RUST_LOG.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Subcommand)]
pub enum Commands {
    /// Apply every pending migration (default)
    #[default]
    Up,
    /// Show every migration with its state and ledger entry (requires database)
    Status,
    /// Preview the migrations `up` would apply, without running them (requires database)
    Pending,
    /// List all migrations shipped in this build (no database required)
    List,
}
