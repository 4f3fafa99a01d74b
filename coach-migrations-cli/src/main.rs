//! Boot-time migration runner.
//!
//! Loads configuration, connects to MongoDB and applies every pending migration of the shipped
//! registry. Exits non-zero when any migration fails, so a deployment never starts the
//! application against a partially migrated database.

mod cli;
mod settings;

use std::sync::Arc;

use clap::Parser;
use coach_migrations::migrations::registry;
use coach_migrations::mongo::MongoStore;
use coach_migrations::{AppContext, MigrationState, Migrator};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::{CliArgs, Commands};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; any other failure to read it is worth a warning.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let args = CliArgs::parse();
    init_tracing(args.log_level.as_deref());

    let migrator = Migrator::new(registry());
    let command = args.command.unwrap_or_default();

    if command == Commands::List {
        println!("Defined migrations ({}):", migrator.migrations().len());
        for migration in migrator.migrations() {
            println!("  {}", migration.id());
            if let Some(description) = migration.description() {
                println!("      {}", description);
            }
            for requirement in migration.requires() {
                println!("      requires {}", requirement);
            }
        }
        return Ok(());
    }

    let config = settings::load(args.config.as_deref())?;
    let store = MongoStore::connect(&config.database.uri, &config.database.name).await?;
    info!(database = %config.database.name, "connected");
    let app = AppContext::new(Arc::new(store), config.migrations);

    match command {
        Commands::Up => {
            let report = migrator.run_all(&app).await?;
            println!(
                "Applied {} migration(s), {} already applied",
                report.applied.len(),
                report.skipped.len()
            );
            for id in &report.applied {
                println!("  {}", id);
            }
        }
        Commands::Status => {
            println!("{:<36} {:<8} {:<26} ELAPSED", "ID", "STATE", "APPLIED AT");
            for line in migrator.status(&app).await? {
                let (applied_at, elapsed) = match &line.entry {
                    Some(entry) => (
                        entry.applied_at.to_rfc3339(),
                        entry
                            .elapsed_ms
                            .map(|ms| format!("{ms}ms"))
                            .unwrap_or_default(),
                    ),
                    None => (String::new(), String::new()),
                };
                println!(
                    "{:<36} {:<8} {:<26} {}",
                    line.id,
                    line.state.to_string(),
                    applied_at,
                    elapsed
                );
            }
            let unknown: Vec<_> = migrator
                .history(&app)
                .await?
                .into_iter()
                .filter(|entry| !migrator.migrations().iter().any(|m| m.id() == entry.id))
                .collect();
            for entry in unknown {
                println!("{:<36} {:<8} {}", entry.id, "UNKNOWN", entry.applied_at.to_rfc3339());
            }
        }
        Commands::Pending => {
            let pending = migrator.pending(&app).await?;
            if pending.is_empty() {
                println!("Database is up to date.");
            } else {
                println!("Pending migrations ({}):", pending.len());
                for migration in pending {
                    println!("  {} [{}]", migration.id(), MigrationState::Pending);
                }
            }
        }
        Commands::List => unreachable!("handled before connecting"),
    }
    Ok(())
}

fn init_tracing(level: Option<&str>) {
    // --log-level wins, then RUST_LOG, then info.
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
