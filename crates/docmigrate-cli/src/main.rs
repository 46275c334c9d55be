//! DocMigrate: batched field migrations over a document store.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docmigrate_core::RunConfig;
use docmigrate_migrate::CancelToken;
use docmigrate_store::SqliteStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "docmigrate")]
#[command(about = "Batched field migrations over a document store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a preset: built-in name, JSON file, or inline JSON
    Run {
        /// Preset to run (falls back to DOCMIGRATE_PRESET)
        preset: Option<String>,

        /// Document store path (falls back to DOCMIGRATE_DB)
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,

        /// Compute writes without committing them
        #[arg(long)]
        dry_run: bool,

        /// Override the preset's batch limit
        #[arg(long, value_name = "N")]
        batch_limit: Option<usize>,
    },
    /// Check a preset without touching the store
    Validate {
        preset: String,
    },
    /// List built-in presets
    Presets {
        /// Print full preset definitions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Seed a collection from a JSON file
    Import {
        collection: String,
        file: PathBuf,

        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the summary.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            preset,
            db,
            dry_run,
            batch_limit,
        } => {
            let mut config = RunConfig::from_env()?;
            if preset.is_some() {
                config.preset = preset;
            }
            if let Some(db) = db {
                config.db_path = db;
            }
            config.dry_run |= dry_run;
            if batch_limit.is_some() {
                config.batch_limit = batch_limit;
            }

            let cancel = CancelToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; stopping before the next store call");
                    on_interrupt.cancel();
                }
            });

            let outcome =
                tokio::task::spawn_blocking(move || commands::run_preset(&config, cancel)).await?;
            std::process::exit(commands::report(&outcome));
        }
        Command::Validate { preset } => match commands::validate_preset(&preset) {
            Ok(p) => println!("OK  {}", commands::describe(&p)),
            Err(e) => {
                eprintln!("Invalid preset: {:#}", e);
                std::process::exit(1);
            }
        },
        Command::Presets { json } => {
            if json {
                let presets: Vec<_> = docmigrate_migrate::builtin_names()
                    .iter()
                    .filter_map(|name| docmigrate_migrate::builtin(name))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&presets)?);
            } else {
                for line in commands::list_presets() {
                    println!("{}", line);
                }
            }
        }
        Command::Import {
            collection,
            file,
            db,
        } => {
            let db_path = db.unwrap_or_else(RunConfig::db_path_from_env);
            let store = SqliteStore::open(&db_path)?;
            let count = commands::import_documents(&store, &collection, &file)?;
            info!("Store now holds {} documents in {}", store.count(&collection)?, collection);
            println!("Imported {} documents into {}", count, collection);
        }
    }

    Ok(())
}
