use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use tillsync::cache::CacheStore;
use tillsync::cli::args::{Cli, Commands};
use tillsync::cli::commands;
use tillsync::config::{Config, Paths};
use tillsync::storage::Database;
use tillsync::sync::SyncQueue;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        print!("{}", commands::completions(shell));
        return Ok(());
    }

    let paths = match cli.home {
        Some(root) => Paths::with_root(root),
        None => Paths::new()?,
    };
    let config = Config::load_from_path(&paths.config_file)?;
    init_tracing(&config.general.log_level);

    let format = cli.output.unwrap_or(config.general.default_output);

    if let Commands::Config = cli.command {
        println!("{}", commands::show_config(&paths, &config, format)?);
        return Ok(());
    }

    paths.ensure_dirs()?;
    let db = Arc::new(
        Database::open_at(&paths.database)
            .with_context(|| format!("opening {}", paths.database.display()))?,
    );
    let queue = SyncQueue::with_database(Arc::clone(&db));

    let output = match cli.command {
        Commands::Status => commands::status(&queue, format)?,
        Commands::List { status, limit } => commands::list(&queue, &status, limit, format)?,
        Commands::Show { id } => commands::show(&queue, id, format)?,
        Commands::Enqueue(args) => commands::enqueue(&queue, args, &config.sync, format)?,
        Commands::Rearm { id, attempts } => commands::rearm(&queue, id, attempts, format)?,
        Commands::Requeue { id, payload } => {
            commands::requeue(&queue, id, payload.as_deref(), format)?
        },
        Commands::Discard { id } => commands::discard(&queue, id, format)?,
        Commands::Cleanup { older_than } => commands::cleanup(
            &queue,
            older_than.unwrap_or(config.sync.retention_hours),
            format,
        )?,
        Commands::Recover => commands::recover(&queue, format)?,
        Commands::Cache(args) => {
            commands::cache(&CacheStore::with_database(db), args.command, format)?
        },
        Commands::Config | Commands::Completions { .. } => String::new(),
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
