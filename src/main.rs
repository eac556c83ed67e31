//! idmapper command-line tool
//!
//! Interns strings into, and looks them up from, a SQLite-backed id mapper.
//!
//! ```text
//! idmapper --database ids.db intern users alice bob
//! idmapper --database ids.db lookup users 2
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use idmapper::mapper::{IdMapper, MapperConfig, MapperRegistry, DEFAULT_LOAD_BATCH_SIZE};
use idmapper::{SqliteStore, INVALID};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Durable string interning backed by SQLite
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database file
    #[arg(long, env = "IDMAPPER_DB", default_value = "idmapper.db")]
    database: PathBuf,

    /// Shared namespace prefix for mapper tables
    #[arg(long, env = "IDMAPPER_PREFIX")]
    prefix: Option<String>,

    /// Rows consumed between two load watermarks
    #[arg(long, env = "IDMAPPER_LOAD_BATCH", default_value_t = DEFAULT_LOAD_BATCH_SIZE)]
    load_batch: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Intern keys, creating the mapper table if needed, and print their ids
    Intern { mapper: String, keys: Vec<String> },
    /// Print the key stored under an id
    Lookup { mapper: String, id: u32 },
    /// Print the id of a key without interning it
    Find { mapper: String, key: String },
    /// Print every interned key
    List { mapper: String },
    /// Print mapper statistics as JSON
    Stats { mapper: String },
}

impl Command {
    fn mapper(&self) -> &str {
        match self {
            Command::Intern { mapper, .. }
            | Command::Lookup { mapper, .. }
            | Command::Find { mapper, .. }
            | Command::List { mapper }
            | Command::Stats { mapper } => mapper,
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(&args);

    let store = SqliteStore::open(&args.database)
        .with_context(|| format!("opening {}", args.database.display()))?;
    info!(database = %args.database.display(), "Opened mapper database");

    let config = MapperConfig {
        table_prefix: args.prefix.clone(),
        load_batch_size: args.load_batch,
        ..Default::default()
    };
    let registry = MapperRegistry::new(Arc::new(store), config);

    let create = matches!(args.command, Command::Intern { .. });
    let name = args.command.mapper();
    let Some(mapper) = registry
        .get_mapper(name, create)
        .await
        .with_context(|| format!("opening mapper '{}'", name))?
    else {
        eprintln!("mapper '{}' does not exist", name);
        return Ok(ExitCode::FAILURE);
    };

    run(&args.command, &mapper).await
}

async fn run(command: &Command, mapper: &IdMapper) -> Result<ExitCode> {
    match command {
        Command::Intern { keys, .. } => {
            for key in keys {
                let id = mapper
                    .id_from_item(key, true)
                    .await
                    .with_context(|| format!("interning '{}'", key))?;
                if id == INVALID {
                    eprintln!("'{}' can not be stored", key);
                } else {
                    println!("{}\t{}", key, id);
                }
            }
        }
        Command::Lookup { id, .. } => match mapper.item_from_id(*id) {
            Some(key) => println!("{}", key),
            None => return Ok(ExitCode::FAILURE),
        },
        Command::Find { key, .. } => match mapper.has_item(key) {
            Some(id) => println!("{}", id),
            None => return Ok(ExitCode::FAILURE),
        },
        Command::List { .. } => {
            let mut items = mapper.items();
            items.sort();
            for item in items {
                println!("{}", item);
            }
        }
        Command::Stats { .. } => {
            let snapshot = mapper.stats().snapshot();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
