//! dbstubs CLI - introspect stored routines and emit their signatures
//!
//! Usage:
//!   dbstubs generate [--config <file>] [--emitters <name>...] [--output <dir>] [--replay <dir>]
//!   dbstubs query --database <name> --schema <name> [--config <file>]
//!   dbstubs emitters
//!
//! Examples:
//!   dbstubs generate --config dbstubs.toml
//!   dbstubs generate --emitters json --emitters raw-introspection --output stubs
//!   dbstubs generate --replay stubs --output replayed
//!   dbstubs query --database billing --schema bills

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dbstubs::config::Settings;
use dbstubs::emit::EmitterRegistry;
use dbstubs::filter::SchemaFilter;
use dbstubs::introspection::build_query;
use dbstubs::pipeline;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbstubs")]
#[command(about = "dbstubs - Introspect stored procedures and functions into typed routine trees")]
#[command(version)]
struct Cli {
    /// Path to the settings file (default: $DBSTUBS_CONFIG, ./dbstubs.toml, user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Introspect every configured database and run the emitters
    Generate {
        /// Emitters to run (overrides the settings file)
        #[arg(short, long)]
        emitters: Vec<String>,

        /// Output directory (overrides the settings file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Replay raw introspection dumps from this directory instead of querying
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Print the compiled introspection query for one schema
    Query {
        #[arg(short, long)]
        database: String,

        #[arg(short, long)]
        schema: String,
    },

    /// List available emitters
    Emitters,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            emitters,
            output,
            replay,
        } => cmd_generate(cli.config, cli.verbose, emitters, output, replay).await,
        Commands::Query { database, schema } => cmd_query(cli.config, &database, &schema),
        Commands::Emitters => cmd_emitters(),
    }
}

fn load_settings(config: Option<PathBuf>) -> Option<Settings> {
    let result = match config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    match result {
        Ok(settings) => Some(settings),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            None
        }
    }
}

fn setup_tracing(log_level: &str, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(log_level)
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_generate(
    config: Option<PathBuf>,
    verbose: bool,
    emitters: Vec<String>,
    output: Option<PathBuf>,
    replay: Option<PathBuf>,
) -> ExitCode {
    let Some(settings) = load_settings(config) else {
        return ExitCode::FAILURE;
    };
    setup_tracing(&settings.log_level, verbose);

    let emitters = if emitters.is_empty() {
        settings.emitters.clone()
    } else {
        emitters
    };
    let output = output.unwrap_or_else(|| settings.output.clone());

    let registry = EmitterRegistry::builtin();
    if let Err(e) = registry.select(&emitters) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let targets = match &replay {
        Some(dir) => pipeline::replay_targets(&settings, dir),
        None => pipeline::worker_targets(&settings).await,
    };
    let targets = match targets {
        Ok(targets) => targets,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match pipeline::generate(targets, &registry, &emitters, &output).await {
        Ok(generation) => {
            for path in &generation.written {
                println!("{}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_query(config: Option<PathBuf>, database: &str, schema: &str) -> ExitCode {
    let Some(settings) = load_settings(config) else {
        return ExitCode::FAILURE;
    };

    let database = match settings.get_database(database) {
        Ok(database) => database,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let Some(schema_settings) = database
        .schemas
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(schema))
    else {
        eprintln!("Error: schema {} is not configured for database {}", schema, database.name);
        return ExitCode::FAILURE;
    };

    match SchemaFilter::compile(schema_settings) {
        Ok(filter) => {
            println!("{}", build_query(&filter));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_emitters() -> ExitCode {
    println!("Emitters:");
    for name in EmitterRegistry::builtin().names() {
        println!("  - {}", name);
    }
    ExitCode::SUCCESS
}
