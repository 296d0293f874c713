//! CLI binary entry point for catalog-cli

use clap::{Parser, Subcommand};
use publication_catalog::cli::commands::db::{
    DbInitArgs, DbResetArgs, DbStatusArgs, handle_db_init, handle_db_reset, handle_db_status,
};
use publication_catalog::cli::commands::seed::{SeedArgs, handle_seed};
use publication_catalog::cli::commands::studies::{
    LookupsArgs, StudiesArgs, handle_lookups, handle_studies,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "catalog-cli")]
#[command(about = "Manage a catalog of research publications and their datasets")]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Catalog database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Load a JSON or YAML seed batch
    Seed {
        /// Seed file
        file: PathBuf,
        /// Catalog directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
        /// Skip invalid records instead of aborting the load
        #[arg(long)]
        skip_invalid: bool,
        /// Keep existing rows instead of resetting the catalog first
        #[arg(long)]
        append: bool,
    },
    /// List publications, optionally filtered by species and/or region id
    Studies {
        #[arg(long)]
        species: Option<String>,
        #[arg(long)]
        region: Option<String>,
        /// Output format: table, json, csv
        #[arg(short, long, default_value = "table")]
        format: String,
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
    /// List all species and brain regions
    Lookups {
        #[arg(short, long, default_value = "table")]
        format: String,
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Write .catalog.toml and create the schema
    Init {
        /// Catalog directory
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Database backend: duckdb or postgres
        #[arg(long, default_value = "duckdb")]
        backend: String,
        /// PostgreSQL connection string (required for postgres)
        #[arg(long)]
        connection_string: Option<String>,
    },
    /// Show row counts and the last load
    Status {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Drop and recreate all catalog tables
    Reset {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Db { command } => match command {
            DbCommands::Init {
                dir,
                backend,
                connection_string,
            } => handle_db_init(&DbInitArgs {
                dir,
                backend,
                connection_string,
            }),
            DbCommands::Status { dir } => handle_db_status(&DbStatusArgs { dir }),
            DbCommands::Reset { dir } => handle_db_reset(&DbResetArgs { dir }),
        },
        Commands::Seed {
            file,
            dir,
            skip_invalid,
            append,
        } => handle_seed(&SeedArgs {
            file,
            dir,
            skip_invalid,
            append,
        }),
        Commands::Studies {
            species,
            region,
            format,
            dir,
        } => handle_studies(&StudiesArgs {
            dir,
            species,
            region,
            format,
        }),
        Commands::Lookups { format, dir } => handle_lookups(&LookupsArgs { dir, format }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
