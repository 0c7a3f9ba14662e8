//! maprest CLI - Command-line interface
//!
//! This binary provides a command-line interface to the maprest library.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::cache::CacheAction;
use commands::config::ConfigCommands;
use commands::get::GetArgs;
use commands::tile::TileArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "maprest")]
#[command(version = maprest::VERSION)]
#[command(about = "Issue map REST requests and manage the tile cache", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.maprest/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL through the request engine
    Get(GetArgs),

    /// Fetch a map tile through the tile cache
    Tile(TileArgs),

    /// Manage the tile cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Commands::Config { command } = cli.command {
        return commands::config::run(command, cli.config.as_deref());
    }

    let config = commands::common::load_config(cli.config.as_deref())?;
    let _logging = commands::common::init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Get(args) => commands::get::run(args, &config),
        Commands::Tile(args) => commands::tile::run(args, &config),
        Commands::Cache { action } => commands::cache::run(action, &config),
        Commands::Config { .. } => Ok(()),
    }
}
