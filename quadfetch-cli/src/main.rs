//! quadfetch CLI - Command-line interface
//!
//! Fetches map tiles through the quadfetch pipeline and manages its
//! configuration and on-disk archive.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::archive::ArchiveAction;
use commands::common::{load_config, start_logging};
use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "quadfetch")]
#[command(version = quadfetch::VERSION)]
#[command(about = "Fetch and cache map tiles", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.quadfetch/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load tiles through memory cache, archive and network
    Fetch(FetchArgs),

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Inspect or clear the on-disk tile archive
    Archive {
        #[command(subcommand)]
        action: ArchiveAction,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let explicit = cli.config.as_deref();
    match cli.command {
        Commands::Config { command } => commands::config::run(command, explicit),
        Commands::Fetch(args) => {
            let config = load_config(explicit)?;
            let _logging = start_logging(&config, cli.verbose)?;
            commands::fetch::run(&config, args)
        }
        Commands::Archive { action } => {
            let config = load_config(explicit)?;
            let _logging = start_logging(&config, cli.verbose)?;
            commands::archive::run(action, &config)
        }
    }
}
