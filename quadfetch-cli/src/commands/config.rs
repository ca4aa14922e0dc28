//! Configuration management CLI commands.

use std::path::Path;

use clap::Subcommand;
use quadfetch::config::ConfigFile;

use crate::commands::common::{config_path, load_config};
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, explicit: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            let path = config_path(explicit);
            let config = load_config(explicit)?;
            if path.exists() {
                println!("# Loaded from {}", path.display());
            } else {
                println!("# {} not found, showing defaults", path.display());
            }
            print!("{}", config.to_ini_string());
            Ok(())
        }
        ConfigCommands::Init { force } => {
            let path = config_path(explicit);
            let created = if force {
                ConfigFile::default().save_to(&path)?;
                true
            } else {
                ConfigFile::ensure_exists(&path)?
            };
            if created {
                println!("Wrote default configuration to {}", path.display());
            } else {
                println!(
                    "{} already exists. Use --force to overwrite it.",
                    path.display()
                );
            }
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", config_path(explicit).display());
            Ok(())
        }
    }
}
