//! Archive management CLI commands.

use clap::Subcommand;
use quadfetch::archive::DirectoryArchive;
use quadfetch::config::{format_size, ConfigFile};

use crate::error::CliError;

/// Archive action subcommands.
#[derive(Debug, Subcommand)]
pub enum ArchiveAction {
    /// Show how many tiles the archive holds
    Stats,
    /// Delete every archived tile
    Clear,
}

/// Run an archive subcommand.
pub fn run(action: ArchiveAction, config: &ConfigFile) -> Result<(), CliError> {
    let dir = config.cache.archive_dir.as_ref().ok_or(CliError::NoArchive)?;
    let archive = DirectoryArchive::open(dir)?;

    match action {
        ArchiveAction::Stats => {
            let stats = archive.stats()?;
            println!("Archive: {}", archive.root().display());
            println!("  Tiles: {}", stats.tile_count);
            println!("  Size:  {}", format_size(stats.total_bytes as usize));
        }
        ArchiveAction::Clear => {
            println!("Clearing archive at: {}", archive.root().display());
            let removed = archive.clear()?;
            println!(
                "Deleted {} tiles, freed {}",
                removed.tile_count,
                format_size(removed.total_bytes as usize)
            );
        }
    }
    Ok(())
}
