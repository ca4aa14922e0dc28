//! `quadfetch fetch`: load tiles end to end and report what happened.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use quadfetch::config::{format_size, ConfigFile};
use quadfetch::service::{FetchStatus, TileOutcome, TileService};
use quadfetch::tile::{TileAddress, TileFormat};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Tiles to load, written z/x/y
    #[arg(required = true, value_parser = parse_tile)]
    pub tiles: Vec<TileAddress>,

    /// Write each loaded tile under DIR/z/x/y.<ext>
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

/// Parse `z/x/y` into a tile address inside the zoom's grid.
pub fn parse_tile(text: &str) -> Result<TileAddress, String> {
    let parts: Vec<&str> = text.trim().split('/').collect();
    let [z, x, y] = parts.as_slice() else {
        return Err(format!("expected z/x/y, got '{}'", text));
    };

    let z: u8 = z.parse().map_err(|_| format!("bad zoom '{}'", z))?;
    let x: u32 = x.parse().map_err(|_| format!("bad column '{}'", x))?;
    let y: u32 = y.parse().map_err(|_| format!("bad row '{}'", y))?;

    let address = TileAddress::new(x, y, z);
    if !address.is_valid(None) {
        return Err(format!("{}/{}/{} is outside the tile grid", z, x, y));
    }
    Ok(address)
}

pub fn run(config: &ConfigFile, args: FetchArgs) -> Result<(), CliError> {
    let service = TileService::new(config)?;
    let outcomes = service.fetch(&args.tiles);

    let mut failed = 0;
    for outcome in &outcomes {
        let written = match (&args.output, outcome.payload()) {
            (Some(dir), Some(payload)) => {
                Some(write_tile(dir, outcome, config.source.format, payload)?)
            }
            _ => None,
        };
        if outcome.status != FetchStatus::Loaded {
            failed += 1;
        }
        println!("{}", describe(outcome, written.as_deref()));
    }

    let stats = service.cache_stats();
    println!();
    println!("Memory cache: {}", stats);
    println!(
        "  {} tiles, {} of {}",
        stats.entry_count,
        format_size(stats.size_bytes),
        format_size(config.cache.memory_size)
    );
    if let Some(archive) = service.archive() {
        let archived = archive.stats()?;
        println!(
            "Archive: {} tiles, {} in {}",
            archived.tile_count,
            format_size(archived.total_bytes as usize),
            archive.root().display()
        );
    }

    service.shutdown();
    if failed > 0 {
        return Err(CliError::Incomplete {
            failed,
            total: outcomes.len(),
        });
    }
    Ok(())
}

fn describe(outcome: &TileOutcome, written: Option<&Path>) -> String {
    let requested = &outcome.requested;
    let mut line = format!(
        "{}/{}/{}: {}",
        requested.z, requested.x, requested.y, outcome.status
    );
    if outcome.loaded.z != requested.z {
        let loaded = &outcome.loaded;
        line.push_str(&format!(" (from {}/{}/{})", loaded.z, loaded.x, loaded.y));
    }
    if let Some(payload) = outcome.payload() {
        line.push_str(&format!(", {} bytes", payload.len()));
    }
    if let Some(path) = written {
        line.push_str(&format!(" -> {}", path.display()));
    }
    line
}

fn write_tile(
    dir: &Path,
    outcome: &TileOutcome,
    format: TileFormat,
    payload: &[u8],
) -> Result<PathBuf, CliError> {
    let tile = &outcome.requested;
    let path = dir
        .join(tile.z.to_string())
        .join(tile.x.to_string())
        .join(format!("{}.{}", tile.y, extension(format, payload)));

    let result = match path.parent() {
        Some(parent) => fs::create_dir_all(parent).and_then(|_| fs::write(&path, payload)),
        None => fs::write(&path, payload),
    };
    result.map_err(|error| CliError::FileWrite {
        path: path.clone(),
        error,
    })?;
    Ok(path)
}

/// File extension for a payload of `format`, sniffing raster images.
fn extension(format: TileFormat, payload: &[u8]) -> &'static str {
    match format {
        TileFormat::GeoJson => "geojson",
        TileFormat::TopoJson => "topojson",
        TileFormat::Mvt => "mvt",
        TileFormat::Raster if payload.starts_with(b"\x89PNG") => "png",
        TileFormat::Raster if payload.starts_with(b"\xff\xd8") => "jpg",
        TileFormat::Raster => "webp",
    }
}
