//! Default values for every setting and the `ConfigFile::default()` impl.

use std::path::PathBuf;

use super::file::config_directory;
use super::settings::*;
use crate::fetch::DEFAULT_TIMEOUT;
use crate::source::DEFAULT_MAX_PENDING;
use crate::tile::{TileFormat, BASE_TILE_SIZE, DEFAULT_MAX_SOURCE_ZOOM};

pub const DEFAULT_SOURCE_NAME: &str = "osm";
pub const DEFAULT_URL_TEMPLATE: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const DEFAULT_TILE_FORMAT: TileFormat = TileFormat::Raster;

/// 64 MB
pub const DEFAULT_MEMORY_CACHE_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_ARCHIVE_WRITE_BACK: bool = true;

pub const DEFAULT_NETWORK_WORKERS: usize = 4;
pub const MAX_NETWORK_WORKERS: usize = 64;
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = DEFAULT_TIMEOUT.as_secs();

pub const DEFAULT_LOG_FILE: &str = "quadfetch.log";

/// `~/.quadfetch/archive`
pub fn default_archive_directory() -> PathBuf {
    config_directory().join("archive")
}

/// `~/.quadfetch/logs`
pub fn default_log_directory() -> PathBuf {
    config_directory().join("logs")
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            source: SourceSettings {
                name: DEFAULT_SOURCE_NAME.to_string(),
                url_template: DEFAULT_URL_TEMPLATE.to_string(),
                subdomains: Vec::new(),
                tms: false,
                max_zoom: DEFAULT_MAX_SOURCE_ZOOM,
                tile_size: BASE_TILE_SIZE,
                format: DEFAULT_TILE_FORMAT,
            },
            cache: CacheSettings {
                memory_size: DEFAULT_MEMORY_CACHE_SIZE,
                archive_dir: Some(default_archive_directory()),
                archive_write_back: DEFAULT_ARCHIVE_WRITE_BACK,
                offline_fallback: false,
            },
            network: NetworkSettings {
                workers: DEFAULT_NETWORK_WORKERS,
                timeout: DEFAULT_NETWORK_TIMEOUT_SECS,
                max_pending: DEFAULT_MAX_PENDING,
            },
            logging: LoggingSettings {
                directory: default_log_directory(),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}
