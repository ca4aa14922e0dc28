//! Configuration data, one struct per INI section.

use std::path::PathBuf;

use crate::source::{UrlTemplate, UrlTemplateError};
use crate::tile::{zoom_bias_from_tile_size, TileFormat, ZoomOptions};

/// Contents of `config.ini`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub source: SourceSettings,
    pub cache: CacheSettings,
    pub network: NetworkSettings,
    pub logging: LoggingSettings,
}

/// `[source]`: where tiles come from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    /// Label used in logs
    pub name: String,
    /// Tile URL with `{x}`, `{y}`, `{z}`, `{s}` or `{q}` placeholders
    pub url_template: String,
    /// Values substituted for `{s}` in rotation
    pub subdomains: Vec<String>,
    /// Rows counted from the south edge
    pub tms: bool,
    /// Deepest zoom the server has data for
    pub max_zoom: u8,
    /// Pixel size of served tiles
    pub tile_size: u32,
    pub format: TileFormat,
}

/// `[cache]`: local storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Memory cache budget in bytes, 0 disables it
    pub memory_size: usize,
    /// On-disk archive root; `None` leaves the archive out of the chain
    pub archive_dir: Option<PathBuf>,
    /// Store network results in the archive
    pub archive_write_back: bool,
    /// Consult the archive only after the network came back empty
    pub offline_fallback: bool,
}

/// `[network]`: the fetch worker pool.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    pub workers: usize,
    /// Per-request timeout in seconds
    pub timeout: u64,
    /// Distinct tiles allowed in flight before new ones are refused
    pub max_pending: usize,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl SourceSettings {
    /// Build the validated URL template.
    pub fn url_template(&self) -> Result<UrlTemplate, UrlTemplateError> {
        UrlTemplate::with_options(&self.url_template, self.subdomains.clone(), self.tms)
    }

    pub fn zoom_options(&self) -> ZoomOptions {
        ZoomOptions {
            max_source_zoom: self.max_zoom,
            zoom_bias: zoom_bias_from_tile_size(self.tile_size),
            ..ZoomOptions::default()
        }
    }
}

impl LoggingSettings {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file)
    }
}
