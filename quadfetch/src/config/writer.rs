//! Rendering a [`ConfigFile`] as a commented `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;
use super::size::format_size;

pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let archive_dir = config
        .cache
        .archive_dir
        .as_deref()
        .map(path_to_string)
        .unwrap_or_else(|| "none".to_string());

    format!(
        r#"# quadfetch configuration

[source]
# Label used in log output
name = {name}
# Tile URL. Placeholders: {{x}} {{y}} {{z}}, {{s}} (subdomain), {{q}} (quadkey)
url_template = {url_template}
# Comma-separated values for {{s}}
subdomains = {subdomains}
# Count rows from the south edge (TMS)
tms = {tms}
# Deepest zoom the server has tiles for; deeper requests reuse the ancestor
max_zoom = {max_zoom}
# Tile edge in pixels (256, 512, 1024)
tile_size = {tile_size}
# geojson, topojson, mvt or raster
format = {format}

[cache]
# In-memory budget (e.g. 64MB, 1GB). 0 disables the memory cache
memory_size = {memory_size}
# Directory for the on-disk archive, or none
archive_dir = {archive_dir}
# Save downloaded tiles to the archive
archive_write_back = {archive_write_back}
# Only read the archive when the network has nothing
offline_fallback = {offline_fallback}

[network]
# Download threads
workers = {workers}
# Request timeout in seconds
timeout = {timeout}
# Distinct tiles in flight before new requests are refused
max_pending = {max_pending}

[logging]
directory = {log_directory}
file = {log_file}
"#,
        name = config.source.name,
        url_template = config.source.url_template,
        subdomains = config.source.subdomains.join(","),
        tms = config.source.tms,
        max_zoom = config.source.max_zoom,
        tile_size = config.source.tile_size,
        format = config.source.format,
        memory_size = format_size(config.cache.memory_size),
        archive_dir = archive_dir,
        archive_write_back = config.cache.archive_write_back,
        offline_fallback = config.cache.offline_fallback,
        workers = config.network.workers,
        timeout = config.network.timeout,
        max_pending = config.network.max_pending,
        log_directory = path_to_string(&config.logging.directory),
        log_file = config.logging.file,
    )
}

/// Display `path`, shortening the home directory back to `~`.
fn path_to_string(path: &Path) -> String {
    dirs::home_dir()
        .and_then(|home| path.strip_prefix(home).ok().map(|rest| format!("~/{}", rest.display())))
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::super::settings::ConfigFile;
    use super::*;
    use crate::tile::TileFormat;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_output_has_every_section() {
        let text = to_config_string(&ConfigFile::default());
        for section in ["[source]", "[cache]", "[network]", "[logging]"] {
            assert!(text.contains(section), "missing {}", section);
        }
        assert!(text.contains("memory_size = 64MB"));
    }

    #[test]
    fn test_written_file_loads_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.source.url_template = "https://{s}.example.com/{z}/{x}/{y}.json".to_string();
        config.source.subdomains = vec!["a".to_string(), "b".to_string()];
        config.source.format = TileFormat::GeoJson;
        config.source.max_zoom = 12;
        config.cache.memory_size = 3 * 1024 * 1024;
        config.cache.archive_dir = Some(temp.path().join("archive"));
        config.network.workers = 2;
        config.logging.directory = PathBuf::from("/tmp/quadfetch-logs");

        config.save_to(&path).unwrap();
        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_disabled_archive_written_as_none() {
        let mut config = ConfigFile::default();
        config.cache.archive_dir = None;
        assert!(to_config_string(&config).contains("archive_dir = none"));
    }
}
