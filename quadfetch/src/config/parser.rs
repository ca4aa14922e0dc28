//! Mapping from INI keys to [`ConfigFile`] fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::defaults::MAX_NETWORK_WORKERS;
use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;
use crate::tile::{TileFormat, MAX_ZOOM};

/// Overlay the values present in `ini` on top of the defaults.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(section) = ini.section(Some("source")) {
        let source = &mut config.source;
        if let Some(v) = non_empty(section, "name") {
            source.name = v.to_string();
        }
        if let Some(v) = non_empty(section, "url_template") {
            source.url_template = v.to_string();
        }
        if let Some(v) = section.get("subdomains") {
            source.subdomains = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = section.get("tms") {
            source.tms = parse_bool(v);
        }
        if let Some(v) = section.get("max_zoom") {
            source.max_zoom = parse_number(v, "source", "max_zoom")?;
            if source.max_zoom > MAX_ZOOM {
                return Err(invalid(
                    "source",
                    "max_zoom",
                    v,
                    format!("must be at most {}", MAX_ZOOM),
                ));
            }
        }
        if let Some(v) = section.get("tile_size") {
            source.tile_size = parse_number(v, "source", "tile_size")?;
            if !source.tile_size.is_power_of_two() {
                return Err(invalid("source", "tile_size", v, "must be a power of two"));
            }
        }
        if let Some(v) = section.get("format") {
            source.format =
                TileFormat::from_str(v).map_err(|reason| invalid("source", "format", v, reason))?;
        }

        // Catch bad templates at load time rather than on first fetch.
        source
            .url_template()
            .map_err(|e| invalid("source", "url_template", &source.url_template, e.to_string()))?;
    }

    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("memory_size") {
            config.cache.memory_size =
                parse_size(v).map_err(|e| invalid("cache", "memory_size", v, e.to_string()))?;
        }
        if let Some(v) = section.get("archive_dir") {
            let v = v.trim();
            config.cache.archive_dir = match v.to_ascii_lowercase().as_str() {
                "" | "none" | "off" => None,
                _ => Some(expand_tilde(v)),
            };
        }
        if let Some(v) = section.get("archive_write_back") {
            config.cache.archive_write_back = parse_bool(v);
        }
        if let Some(v) = section.get("offline_fallback") {
            config.cache.offline_fallback = parse_bool(v);
        }
    }

    if let Some(section) = ini.section(Some("network")) {
        if let Some(v) = section.get("workers") {
            let workers: usize = parse_number(v, "network", "workers")?;
            if workers == 0 || workers > MAX_NETWORK_WORKERS {
                return Err(invalid(
                    "network",
                    "workers",
                    v,
                    format!("must be between 1 and {}", MAX_NETWORK_WORKERS),
                ));
            }
            config.network.workers = workers;
        }
        if let Some(v) = section.get("timeout") {
            config.network.timeout = parse_number(v, "network", "timeout")?;
            if config.network.timeout == 0 {
                return Err(invalid("network", "timeout", v, "must be at least 1 second"));
            }
        }
        if let Some(v) = section.get("max_pending") {
            config.network.max_pending = parse_number(v, "network", "max_pending")?;
            if config.network.max_pending == 0 {
                return Err(invalid("network", "max_pending", v, "must be at least 1"));
            }
        }
    }

    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section, "directory") {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = non_empty(section, "file") {
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number<T: FromStr>(value: &str, section: &str, key: &str) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "must be a non-negative integer"))
}

fn invalid(section: &str, key: &str, value: &str, reason: impl Into<String>) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// `true`, `1`, `yes` and `on` are true; anything else is false.
pub(super) fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Resolve a leading `~/` against the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        parse_ini(&Ini::load_from_str(text).unwrap())
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_source_section() {
        let config = parse(
            "[source]\n\
             name = streets\n\
             url_template = https://{s}.tiles.example.com/{z}/{x}/{y}.pbf\n\
             subdomains = a, b ,c\n\
             tms = yes\n\
             max_zoom = 14\n\
             tile_size = 512\n\
             format = mvt\n",
        )
        .unwrap();

        assert_eq!(config.source.name, "streets");
        assert_eq!(config.source.subdomains, vec!["a", "b", "c"]);
        assert!(config.source.tms);
        assert_eq!(config.source.max_zoom, 14);
        assert_eq!(config.source.format, TileFormat::Mvt);

        let zoom = config.source.zoom_options();
        assert_eq!(zoom.max_source_zoom, 14);
        assert_eq!(zoom.zoom_bias, 1);
    }

    #[test]
    fn test_source_rejects_bad_template() {
        let err = parse("[source]\nurl_template = https://{s}.example.com/{z}/{x}/{y}\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigFileError::InvalidValue { ref key, .. } if key == "url_template"
        ));
    }

    #[test]
    fn test_source_rejects_deep_zoom() {
        assert!(parse("[source]\nmax_zoom = 31\n").is_err());
        assert!(parse("[source]\nmax_zoom = deep\n").is_err());
    }

    #[test]
    fn test_source_rejects_unknown_format() {
        let err = parse("[source]\nformat = svg\n").unwrap_err();
        assert!(err.to_string().contains("source.format"));
    }

    #[test]
    fn test_cache_section() {
        let config = parse(
            "[cache]\n\
             memory_size = 8MB\n\
             archive_dir = /var/tiles\n\
             archive_write_back = false\n\
             offline_fallback = on\n",
        )
        .unwrap();

        assert_eq!(config.cache.memory_size, 8 * 1024 * 1024);
        assert_eq!(config.cache.archive_dir, Some(PathBuf::from("/var/tiles")));
        assert!(!config.cache.archive_write_back);
        assert!(config.cache.offline_fallback);
    }

    #[test]
    fn test_cache_archive_can_be_disabled() {
        let config = parse("[cache]\narchive_dir = none\n").unwrap();
        assert_eq!(config.cache.archive_dir, None);
    }

    #[test]
    fn test_cache_rejects_bad_size() {
        let err = parse("[cache]\nmemory_size = lots\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigFileError::InvalidValue { ref section, .. } if section == "cache"
        ));
    }

    #[test]
    fn test_network_section() {
        let config = parse("[network]\nworkers = 8\ntimeout = 5\nmax_pending = 200\n").unwrap();
        assert_eq!(config.network.workers, 8);
        assert_eq!(config.network.timeout, 5);
        assert_eq!(config.network.max_pending, 200);
    }

    #[test]
    fn test_network_limits() {
        assert!(parse("[network]\nworkers = 0\n").is_err());
        assert!(parse(&format!("[network]\nworkers = {}\n", MAX_NETWORK_WORKERS + 1)).is_err());
        assert!(parse("[network]\ntimeout = 0\n").is_err());
        assert!(parse("[network]\nmax_pending = 0\n").is_err());
    }

    #[test]
    fn test_logging_section() {
        let config = parse("[logging]\ndirectory = /tmp/qf\nfile = run.log\n").unwrap();
        assert_eq!(config.logging.path(), PathBuf::from("/tmp/qf/run.log"));
    }

    #[test]
    fn test_blank_values_keep_defaults() {
        let config = parse("[logging]\nfile =\n").unwrap();
        assert_eq!(config.logging.file, DEFAULT_LOG_FILE);
    }

    #[test]
    fn test_parse_bool() {
        for v in ["true", "TRUE", "1", "yes", " on "] {
            assert!(parse_bool(v), "{}", v);
        }
        for v in ["false", "0", "no", "off", ""] {
            assert!(!parse_bool(v), "{}", v);
        }
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/tiles"), home.join("tiles"));
        }
    }
}
