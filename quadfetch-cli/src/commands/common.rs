//! Helpers shared across CLI commands.

use std::path::{Path, PathBuf};

use quadfetch::config::{config_file_path, ConfigFile};
use quadfetch::logging::{init_logging, LoggingGuard};

use crate::error::CliError;

/// Config file named by `--config`, or the default location.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map(Path::to_path_buf).unwrap_or_else(config_file_path)
}

pub fn load_config(explicit: Option<&Path>) -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load_from(&config_path(explicit))?)
}

/// Start file and console logging as configured.
pub fn start_logging(config: &ConfigFile, verbose: bool) -> Result<LoggingGuard, CliError> {
    let guard = init_logging(&config.logging, verbose)?;
    tracing::debug!(log = %guard.path().display(), "Logging started");
    Ok(guard)
}
