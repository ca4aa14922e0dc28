//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;

use quadfetch::archive::ArchiveError;
use quadfetch::config::ConfigFileError;
use quadfetch::logging::LoggingError;
use quadfetch::service::ServiceError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(LoggingError),
    /// Configuration could not be read or written
    Config(ConfigFileError),
    /// Failed to assemble the tile pipeline
    Service(ServiceError),
    /// Archive could not be opened, scanned or cleared
    Archive(ArchiveError),
    /// The archive is disabled in the config
    NoArchive,
    /// Failed to write a fetched tile
    FileWrite { path: PathBuf, error: std::io::Error },
    /// Some requested tiles did not load
    Incomplete { failed: usize, total: usize },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(ConfigFileError::InvalidValue { .. }) => {
                eprintln!();
                eprintln!("Fix the value in the config file, or regenerate it with:");
                eprintln!("  quadfetch config init --force");
            }
            CliError::NoArchive => {
                eprintln!();
                eprintln!("Set archive_dir in the [cache] section to enable the archive.");
            }
            _ => {}
        }

        let code = match self {
            CliError::Incomplete { .. } => 2,
            _ => 1,
        };
        process::exit(code)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Service(e) => write!(f, "Failed to start tile service: {}", e),
            CliError::Archive(e) => write!(f, "Archive error: {}", e),
            CliError::NoArchive => write!(f, "No archive directory is configured"),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path.display(), error)
            }
            CliError::Incomplete { failed, total } => {
                write!(f, "{} of {} tiles did not load", failed, total)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) => Some(e),
            CliError::Config(e) => Some(e),
            CliError::Service(e) => Some(e),
            CliError::Archive(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            CliError::NoArchive | CliError::Incomplete { .. } => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}

impl From<ArchiveError> for CliError {
    fn from(e: ArchiveError) -> Self {
        CliError::Archive(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::LoggingInit(e)
    }
}
