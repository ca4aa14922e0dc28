//! User configuration stored in `~/.quadfetch/config.ini`.
//!
//! Settings structs live in `settings`, constants in `defaults`, INI
//! parsing in `parser` and serialization in `writer`.
//!
//! # Example
//!
//! ```
//! use quadfetch::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! let template = config.source.url_template().unwrap();
//! assert!(!template.is_tms());
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{CacheSettings, ConfigFile, LoggingSettings, NetworkSettings, SourceSettings};
pub use size::{format_size, parse_size, SizeParseError};
