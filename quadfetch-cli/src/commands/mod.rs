//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`archive`] - Archive management (stats, clear)
//! - [`config`] - Configuration management (show, init, path)
//! - [`fetch`] - Load tiles through the full pipeline

pub mod archive;
pub mod common;
pub mod config;
pub mod fetch;
