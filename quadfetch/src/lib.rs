//! quadfetch - Tile acquisition and caching for map renderers
//!
//! Tiles are addressed by [`tile::TileAddress`] and loaded through a
//! [`source::SourceChain`] of stages: an in-memory cache, an on-disk
//! archive and a network stage backed by a [`fetch::FetchWorkerPool`].
//! Concurrent requests for one tile share a single download, and a
//! generation counter keeps data loaded before a clear from reaching the
//! consumer.
//!
//! # High-Level API
//!
//! The [`service`] module wires everything from a config file:
//!
//! ```no_run
//! use quadfetch::config::ConfigFile;
//! use quadfetch::service::TileService;
//! use quadfetch::tile::TileAddress;
//!
//! let service = TileService::new(&ConfigFile::load()?)?;
//! let outcomes = service.fetch(&[TileAddress::new(19295, 24641, 16)]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod archive;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod service;
pub mod source;
pub mod tile;

/// Version of the quadfetch library and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
