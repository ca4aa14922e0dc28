//! High-level service facade for quadfetch.
//!
//! Builds the memory cache, archive, fetch pool and source chain from a
//! [`ConfigFile`](crate::config::ConfigFile) and exposes blocking batch
//! fetches on top of the callback API.
//!
//! ```text
//! TileService ──► TileSource ──► memory ──► archive ──► network ──► FetchWorkerPool
//! ```

mod builder;
mod error;
mod facade;

pub use builder::{create_archive, create_cache, create_chain, create_client_factory, create_pool};
pub use error::ServiceError;
pub use facade::{FetchStatus, TileOutcome, TileService};
