//! Raw tile caching.
//!
//! [`RawTileCache`] keeps recently fetched tile payloads in memory so
//! repeated requests for the same tile skip the archive and the network.

mod raw;
mod stats;

pub use raw::RawTileCache;
pub use stats::CacheStats;
