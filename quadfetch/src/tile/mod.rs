//! Tile addressing, tasks and the consumer-facing tile source.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use quadfetch::cache::RawTileCache;
//! use quadfetch::source::{MemoryCacheStage, SourceChain, SourceStage};
//! use quadfetch::tile::{TileAddress, TileSource, ZoomOptions};
//!
//! let cache = Arc::new(RawTileCache::new(16 * 1024 * 1024));
//! let stages: Vec<Box<dyn SourceStage>> = vec![Box::new(MemoryCacheStage::new(cache))];
//! let source = TileSource::new("osm", SourceChain::new(stages), ZoomOptions::default());
//!
//! let task = source.create_task(TileAddress::new(19295, 24641, 16));
//! source.load_tile_data(&task, Box::new(|task| {
//!     // Runs once the chain has answered; an empty memory cache has nothing
//!     assert!(!task.has_data());
//! }));
//! ```

mod address;
mod parser;
mod source;
mod task;

pub use address::{zoom_bias_from_tile_size, Ancestors, TileAddress, BASE_TILE_SIZE, MAX_ZOOM};
pub use parser::{ParseError, ParsedContent, RawParser, TileFormat, TileParser};
pub use source::{ParsedTileData, TileSource, ZoomOptions, DEFAULT_MAX_SOURCE_ZOOM};
pub use task::{TaskState, TileTask, TileTaskCallback};
