//! Persistent local tile storage.
//!
//! The archive stage of the source chain reads and writes tiles through the
//! [`TileArchive`] trait. [`DirectoryArchive`] is the bundled implementation:
//! one file per tile under a root directory.

mod directory;

pub use directory::{archive_path, ArchiveStats, DirectoryArchive};

use bytes::Bytes;
use thiserror::Error;

use crate::tile::TileAddress;

/// Archive errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Filesystem failure
    #[error("Archive I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The archive root is unusable
    #[error("Invalid archive root: {0}")]
    InvalidRoot(String),
}

impl ArchiveError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Random-access store of raw tiles keyed by source-space address.
///
/// Implementations are called synchronously from the consumer thread or a
/// fetch worker, so they should only perform local I/O.
pub trait TileArchive: Send + Sync {
    /// Read a tile. `Ok(None)` means the archive does not hold it.
    fn get(&self, address: &TileAddress) -> Result<Option<Bytes>, ArchiveError>;

    /// Store a tile, replacing any previous copy.
    fn put(&self, address: &TileAddress, data: &[u8]) -> Result<(), ArchiveError>;

    /// Whether the archive holds a tile, without reading it.
    fn contains(&self, address: &TileAddress) -> bool;
}
