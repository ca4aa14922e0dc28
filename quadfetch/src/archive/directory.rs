//! Directory-backed tile archive.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tracing::{debug, trace};

use super::{ArchiveError, TileArchive};
use crate::tile::TileAddress;

/// File extension of archived tiles.
const TILE_EXTENSION: &str = "tile";

/// Construct the archive path for a tile.
///
/// ```text
/// <root>/<z>/<x>/<y>.tile
/// ```
///
/// # Example
///
/// ```
/// use std::path::{Path, PathBuf};
/// use quadfetch::archive::archive_path;
/// use quadfetch::tile::TileAddress;
///
/// let path = archive_path(Path::new("/tiles"), &TileAddress::new(5279, 12754, 15));
/// assert_eq!(path, PathBuf::from("/tiles/15/5279/12754.tile"));
/// ```
pub fn archive_path(root: &Path, address: &TileAddress) -> PathBuf {
    root.join(address.z.to_string())
        .join(address.x.to_string())
        .join(format!("{}.{}", address.y, TILE_EXTENSION))
}

/// Summary of archive contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub tile_count: u64,
    pub total_bytes: u64,
}

/// Stores each tile as a file under a root directory.
///
/// Writes go to a temporary file in the target directory which is then
/// renamed over the final path, so readers never observe a partial tile.
#[derive(Debug)]
pub struct DirectoryArchive {
    root: PathBuf,
    write_serial: AtomicU64,
}

impl DirectoryArchive {
    /// Open an archive rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(ArchiveError::InvalidRoot(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        fs::create_dir_all(&root).map_err(|e| ArchiveError::io(&root, e))?;
        debug!(root = %root.display(), "Opened tile archive");

        Ok(Self {
            root,
            write_serial: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Count tiles and bytes by walking the directory tree.
    pub fn stats(&self) -> Result<ArchiveStats, ArchiveError> {
        let mut stats = ArchiveStats::default();
        Self::scan(&self.root, &mut stats)?;
        Ok(stats)
    }

    fn scan(dir: &Path, stats: &mut ArchiveStats) -> Result<(), ArchiveError> {
        let entries = fs::read_dir(dir).map_err(|e| ArchiveError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::io(dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                Self::scan(&path, stats)?;
            } else if path.extension().and_then(|s| s.to_str()) == Some(TILE_EXTENSION) {
                if let Ok(metadata) = entry.metadata() {
                    stats.tile_count += 1;
                    stats.total_bytes += metadata.len();
                }
            }
        }
        Ok(())
    }

    /// Delete every archived tile. Returns what was removed.
    pub fn clear(&self) -> Result<ArchiveStats, ArchiveError> {
        let removed = self.stats()?;
        let entries = fs::read_dir(&self.root).map_err(|e| ArchiveError::io(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::io(&self.root, e))?;
            let path = entry.path();
            // Only zoom directories belong to the archive
            let is_zoom_dir = path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.parse::<u8>().is_ok());
            if is_zoom_dir {
                fs::remove_dir_all(&path).map_err(|e| ArchiveError::io(&path, e))?;
            }
        }
        debug!(
            tiles = removed.tile_count,
            bytes = removed.total_bytes,
            "Cleared tile archive"
        );
        Ok(removed)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "tile path has no parent"))?;
        fs::create_dir_all(parent)?;

        let serial = self.write_serial.fetch_add(1, Ordering::Relaxed);
        let temp = parent.join(format!(
            ".{}.{}.{}.tmp",
            path.file_stem().and_then(|s| s.to_str()).unwrap_or("tile"),
            std::process::id(),
            serial
        ));

        let result = (|| {
            let mut file = fs::File::create(&temp)?;
            file.write_all(data)?;
            file.sync_all()?;
            fs::rename(&temp, path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result
    }
}

impl TileArchive for DirectoryArchive {
    fn get(&self, address: &TileAddress) -> Result<Option<Bytes>, ArchiveError> {
        let path = archive_path(&self.root, address);
        match fs::read(&path) {
            Ok(data) => {
                trace!(tile = %address, bytes = data.len(), "Archive hit");
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArchiveError::io(&path, e)),
        }
    }

    fn put(&self, address: &TileAddress, data: &[u8]) -> Result<(), ArchiveError> {
        let path = archive_path(&self.root, address);
        self.write_atomic(&path, data)
            .map_err(|e| ArchiveError::io(&path, e))?;
        trace!(tile = %address, bytes = data.len(), "Archived tile");
        Ok(())
    }

    fn contains(&self, address: &TileAddress) -> bool {
        archive_path(&self.root, address).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_archive_path() {
        let path = archive_path(Path::new("/tiles"), &TileAddress::new(3, 5, 4));
        assert_eq!(path, PathBuf::from("/tiles/4/3/5.tile"));
    }

    #[test]
    fn test_put_and_get() {
        let dir = TempDir::new().unwrap();
        let archive = DirectoryArchive::open(dir.path()).unwrap();
        let address = TileAddress::new(1, 2, 3);

        assert_eq!(archive.get(&address).unwrap(), None);
        assert!(!archive.contains(&address));

        archive.put(&address, b"tile bytes").unwrap();
        assert!(archive.contains(&address));
        assert_eq!(
            archive.get(&address).unwrap(),
            Some(Bytes::from_static(b"tile bytes"))
        );
    }

    #[test]
    fn test_put_replaces() {
        let dir = TempDir::new().unwrap();
        let archive = DirectoryArchive::open(dir.path()).unwrap();
        let address = TileAddress::new(1, 2, 3);

        archive.put(&address, b"old").unwrap();
        archive.put(&address, b"new").unwrap();
        assert_eq!(archive.get(&address).unwrap().unwrap(), Bytes::from_static(b"new"));
    }

    #[test]
    fn test_put_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let archive = DirectoryArchive::open(dir.path()).unwrap();
        archive.put(&TileAddress::new(0, 0, 1), b"x").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path().join("1/0"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["0.tile".to_string()]);
    }

    #[test]
    fn test_stats_and_clear() {
        let dir = TempDir::new().unwrap();
        let archive = DirectoryArchive::open(dir.path()).unwrap();
        archive.put(&TileAddress::new(0, 0, 1), b"abc").unwrap();
        archive.put(&TileAddress::new(1, 0, 1), b"defg").unwrap();
        archive.put(&TileAddress::new(2, 3, 2), b"h").unwrap();
        fs::write(dir.path().join("README"), b"keep me").unwrap();

        let stats = archive.stats().unwrap();
        assert_eq!(stats.tile_count, 3);
        assert_eq!(stats.total_bytes, 8);

        let removed = archive.clear().unwrap();
        assert_eq!(removed, stats);
        assert_eq!(archive.stats().unwrap(), ArchiveStats::default());
        assert!(dir.path().join("README").exists());
    }

    #[test]
    fn test_open_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            DirectoryArchive::open(&file),
            Err(ArchiveError::InvalidRoot(_))
        ));
    }
}
