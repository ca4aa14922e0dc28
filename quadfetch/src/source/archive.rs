//! Archive stage: local persistent storage in the source chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::stage::{delegate, SourceStage};
use crate::archive::TileArchive;
use crate::tile::{TileAddress, TileTask, TileTaskCallback};

/// When the archive is consulted relative to the stages after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveMode {
    /// Look in the archive first and only go further on a miss.
    #[default]
    Cache,
    /// Go to the next stage first and fall back to the archive when it
    /// produced nothing, e.g. while the network is unreachable.
    OfflineFallback,
}

/// Reads tiles from a [`TileArchive`] and optionally writes back what later
/// stages produce.
pub struct ArchiveStage {
    archive: Arc<dyn TileArchive>,
    mode: ArchiveMode,
    write_back: bool,
    epoch: Arc<AtomicU64>,
    next: Option<Box<dyn SourceStage>>,
}

impl ArchiveStage {
    pub fn new(archive: Arc<dyn TileArchive>) -> Self {
        Self {
            archive,
            mode: ArchiveMode::default(),
            write_back: false,
            epoch: Arc::new(AtomicU64::new(0)),
            next: None,
        }
    }

    pub fn with_mode(mut self, mode: ArchiveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Store tiles produced by later stages in the archive.
    pub fn with_write_back(mut self, write_back: bool) -> Self {
        self.write_back = write_back;
        self
    }

    pub fn mode(&self) -> ArchiveMode {
        self.mode
    }

    fn read(archive: &dyn TileArchive, address: &TileAddress) -> Option<Bytes> {
        match archive.get(&address.source_tile()) {
            Ok(found) => found.filter(|data| !data.is_empty()),
            Err(e) => {
                warn!(tile = %address, error = %e, "Archive read failed");
                None
            }
        }
    }

    fn write(archive: &dyn TileArchive, address: &TileAddress, data: &[u8]) {
        if let Err(e) = archive.put(&address.source_tile(), data) {
            warn!(tile = %address, error = %e, "Archive write failed");
        }
    }
}

impl SourceStage for ArchiveStage {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn load(&self, task: Arc<TileTask>, on_done: TileTaskCallback) -> bool {
        if self.mode == ArchiveMode::Cache {
            if let Some(data) = Self::read(self.archive.as_ref(), task.address()) {
                debug!(tile = %task.address(), "Loaded tile from archive");
                task.set_payload(data);
                on_done(task);
                return true;
            }
            if !self.write_back || self.next.is_none() {
                return delegate(self.next(), task, on_done);
            }
        }

        let archive = Arc::clone(&self.archive);
        let epoch = Arc::clone(&self.epoch);
        let started = epoch.load(Ordering::Acquire);
        let mode = self.mode;
        let write_back = self.write_back;

        let wrapped: TileTaskCallback = Box::new(move |task: Arc<TileTask>| {
            match task.payload() {
                Some(data) => {
                    if write_back && epoch.load(Ordering::Acquire) == started {
                        Self::write(archive.as_ref(), task.address(), &data);
                    }
                }
                None if mode == ArchiveMode::OfflineFallback && !task.is_canceled() => {
                    if let Some(data) = Self::read(archive.as_ref(), task.address()) {
                        debug!(tile = %task.address(), "Serving archived tile after fetch failure");
                        task.set_payload(data);
                    }
                }
                None => {}
            }
            on_done(task);
        });
        delegate(self.next(), task, wrapped)
    }

    fn set_next(&mut self, next: Box<dyn SourceStage>) {
        self.next = Some(next);
    }

    fn next(&self) -> Option<&dyn SourceStage> {
        self.next.as_deref()
    }

    /// Bumps the write-back epoch and forwards. Archived tiles are
    /// persistent and survive a clear.
    fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(next) = self.next() {
            next.clear();
        }
    }

    fn holds(&self, address: &TileAddress) -> bool {
        self.archive.contains(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveError, DirectoryArchive};
    use crate::source::stage::tests::FixedStage;
    use crate::source::SourceChain;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    fn task(address: TileAddress) -> Arc<TileTask> {
        Arc::new(TileTask::new(address, 0, None, Vec::new()))
    }

    fn load(chain: &SourceChain, address: TileAddress) -> Option<Bytes> {
        let result = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&result);
        chain.load(
            task(address),
            Box::new(move |task| *sink.lock() = Some(task.payload())),
        );
        let out = result.lock().take().expect("callback fired synchronously");
        out
    }

    struct BrokenArchive;

    impl TileArchive for BrokenArchive {
        fn get(&self, _address: &TileAddress) -> Result<Option<Bytes>, ArchiveError> {
            Err(ArchiveError::InvalidRoot("broken".into()))
        }
        fn put(&self, _address: &TileAddress, _data: &[u8]) -> Result<(), ArchiveError> {
            Err(ArchiveError::InvalidRoot("broken".into()))
        }
        fn contains(&self, _address: &TileAddress) -> bool {
            false
        }
    }

    #[test]
    fn test_archive_hit_skips_next_stage() {
        let dir = TempDir::new().unwrap();
        let archive = Arc::new(DirectoryArchive::open(dir.path()).unwrap());
        let address = TileAddress::new(3, 2, 4);
        archive.put(&address, b"archived").unwrap();

        let network = FixedStage::new("network", &[address]);
        let loads = Arc::clone(&network.loads);
        let chain = SourceChain::new(vec![
            Box::new(ArchiveStage::new(archive)),
            Box::new(network),
        ]);

        assert_eq!(load(&chain, address), Some(Bytes::from_static(b"archived")));
        assert!(loads.lock().is_empty());
    }

    #[test]
    fn test_write_back_stores_network_result() {
        let dir = TempDir::new().unwrap();
        let archive = Arc::new(DirectoryArchive::open(dir.path()).unwrap());
        let address = TileAddress::new(3, 2, 4);
        let chain = SourceChain::new(vec![
            Box::new(ArchiveStage::new(archive.clone()).with_write_back(true)),
            Box::new(FixedStage::new("network", &[address])),
        ]);

        assert_eq!(load(&chain, address), Some(Bytes::from_static(b"network")));
        assert_eq!(
            archive.get(&address).unwrap(),
            Some(Bytes::from_static(b"network"))
        );
    }

    #[test]
    fn test_no_write_back_by_default() {
        let dir = TempDir::new().unwrap();
        let archive = Arc::new(DirectoryArchive::open(dir.path()).unwrap());
        let address = TileAddress::new(3, 2, 4);
        let chain = SourceChain::new(vec![
            Box::new(ArchiveStage::new(archive.clone())),
            Box::new(FixedStage::new("network", &[address])),
        ]);

        load(&chain, address);
        assert!(!archive.contains(&address));
    }

    #[test]
    fn test_offline_fallback_prefers_next_stage() {
        let dir = TempDir::new().unwrap();
        let archive = Arc::new(DirectoryArchive::open(dir.path()).unwrap());
        let online = TileAddress::new(1, 1, 3);
        let offline = TileAddress::new(2, 2, 3);
        archive.put(&online, b"archived").unwrap();
        archive.put(&offline, b"archived").unwrap();

        let chain = SourceChain::new(vec![
            Box::new(ArchiveStage::new(archive).with_mode(ArchiveMode::OfflineFallback)),
            Box::new(FixedStage::new("network", &[online])),
        ]);

        assert_eq!(load(&chain, online), Some(Bytes::from_static(b"network")));
        assert_eq!(load(&chain, offline), Some(Bytes::from_static(b"archived")));
    }

    #[test]
    fn test_read_error_is_a_miss() {
        let address = TileAddress::new(3, 2, 4);
        let chain = SourceChain::new(vec![
            Box::new(ArchiveStage::new(Arc::new(BrokenArchive)).with_write_back(true)),
            Box::new(FixedStage::new("network", &[address])),
        ]);
        assert_eq!(load(&chain, address), Some(Bytes::from_static(b"network")));
    }

    #[test]
    fn test_clear_keeps_archived_tiles() {
        let dir = TempDir::new().unwrap();
        let archive = Arc::new(DirectoryArchive::open(dir.path()).unwrap());
        let address = TileAddress::new(3, 2, 4);
        archive.put(&address, b"archived").unwrap();
        let chain = SourceChain::new(vec![Box::new(ArchiveStage::new(archive))]);

        chain.clear();
        assert_eq!(chain.best_available(&address), Some(address));
    }
}
