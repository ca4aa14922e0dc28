//! Memory cache stage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::stage::{delegate, SourceStage};
use crate::cache::RawTileCache;
use crate::tile::{TileAddress, TileTask, TileTaskCallback};

/// Serves tiles from a [`RawTileCache`] and remembers whatever later stages
/// produce.
pub struct MemoryCacheStage {
    cache: Arc<RawTileCache>,
    /// Bumped by `clear`; results of loads started before a clear are not
    /// stored
    epoch: Arc<AtomicU64>,
    next: Option<Box<dyn SourceStage>>,
}

impl MemoryCacheStage {
    pub fn new(cache: Arc<RawTileCache>) -> Self {
        Self {
            cache,
            epoch: Arc::new(AtomicU64::new(0)),
            next: None,
        }
    }

    pub fn cache(&self) -> &Arc<RawTileCache> {
        &self.cache
    }
}

impl SourceStage for MemoryCacheStage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self, task: Arc<TileTask>, on_done: TileTaskCallback) -> bool {
        if let Some(data) = self.cache.get(task.address()) {
            trace!(tile = %task.address(), "Memory cache hit");
            task.set_payload(data);
            on_done(task);
            return true;
        }

        if self.next.is_none() || !self.cache.is_enabled() {
            return delegate(self.next(), task, on_done);
        }

        let cache = Arc::clone(&self.cache);
        let epoch = Arc::clone(&self.epoch);
        let started = epoch.load(Ordering::Acquire);
        let wrapped: TileTaskCallback = Box::new(move |task: Arc<TileTask>| {
            if epoch.load(Ordering::Acquire) == started {
                if let Some(data) = task.payload() {
                    cache.put(*task.address(), data);
                }
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

    fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cache.clear();
        if let Some(next) = self.next() {
            next.clear();
        }
    }

    fn holds(&self, address: &TileAddress) -> bool {
        self.cache.contains(address)
    }
}
