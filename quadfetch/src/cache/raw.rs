//! Bounded in-memory LRU cache of raw tile payloads.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use super::CacheStats;
use crate::tile::TileAddress;

struct Entry {
    data: Bytes,
    /// Access tick, also the entry's key in the recency index
    tick: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<TileAddress, Entry>,
    /// Recency index: oldest tick first
    order: BTreeMap<u64, TileAddress>,
    next_tick: u64,
    size_bytes: usize,
    stats: CacheStats,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn evict_to(&mut self, max_capacity: usize) -> u64 {
        let mut evicted = 0;
        while self.size_bytes > max_capacity {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.size_bytes -= entry.data.len();
                evicted += 1;
                trace!(tile = %key, bytes = entry.data.len(), "Evicted raw tile");
            }
        }
        evicted
    }
}

/// Thread-safe LRU cache mapping tile addresses to shared payloads.
///
/// Size accounting is the payload length in bytes. Entries handed out by
/// [`get`](Self::get) are reference counted, so eviction never invalidates
/// data a caller already holds.
///
/// Keys are stored in source space: two addresses that differ only in
/// display zoom share one entry.
pub struct RawTileCache {
    inner: Mutex<Inner>,
    max_capacity: usize,
}

impl RawTileCache {
    /// Create a cache holding at most `max_capacity` bytes.
    ///
    /// A capacity of zero disables the cache entirely.
    pub fn new(max_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_capacity,
        }
    }

    /// Whether the cache stores anything at all.
    pub fn is_enabled(&self) -> bool {
        self.max_capacity > 0
    }

    /// Look up a tile and mark it most recently used.
    pub fn get(&self, address: &TileAddress) -> Option<Bytes> {
        if !self.is_enabled() {
            return None;
        }
        let key = address.source_tile();
        let mut inner = self.inner.lock();
        let tick = inner.bump();

        let found = match inner.entries.get_mut(&key) {
            Some(entry) => {
                let old_tick = std::mem::replace(&mut entry.tick, tick);
                Some((old_tick, entry.data.clone()))
            }
            None => None,
        };

        match found {
            Some((old_tick, data)) => {
                inner.order.remove(&old_tick);
                inner.order.insert(tick, key);
                inner.stats.record_hit();
                trace!(tile = %key, "Raw cache hit");
                Some(data)
            }
            None => {
                inner.stats.record_miss();
                None
            }
        }
    }

    /// Check for a tile without touching its recency.
    pub fn contains(&self, address: &TileAddress) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.inner.lock().entries.contains_key(&address.source_tile())
    }

    /// Insert or replace a tile, then evict least recently used entries
    /// until the cache fits its capacity again.
    ///
    /// An entry larger than the whole cache is evicted immediately.
    pub fn put(&self, address: TileAddress, data: Bytes) {
        if !self.is_enabled() {
            return;
        }
        let key = address.source_tile();
        let len = data.len();
        let mut inner = self.inner.lock();
        let tick = inner.bump();

        if let Some(old) = inner.entries.insert(key, Entry { data, tick }) {
            inner.order.remove(&old.tick);
            inner.size_bytes -= old.data.len();
        }
        inner.order.insert(tick, key);
        inner.size_bytes += len;
        inner.stats.record_insertion();

        let evicted = inner.evict_to(self.max_capacity);
        inner.stats.record_evictions(evicted);
    }

    /// Remove every entry. Statistics counters are kept.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.size_bytes = 0;
    }

    /// Get the current number of entries in the cache.
    pub fn entry_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Get the current size of the cache in bytes.
    pub fn size_bytes(&self) -> usize {
        self.inner.lock().size_bytes
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size_bytes: inner.size_bytes,
            entry_count: inner.entries.len(),
            ..inner.stats.clone()
        }
    }
}

impl std::fmt::Debug for RawTileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawTileCache")
            .field("max_capacity", &self.max_capacity)
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}
