//! Network stage: the terminal stage that fetches tiles over HTTP.
//!
//! Concurrent requests for one tile share a single transfer:
//!
//! ```text
//! task A ─┐
//! task B ─┼──► pending[tile] ──► FetchWorkerPool ──► one HTTP GET
//! task C ─┘         │                                    │
//!                   ▼                                    ▼
//!            [A, B, C waiters] ◄──────────────── completion
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::stage::SourceStage;
use super::url::UrlTemplate;
use crate::fetch::{FetchOutcome, FetchWorkerPool, RequestId};
use crate::tile::{TileAddress, TileTask, TileTaskCallback};

/// Default bound on distinct tiles being fetched at once.
pub const DEFAULT_MAX_PENDING: usize = 64;

struct Waiter {
    task: Arc<TileTask>,
    on_done: TileTaskCallback,
}

type Waiters = Arc<Mutex<Vec<Waiter>>>;

struct Pending {
    request_id: RequestId,
    waiters: Waiters,
}

/// Network fetch statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Load requests accepted
    pub requests: u64,
    /// Requests that joined a transfer already under way
    pub coalesced: u64,
    /// Transfers started
    pub fetches: u64,
    /// Transfers that returned no data
    pub failures: u64,
    /// Requests refused because too many tiles were pending
    pub rejected: u64,
}

/// Fetches tiles through a [`FetchWorkerPool`], one transfer per tile.
pub struct NetworkStage {
    pool: Arc<FetchWorkerPool>,
    url_template: UrlTemplate,
    pending: Arc<DashMap<TileAddress, Pending>>,
    max_pending: usize,
    requests: AtomicU64,
    coalesced: AtomicU64,
    fetches: AtomicU64,
    failures: Arc<AtomicU64>,
    rejected: AtomicU64,
}

impl NetworkStage {
    pub fn new(pool: Arc<FetchWorkerPool>, url_template: UrlTemplate) -> Self {
        Self {
            pool,
            url_template,
            pending: Arc::new(DashMap::new()),
            max_pending: DEFAULT_MAX_PENDING,
            requests: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            failures: Arc::new(AtomicU64::new(0)),
            rejected: AtomicU64::new(0),
        }
    }

    /// Bound the number of distinct tiles fetched at once. Zero means no
    /// bound.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn url_template(&self) -> &UrlTemplate {
        &self.url_template
    }

    /// Number of distinct tiles with a transfer under way.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            requests: self.requests.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    fn complete(
        pending: &DashMap<TileAddress, Pending>,
        request_id: RequestId,
        waiters: &Waiters,
        outcome: FetchOutcome,
        failures: &AtomicU64,
    ) {
        // A clear or cancel may already have detached this transfer
        pending.remove_if(&outcome.address, |_, entry| entry.request_id == request_id);
        let waiters = std::mem::take(&mut *waiters.lock());

        if !outcome.has_content() && !outcome.canceled {
            failures.fetch_add(1, Ordering::Relaxed);
            debug!(tile = %outcome.address, status = outcome.status, "Tile fetch returned no data");
        }
        trace!(tile = %outcome.address, waiters = waiters.len(), "Tile fetch complete");

        for waiter in waiters {
            if outcome.has_content() {
                waiter.task.set_payload(outcome.content.clone());
            }
            (waiter.on_done)(waiter.task);
        }
    }
}

impl SourceStage for NetworkStage {
    fn name(&self) -> &'static str {
        "network"
    }

    fn load(&self, task: Arc<TileTask>, on_done: TileTaskCallback) -> bool {
        let key = task.address().source_tile();

        if self.max_pending > 0
            && self.pending.len() >= self.max_pending
            && !self.pending.contains_key(&key)
        {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            trace!(tile = %key, pending = self.pending.len(), "Too many pending fetches");
            return false;
        }

        let (request_id, waiters) = match self.pending.entry(key) {
            Entry::Occupied(entry) => {
                entry.get().waiters.lock().push(Waiter { task, on_done });
                self.requests.fetch_add(1, Ordering::Relaxed);
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                trace!(tile = %key, "Joined pending fetch");
                return true;
            }
            Entry::Vacant(entry) => {
                let request_id = self.pool.reserve_id();
                let waiters: Waiters = Arc::new(Mutex::new(vec![Waiter { task, on_done }]));
                entry.insert(Pending {
                    request_id,
                    waiters: Arc::clone(&waiters),
                });
                (request_id, waiters)
            }
        };

        let url = self.url_template.build(&key);
        let pending = Arc::clone(&self.pending);
        let failures = Arc::clone(&self.failures);
        let completion_waiters = Arc::clone(&waiters);
        let callback = Box::new(move |outcome: FetchOutcome| {
            Self::complete(&pending, request_id, &completion_waiters, outcome, &failures);
        });

        if !self.pool.enqueue_as(request_id, key, url, callback) {
            warn!(tile = %key, "Fetch pool is shut down, dropping request");
            self.pending
                .remove_if(&key, |_, entry| entry.request_id == request_id);
            // Tasks that joined meanwhile are not retried until the source
            // generation changes
            for waiter in std::mem::take(&mut *waiters.lock()) {
                waiter.task.cancel();
            }
            return false;
        }

        self.requests.fetch_add(1, Ordering::Relaxed);
        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(tile = %key, "Started tile fetch");
        true
    }

    fn set_next(&mut self, next: Box<dyn SourceStage>) {
        warn!(stage = next.name(), "Network stage must be last, ignoring next stage");
    }

    fn next(&self) -> Option<&dyn SourceStage> {
        None
    }

    /// Complete canceled waiters without data; abort this stage's transfer
    /// when none remain.
    fn cancel(&self, address: &TileAddress) {
        let key = address.source_tile();
        let mut canceled = Vec::new();
        // Pruning and removal happen under the entry's shard lock, so a load
        // joining the transfer either lands before the prune or finds no
        // entry and starts a new transfer
        let removed = self.pending.remove_if(&key, |_, entry| {
            let mut waiters = entry.waiters.lock();
            let (gone, live): (Vec<Waiter>, Vec<Waiter>) = std::mem::take(&mut *waiters)
                .into_iter()
                .partition(|waiter| waiter.task.is_canceled());
            *waiters = live;
            canceled = gone;
            waiters.is_empty()
        });

        if let Some((_, entry)) = removed {
            self.pool.cancel_request(entry.request_id, &key);
            debug!(tile = %key, "Canceled tile fetch");
        }
        for waiter in canceled {
            (waiter.on_done)(waiter.task);
        }
    }

    /// Detach every pending transfer so new requests fetch afresh. Detached
    /// transfers still complete their waiters.
    fn clear(&self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{gated_factory, Gate};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        gate: Gate,
        calls: Arc<AtomicUsize>,
        stage: NetworkStage,
    }

    fn harness(workers: usize) -> Harness {
        let gate = Gate::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(FetchWorkerPool::new(workers, gated_factory(&gate, &calls)).unwrap());
        let template = UrlTemplate::new("http://t/{z}/{x}/{y}").unwrap();
        Harness {
            gate,
            calls,
            stage: NetworkStage::new(pool, template),
        }
    }

    fn task(address: TileAddress) -> Arc<TileTask> {
        Arc::new(TileTask::new(address, 0, None, Vec::new()))
    }

    fn sender(tx: &mpsc::Sender<Arc<TileTask>>) -> TileTaskCallback {
        let tx = tx.clone();
        Box::new(move |task| {
            let _ = tx.send(task);
        })
    }

    #[test]
    fn test_fetch_attaches_payload() {
        let h = harness(1);
        h.gate.open();
        let (tx, rx) = mpsc::channel();

        assert!(h.stage.load(task(TileAddress::new(1, 2, 3)), sender(&tx)));
        let done = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(done.payload().unwrap(), "http://t/3/1/2".as_bytes());
    }

    #[test]
    fn test_concurrent_requests_share_one_fetch() {
        let h = harness(2);
        let (tx, rx) = mpsc::channel();
        let address = TileAddress::new(1, 2, 3);

        for _ in 0..5 {
            assert!(h.stage.load(task(address), sender(&tx)));
        }
        assert_eq!(h.stage.pending_count(), 1);
        h.gate.open();

        for _ in 0..5 {
            let done = rx.recv_timeout(WAIT).unwrap();
            assert!(done.has_data());
        }
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        let stats = h.stage.stats();
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.coalesced, 4);
        assert_eq!(h.stage.pending_count(), 0);
    }

    #[test]
    fn test_display_zoom_variants_share_fetch() {
        let h = harness(1);
        let (tx, rx) = mpsc::channel();
        h.stage.load(task(TileAddress::new(2, 1, 4)), sender(&tx));
        h.stage
            .load(task(TileAddress::with_scaled_zoom(2, 1, 4, 6)), sender(&tx));
        h.gate.open();

        rx.recv_timeout(WAIT).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_fetch_completes_without_data() {
        let gate = Gate::default();
        gate.open();
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(FetchWorkerPool::new(1, gated_factory(&gate, &calls)).unwrap());
        let stage = NetworkStage::new(pool, UrlTemplate::new("http://t/missing/{z}/{x}/{y}").unwrap());
        let (tx, rx) = mpsc::channel();

        stage.load(task(TileAddress::new(0, 0, 1)), sender(&tx));
        let done = rx.recv_timeout(WAIT).unwrap();
        assert!(!done.has_data());
        assert_eq!(stage.stats().failures, 1);
    }

    #[test]
    fn test_max_pending_rejects_new_tiles() {
        let h = harness(1);
        let stage = h.stage.with_max_pending(1);
        let (tx, rx) = mpsc::channel();

        assert!(stage.load(task(TileAddress::new(0, 0, 1)), sender(&tx)));
        assert!(!stage.load(task(TileAddress::new(1, 0, 1)), sender(&tx)));
        // Joining an existing transfer is still allowed
        assert!(stage.load(task(TileAddress::new(0, 0, 1)), sender(&tx)));
        assert_eq!(stage.stats().rejected, 1);

        h.gate.open();
        rx.recv_timeout(WAIT).unwrap();
        rx.recv_timeout(WAIT).unwrap();
    }

    #[test]
    fn test_cancel_last_waiter_cancels_fetch() {
        let h = harness(1);
        let (tx, rx) = mpsc::channel();
        let address = TileAddress::new(1, 1, 1);
        let queued = TileAddress::new(0, 0, 1);

        // Occupy the single worker so the second tile stays queued
        h.stage.load(task(address), sender(&tx));
        let canceled = task(queued);
        h.stage.load(Arc::clone(&canceled), sender(&tx));

        canceled.cancel();
        h.stage.cancel(&queued);
        assert_eq!(h.stage.pending_count(), 1);

        // The canceled waiter is completed right away, without data
        let dropped = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(*dropped.address(), queued);
        assert!(dropped.is_canceled());
        assert!(!dropped.has_data());
        h.gate.open();

        let done = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(*done.address(), address);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_keeps_live_waiters() {
        let h = harness(1);
        let (tx, rx) = mpsc::channel();
        let address = TileAddress::new(1, 1, 1);

        let canceled = task(address);
        h.stage.load(Arc::clone(&canceled), sender(&tx));
        h.stage.load(task(address), sender(&tx));

        canceled.cancel();
        h.stage.cancel(&address);
        assert_eq!(h.stage.pending_count(), 1);
        let dropped = rx.recv_timeout(WAIT).unwrap();
        assert!(dropped.is_canceled());
        assert!(!dropped.has_data());
        h.gate.open();

        let done = rx.recv_timeout(WAIT).unwrap();
        assert!(!done.is_canceled());
        assert!(done.has_data());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_clear_detaches_pending_transfers() {
        let h = harness(2);
        let (tx, rx) = mpsc::channel();
        let address = TileAddress::new(1, 1, 1);

        h.stage.load(task(address), sender(&tx));
        h.stage.clear();
        h.stage.load(task(address), sender(&tx));
        h.gate.open();

        rx.recv_timeout(WAIT).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancel_spares_other_stage_on_shared_pool() {
        let gate = Gate::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(FetchWorkerPool::new(1, gated_factory(&gate, &calls)).unwrap());
        let vector = NetworkStage::new(Arc::clone(&pool), UrlTemplate::new("http://v/{z}/{x}/{y}").unwrap());
        let raster = NetworkStage::new(Arc::clone(&pool), UrlTemplate::new("http://r/{z}/{x}/{y}").unwrap());
        let (tx, rx) = mpsc::channel();
        let busy = TileAddress::new(0, 0, 1);
        let shared = TileAddress::new(1, 1, 2);

        vector.load(task(busy), sender(&tx));
        let vector_task = task(shared);
        let raster_task = task(shared);
        vector.load(Arc::clone(&vector_task), sender(&tx));
        raster.load(Arc::clone(&raster_task), sender(&tx));

        raster_task.cancel();
        raster.cancel(&shared);
        assert_eq!(raster.pending_count(), 0);
        assert_eq!(vector.pending_count(), 2);
        assert!(rx.recv_timeout(WAIT).unwrap().is_canceled());
        gate.open();

        let mut loaded = vec![rx.recv_timeout(WAIT).unwrap(), rx.recv_timeout(WAIT).unwrap()];
        loaded.sort_by_key(|done| done.address().z);
        assert_eq!(*loaded[0].address(), busy);
        assert!(Arc::ptr_eq(&loaded[1], &vector_task));
        assert_eq!(&loaded[1].payload().unwrap()[..], b"http://v/2/1/1");
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
