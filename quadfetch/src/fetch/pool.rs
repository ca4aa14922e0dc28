//! Fixed-size pool of blocking fetch workers.
//!
//! Requests are served in FIFO order. Each worker thread owns exactly one
//! [`HttpClient`] built by the pool's [`ClientFactory`] and reuses it for
//! every transfer it performs, so connection state never crosses threads.
//!
//! ```text
//!  enqueue ──► [ FIFO queue ] ──► worker 0 ── client 0 ──► callback
//!                   │        └──► worker 1 ── client 1 ──► callback
//!                   ▼
//!         cancel(): queued items dropped,
//!                   in-flight items flagged
//! ```
//!
//! Every request carries a [`RequestId`] issued by the pool. Stages sharing
//! one pool cancel their own requests by id with
//! [`cancel_request`](FetchWorkerPool::cancel_request), which leaves other
//! requests for the same tile alone.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace};

use super::http::{ClientFactory, FetchError, HttpResponse};
use crate::tile::TileAddress;

/// Identifies one enqueued request. Unique within a pool.
pub type RequestId = u64;

/// Completion callback for one fetch request.
pub type FetchCallback = Box<dyn FnOnce(FetchOutcome) + Send>;

/// Result delivered to a [`FetchCallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub address: TileAddress,
    /// HTTP status of the transfer, 0 for transport failures
    pub status: u16,
    /// Response body. Empty on failure and when the request was canceled.
    pub content: Bytes,
    /// The request was canceled while the transfer was running
    pub canceled: bool,
}

impl FetchOutcome {
    /// Whether the fetch produced usable tile bytes.
    pub fn has_content(&self) -> bool {
        !self.canceled && self.status == 200 && !self.content.is_empty()
    }
}

struct FetchRequest {
    id: RequestId,
    address: TileAddress,
    url: String,
    callback: FetchCallback,
}

struct InFlight {
    id: RequestId,
    address: TileAddress,
    canceled: bool,
}

struct PoolState {
    queue: VecDeque<FetchRequest>,
    /// One slot per worker
    in_flight: Vec<Option<InFlight>>,
    shutdown: bool,
}

impl PoolState {
    /// Drop queued requests and flag in-flight ones matching `select`.
    fn cancel_where(
        &mut self,
        select: impl Fn(RequestId, &TileAddress) -> bool,
    ) -> (Vec<FetchRequest>, usize) {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.queue.len());
        for request in self.queue.drain(..) {
            if select(request.id, &request.address) {
                removed.push(request);
            } else {
                kept.push_back(request);
            }
        }
        self.queue = kept;

        let mut flagged = 0;
        for flight in self.in_flight.iter_mut().flatten() {
            if select(flight.id, &flight.address) && !flight.canceled {
                flight.canceled = true;
                flagged += 1;
            }
        }
        (removed, flagged)
    }
}

struct Shared {
    state: Mutex<PoolState>,
    available: Condvar,
}

/// Bounded set of worker threads performing blocking HTTP fetches.
pub struct FetchWorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    next_id: AtomicU64,
}

impl FetchWorkerPool {
    /// Start `worker_count` workers, each with a client built by `factory`.
    ///
    /// A count of zero is raised to one.
    pub fn new(worker_count: usize, factory: ClientFactory) -> Result<Self, FetchError> {
        let worker_count = worker_count.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                in_flight: (0..worker_count).map(|_| None).collect(),
                shutdown: false,
            }),
            available: Condvar::new(),
        });
        let factory = Arc::new(factory);

        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let worker_shared = Arc::clone(&shared);
            let factory = Arc::clone(&factory);
            let spawned = thread::Builder::new()
                .name(format!("fetch-worker-{}", id))
                .spawn(move || Self::worker_loop(id, worker_shared, factory));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Stop the workers that did start before reporting
                    let pool = Self {
                        shared,
                        workers: Mutex::new(handles),
                        worker_count,
                        next_id: AtomicU64::new(0),
                    };
                    pool.shutdown();
                    return Err(FetchError::Spawn(e));
                }
            }
        }

        info!(workers = worker_count, "Fetch worker pool started");

        Ok(Self {
            shared,
            workers: Mutex::new(handles),
            worker_count,
            next_id: AtomicU64::new(0),
        })
    }

    fn worker_loop(id: usize, shared: Arc<Shared>, factory: Arc<ClientFactory>) {
        let mut client = factory();

        loop {
            let request = {
                let mut state = shared.state.lock();
                loop {
                    if state.shutdown {
                        trace!(worker = id, "Fetch worker exiting");
                        return;
                    }
                    if let Some(request) = state.queue.pop_front() {
                        state.in_flight[id] = Some(InFlight {
                            id: request.id,
                            address: request.address,
                            canceled: false,
                        });
                        break request;
                    }
                    shared.available.wait(&mut state);
                }
            };

            trace!(worker = id, tile = %request.address, url = %request.url, "Fetching tile");
            let response = client.fetch(&request.url);

            let canceled = shared.state.lock().in_flight[id]
                .take()
                .is_some_and(|flight| flight.canceled);

            let outcome = if canceled {
                debug!(tile = %request.address, "Fetch canceled in flight");
                FetchOutcome {
                    address: request.address,
                    status: response.status,
                    content: Bytes::new(),
                    canceled: true,
                }
            } else {
                let HttpResponse { status, content } = response;
                let content = if status == 200 { content } else { Bytes::new() };
                FetchOutcome {
                    address: request.address,
                    status,
                    content,
                    canceled: false,
                }
            };

            (request.callback)(outcome);
        }
    }

    /// Issue an id for a request about to be submitted with
    /// [`enqueue_as`](Self::enqueue_as).
    pub fn reserve_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue a fetch of `url` for `address`.
    ///
    /// Returns false once the pool has shut down; the callback is then
    /// dropped without being called.
    pub fn enqueue(&self, address: TileAddress, url: String, callback: FetchCallback) -> bool {
        self.enqueue_as(self.reserve_id(), address, url, callback)
    }

    /// [`enqueue`](Self::enqueue) under an id from
    /// [`reserve_id`](Self::reserve_id).
    pub fn enqueue_as(
        &self,
        id: RequestId,
        address: TileAddress,
        url: String,
        callback: FetchCallback,
    ) -> bool {
        let request = FetchRequest {
            id,
            address,
            url,
            callback,
        };
        let rejected = {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                Some(request)
            } else {
                state.queue.push_back(request);
                None
            }
        };
        match rejected {
            Some(_) => false,
            None => {
                self.shared.available.notify_one();
                true
            }
        }
    }

    /// Cancel every request for `address`.
    ///
    /// Queued requests are removed and their callbacks never fire. Requests
    /// already being transferred complete with empty content. Returns
    /// whether any request matched.
    pub fn cancel(&self, address: &TileAddress) -> bool {
        let (removed, flagged) = self
            .shared
            .state
            .lock()
            .cancel_where(|_, queued| queued == address);
        Self::report_cancel(address, removed, flagged)
    }

    /// Cancel the single request `id`, with the same queued/in-flight
    /// behavior as [`cancel`](Self::cancel).
    pub fn cancel_request(&self, id: RequestId, address: &TileAddress) -> bool {
        let (removed, flagged) = self
            .shared
            .state
            .lock()
            .cancel_where(|queued, _| queued == id);
        Self::report_cancel(address, removed, flagged)
    }

    fn report_cancel(address: &TileAddress, removed: Vec<FetchRequest>, flagged: usize) -> bool {
        let matched = !removed.is_empty() || flagged > 0;
        if matched {
            debug!(
                tile = %address,
                queued = removed.len(),
                in_flight = flagged,
                "Canceled fetch"
            );
        }
        // Callbacks may own resources whose drop re-enters the pool, so
        // they are dropped after the state lock is released
        drop(removed);
        matched
    }

    /// Stop accepting work and join the workers.
    ///
    /// Queued requests are dropped without callbacks; a request already in
    /// flight finishes and reports normally. Safe to call more than once and
    /// from a worker thread, which is then left to exit on its own.
    pub fn shutdown(&self) {
        let drained: Vec<FetchRequest> = {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.queue.drain(..).collect()
        };
        self.shared.available.notify_all();
        drop(drained);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        if handles.is_empty() {
            return;
        }

        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!("Fetch worker panicked");
            }
        }
        info!("Fetch worker pool stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Number of requests waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Number of transfers currently running.
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight.iter().flatten().count()
    }
}

impl Drop for FetchWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
