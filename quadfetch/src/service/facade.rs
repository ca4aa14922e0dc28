//! Blocking facade over a fully wired tile pipeline.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::builder;
use super::error::ServiceError;
use crate::archive::DirectoryArchive;
use crate::cache::{CacheStats, RawTileCache};
use crate::config::ConfigFile;
use crate::fetch::{ClientFactory, FetchWorkerPool};
use crate::tile::{ParsedTileData, RawParser, TaskState, TileAddress, TileSource, TileTask};

/// How a requested tile ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Data was found and parsed
    Loaded,
    /// No stage had the tile
    NotFound,
    /// Bytes arrived but the parser rejected them
    Invalid,
    /// The pipeline was saturated or shut down
    Refused,
    /// No answer before the deadline; the load was canceled
    TimedOut,
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FetchStatus::Loaded => "loaded",
            FetchStatus::NotFound => "not found",
            FetchStatus::Invalid => "invalid",
            FetchStatus::Refused => "refused",
            FetchStatus::TimedOut => "timed out",
        })
    }
}

/// Result for one requested tile.
#[derive(Clone)]
pub struct TileOutcome {
    /// Address as requested
    pub requested: TileAddress,
    /// Address actually loaded after zoom bias and overzoom clamping
    pub loaded: TileAddress,
    pub status: FetchStatus,
    pub data: Option<Arc<ParsedTileData>>,
}

impl TileOutcome {
    /// Raw payload bytes, when the tile loaded.
    pub fn payload(&self) -> Option<&Bytes> {
        self.data.as_ref().and_then(|data| data.content_as::<Bytes>())
    }
}

/// A tile source with its memory cache, archive and fetch pool.
///
/// # Example
///
/// ```no_run
/// use quadfetch::config::ConfigFile;
/// use quadfetch::service::TileService;
/// use quadfetch::tile::TileAddress;
///
/// let service = TileService::new(&ConfigFile::load()?)?;
/// for outcome in service.fetch(&[TileAddress::new(0, 0, 0)]) {
///     println!("{} {}", outcome.requested, outcome.status);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct TileService {
    source: TileSource,
    cache: Arc<RawTileCache>,
    archive: Option<Arc<DirectoryArchive>>,
    pool: Arc<FetchWorkerPool>,
    request_timeout: Duration,
    batch_size: usize,
}

impl TileService {
    /// Wire the pipeline described by `config` with reqwest clients.
    pub fn new(config: &ConfigFile) -> Result<Self, ServiceError> {
        let factory = builder::create_client_factory(&config.network)?;
        Self::with_client_factory(config, factory)
    }

    /// Wire the pipeline with a caller-provided HTTP client factory.
    pub fn with_client_factory(
        config: &ConfigFile,
        factory: ClientFactory,
    ) -> Result<Self, ServiceError> {
        let cache = builder::create_cache(&config.cache);
        let archive = builder::create_archive(&config.cache)?;
        let pool = builder::create_pool(&config.network, factory)?;
        let chain = match builder::create_chain(config, &cache, archive.as_ref(), &pool) {
            Ok(chain) => chain,
            Err(e) => {
                pool.shutdown();
                return Err(e);
            }
        };

        let source = TileSource::new(&config.source.name, chain, config.source.zoom_options())
            .with_format(config.source.format)
            .with_parser(Box::new(RawParser::new(config.source.format)));

        info!(
            source = %config.source.name,
            workers = config.network.workers,
            memory_cache = cache.max_capacity(),
            archive = archive.is_some(),
            "Tile service started"
        );

        Ok(Self {
            source,
            cache,
            archive,
            pool,
            request_timeout: Duration::from_secs(config.network.timeout),
            batch_size: config.network.max_pending.max(1),
        })
    }

    pub fn source(&self) -> &TileSource {
        &self.source
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn archive(&self) -> Option<&Arc<DirectoryArchive>> {
        self.archive.as_ref()
    }

    /// Load `addresses` and wait for every one of them.
    ///
    /// Requests go out in batches no larger than the network stage's
    /// pending limit, so a long list is never refused for saturation.
    /// Outcomes come back in request order.
    pub fn fetch(&self, addresses: &[TileAddress]) -> Vec<TileOutcome> {
        let mut outcomes = Vec::with_capacity(addresses.len());
        for batch in addresses.chunks(self.batch_size) {
            outcomes.extend(self.fetch_batch(batch));
        }
        outcomes
    }

    fn fetch_batch(&self, addresses: &[TileAddress]) -> Vec<TileOutcome> {
        let (tx, rx) = mpsc::channel::<usize>();
        let tasks: Vec<_> = addresses
            .iter()
            .map(|address| self.source.create_task(*address))
            .collect();

        let mut statuses: Vec<Option<FetchStatus>> = vec![None; tasks.len()];
        let mut waiting: usize = 0;
        for (index, task) in tasks.iter().enumerate() {
            let tx = tx.clone();
            let accepted = self.source.load_tile_data(
                task,
                Box::new(move |_| {
                    let _ = tx.send(index);
                }),
            );
            if accepted {
                waiting += 1;
            } else {
                debug!(tile = %task.address(), "Tile request refused");
                statuses[index] = Some(FetchStatus::Refused);
            }
        }
        drop(tx);

        // Every worker may run through a full timeout per queued transfer
        let rounds = waiting.div_ceil(self.pool.worker_count().max(1)) as u32 + 1;
        let deadline = Instant::now() + self.request_timeout * rounds;

        while waiting > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(index) => {
                    waiting -= 1;
                    statuses[index] = Some(self.resolve(&tasks[index]));
                }
                Err(_) => break,
            }
        }

        tasks
            .iter()
            .zip(addresses)
            .zip(statuses)
            .map(|((task, requested), status)| {
                let status = status.unwrap_or_else(|| {
                    warn!(tile = %requested, "Tile fetch timed out");
                    self.source.cancel_loading(task);
                    FetchStatus::TimedOut
                });
                TileOutcome {
                    requested: *requested,
                    loaded: *task.address(),
                    status,
                    data: task.result(),
                }
            })
            .collect()
    }

    fn resolve(&self, task: &TileTask) -> FetchStatus {
        if !task.has_data() {
            return FetchStatus::NotFound;
        }
        match self.source.process(task) {
            Some(_) => FetchStatus::Loaded,
            None if task.state() == TaskState::Failed => FetchStatus::Invalid,
            None => FetchStatus::NotFound,
        }
    }

    /// Drop cached tiles and invalidate tasks created so far.
    pub fn clear(&self) {
        self.source.clear_data();
    }

    /// Stop the fetch workers. Later requests are refused.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl Drop for TileService {
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}
