//! Component construction for [`TileService`](super::TileService), one
//! function per part so each can be tested alone.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::error::ServiceError;
use crate::archive::{DirectoryArchive, TileArchive};
use crate::cache::RawTileCache;
use crate::config::{CacheSettings, ConfigFile, NetworkSettings};
use crate::fetch::{ClientFactory, FetchWorkerPool, ReqwestClient};
use crate::source::{ArchiveMode, ArchiveStage, MemoryCacheStage, NetworkStage, SourceChain, SourceStage};

/// Factory producing one blocking reqwest client per worker.
pub fn create_client_factory(network: &NetworkSettings) -> Result<ClientFactory, ServiceError> {
    Ok(ReqwestClient::factory(Duration::from_secs(network.timeout))?)
}

pub fn create_pool(
    network: &NetworkSettings,
    factory: ClientFactory,
) -> Result<Arc<FetchWorkerPool>, ServiceError> {
    Ok(Arc::new(FetchWorkerPool::new(network.workers, factory)?))
}

/// Memory cache sized from the config. A zero size gives a disabled cache.
pub fn create_cache(cache: &CacheSettings) -> Arc<RawTileCache> {
    Arc::new(RawTileCache::new(cache.memory_size))
}

/// Open the archive directory, if one is configured.
pub fn create_archive(cache: &CacheSettings) -> Result<Option<Arc<DirectoryArchive>>, ServiceError> {
    cache
        .archive_dir
        .as_ref()
        .map(|dir| DirectoryArchive::open(dir).map(Arc::new))
        .transpose()
        .map_err(ServiceError::from)
}

/// Link memory, archive and network stages, skipping the ones turned off.
pub fn create_chain(
    config: &ConfigFile,
    cache: &Arc<RawTileCache>,
    archive: Option<&Arc<DirectoryArchive>>,
    pool: &Arc<FetchWorkerPool>,
) -> Result<SourceChain, ServiceError> {
    let mut stages: Vec<Box<dyn SourceStage>> = Vec::with_capacity(3);

    if cache.is_enabled() {
        stages.push(Box::new(MemoryCacheStage::new(Arc::clone(cache))));
    }

    if let Some(archive) = archive {
        let mode = if config.cache.offline_fallback {
            ArchiveMode::OfflineFallback
        } else {
            ArchiveMode::Cache
        };
        let archive: Arc<dyn TileArchive> = Arc::clone(archive) as Arc<dyn TileArchive>;
        stages.push(Box::new(
            ArchiveStage::new(archive)
                .with_mode(mode)
                .with_write_back(config.cache.archive_write_back),
        ));
    }

    let template = config.source.url_template()?;
    stages.push(Box::new(
        NetworkStage::new(Arc::clone(pool), template)
            .with_max_pending(config.network.max_pending),
    ));

    let chain = SourceChain::new(stages);
    info!(
        source = %config.source.name,
        stages = ?chain.stage_names(),
        "Source chain ready"
    );
    Ok(chain)
}
