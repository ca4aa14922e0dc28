//! The consumer-facing tile source.
//!
//! A [`TileSource`] owns a [`SourceChain`], stamps tasks with its current
//! generation and parses loaded payloads on the caller's thread.
//!
//! ```text
//! create_task(addr) ──► TileTask ──► load_tile_data ──► SourceChain
//!                                                          │
//!          process(task) ◄── consumer callback ◄───────────┘
//! ```

use std::any::Any;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::address::{TileAddress, MAX_ZOOM};
use super::parser::{ParsedContent, RawParser, TileFormat, TileParser};
use super::task::{TaskState, TileTask, TileTaskCallback};
use crate::source::SourceChain;

/// Default deepest zoom a source serves.
pub const DEFAULT_MAX_SOURCE_ZOOM: u8 = 18;

/// Zoom limits of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomOptions {
    /// Lowest display zoom at which the source is drawn
    pub min_display_zoom: u8,
    /// Highest display zoom at which the source is drawn
    pub max_display_zoom: u8,
    /// Deepest zoom requested from the server; finer display zooms overzoom
    pub max_source_zoom: u8,
    /// Zoom offset for tiles larger than 256px, see
    /// [`zoom_bias_from_tile_size`](super::zoom_bias_from_tile_size)
    pub zoom_bias: u8,
}

impl Default for ZoomOptions {
    fn default() -> Self {
        Self {
            min_display_zoom: 0,
            max_display_zoom: MAX_ZOOM,
            max_source_zoom: DEFAULT_MAX_SOURCE_ZOOM,
            zoom_bias: 0,
        }
    }
}

/// Structured result of processing a task.
#[derive(Clone)]
pub struct ParsedTileData {
    pub address: TileAddress,
    /// Source generation the data was loaded under
    pub generation: i64,
    pub format: TileFormat,
    pub content: ParsedContent,
    /// Raster sub-task payloads, indexed like the source's raster sources
    pub rasters: Vec<Option<Bytes>>,
}

impl ParsedTileData {
    /// Downcast the parsed content to the parser's concrete type.
    pub fn content_as<T: Any>(&self) -> Option<&T> {
        self.content.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for ParsedTileData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedTileData")
            .field("address", &self.address)
            .field("generation", &self.generation)
            .field("format", &self.format)
            .field("rasters", &self.rasters.len())
            .finish()
    }
}

/// Tracks the parts of one load so the consumer hears back exactly once.
struct LoadGroup {
    task: Arc<TileTask>,
    generation: Arc<AtomicI64>,
    remaining: AtomicUsize,
    on_complete: Mutex<Option<TileTaskCallback>>,
}

impl LoadGroup {
    fn part_done(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let Some(on_complete) = self.on_complete.lock().take() else {
            return;
        };
        let current = self.generation.load(Ordering::Acquire);
        if self.task.is_canceled() || self.task.source_generation() != current {
            trace!(tile = %self.task.address(), "Discarding canceled or stale tile");
            return;
        }
        on_complete(Arc::clone(&self.task));
    }
}

/// Consumer façade over a source chain.
pub struct TileSource {
    name: String,
    format: TileFormat,
    zoom: ZoomOptions,
    chain: SourceChain,
    parser: Box<dyn TileParser>,
    generation: Arc<AtomicI64>,
    raster_sources: Vec<Arc<TileSource>>,
}

impl TileSource {
    pub fn new(name: impl Into<String>, chain: SourceChain, zoom: ZoomOptions) -> Self {
        let format = TileFormat::default();
        Self {
            name: name.into(),
            format,
            zoom,
            chain,
            parser: Box::new(RawParser::new(format)),
            generation: Arc::new(AtomicI64::new(0)),
            raster_sources: Vec::new(),
        }
    }

    /// Set the payload format. Also resets the parser to a [`RawParser`]
    /// for that format; call [`with_parser`](Self::with_parser) afterwards
    /// to use a different one.
    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        self.parser = Box::new(RawParser::new(format));
        self
    }

    pub fn with_parser(mut self, parser: Box<dyn TileParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn zoom_options(&self) -> ZoomOptions {
        self.zoom
    }

    pub fn chain(&self) -> &SourceChain {
        &self.chain
    }

    /// Current data generation, bumped by [`clear_data`](Self::clear_data).
    pub fn generation(&self) -> i64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn raster_sources(&self) -> &[Arc<TileSource>] {
        &self.raster_sources
    }

    /// Attach a raster source. Every task created afterwards gets one
    /// sub-task for it. The display zoom range narrows to the overlap of
    /// both sources.
    pub fn add_raster_source(&mut self, raster: Arc<TileSource>) {
        let raster_zoom = raster.zoom_options();
        self.zoom.min_display_zoom = self.zoom.min_display_zoom.max(raster_zoom.min_display_zoom);
        self.zoom.max_display_zoom = self.zoom.max_display_zoom.min(raster_zoom.max_display_zoom);
        debug!(source = %self.name, raster = %raster.name, "Attached raster source");
        self.raster_sources.push(raster);
    }

    /// Whether the source is drawn at display zoom `zoom`.
    pub fn is_active_for_zoom(&self, zoom: u8) -> bool {
        zoom >= self.zoom.min_display_zoom && zoom <= self.zoom.max_display_zoom
    }

    /// Map a display address to the address requested from this source.
    pub fn source_address(&self, address: &TileAddress) -> TileAddress {
        address
            .zoom_bias_adjusted(self.zoom.zoom_bias)
            .with_max_source_zoom(self.zoom.max_source_zoom)
    }

    /// Create a task for the tile displayed at `address`. No I/O happens.
    pub fn create_task(&self, address: TileAddress) -> Arc<TileTask> {
        let sub_tasks = self
            .raster_sources
            .iter()
            .enumerate()
            .map(|(index, raster)| {
                Arc::new(TileTask::new(
                    raster.source_address(&address),
                    raster.generation(),
                    Some(index),
                    Vec::new(),
                ))
            })
            .collect();

        Arc::new(TileTask::new(
            self.source_address(&address),
            self.generation(),
            None,
            sub_tasks,
        ))
    }

    /// Start loading `task` and its sub-tasks.
    ///
    /// `on_complete` fires once, after the task and every sub-task have
    /// resolved, unless the task was canceled or its generation went stale
    /// in the meantime. Returns false when the chain refused the request;
    /// the task then still needs loading and may be retried.
    pub fn load_tile_data(&self, task: &Arc<TileTask>, on_complete: TileTaskCallback) -> bool {
        if !task.needs_loading() {
            if !task.has_data() {
                return false;
            }
            if task.is_canceled() || task.source_generation() != self.generation() {
                trace!(tile = %task.address(), "Discarding canceled or stale tile");
                return true;
            }
            on_complete(Arc::clone(task));
            return true;
        }

        let pending_subs: Vec<(usize, &Arc<TileTask>)> = task
            .sub_tasks()
            .iter()
            .filter(|sub| sub.needs_loading())
            .filter_map(|sub| sub.sub_task_index().map(|index| (index, sub)))
            .filter(|(index, _)| *index < self.raster_sources.len())
            .collect();

        let group = Arc::new(LoadGroup {
            task: Arc::clone(task),
            generation: Arc::clone(&self.generation),
            remaining: AtomicUsize::new(1 + pending_subs.len()),
            on_complete: Mutex::new(Some(on_complete)),
        });

        task.start_loading();
        let main_group = Arc::clone(&group);
        let accepted = self.chain.load(
            Arc::clone(task),
            Box::new(move |task: Arc<TileTask>| {
                let state = task.finish_loading(main_group.generation.load(Ordering::Acquire));
                trace!(tile = %task.address(), state = %state, "Tile load finished");
                main_group.part_done();
            }),
        );
        if !accepted {
            task.reset_loading();
            trace!(tile = %task.address(), "Tile load refused");
            return false;
        }

        for (index, sub_task) in pending_subs {
            let raster = &self.raster_sources[index];
            let raster_generation = Arc::clone(&raster.generation);
            let sub_group = Arc::clone(&group);

            sub_task.start_loading();
            let accepted = raster.chain.load(
                Arc::clone(sub_task),
                Box::new(move |sub_task: Arc<TileTask>| {
                    sub_task.finish_loading(raster_generation.load(Ordering::Acquire));
                    sub_group.part_done();
                }),
            );
            if !accepted {
                // A refused raster only degrades the tile
                sub_task.finish_loading(raster.generation());
                group.part_done();
            }
        }
        true
    }

    /// Parse a loaded task into structured data on the calling thread.
    ///
    /// Returns `None` for canceled or stale tasks, tasks without data and
    /// payloads the parser rejects.
    pub fn process(&self, task: &TileTask) -> Option<Arc<ParsedTileData>> {
        if task.is_canceled() || task.source_generation() != self.generation() {
            task.set_state(TaskState::Canceled);
            return None;
        }
        if let Some(result) = task.result() {
            return Some(result);
        }
        let payload = task.payload()?;

        match self.parser.parse(task.address(), &payload) {
            Ok(content) => {
                let rasters = task.sub_tasks().iter().map(|sub| sub.payload()).collect();
                let data = Arc::new(ParsedTileData {
                    address: *task.address(),
                    generation: task.source_generation(),
                    format: self.format,
                    content,
                    rasters,
                });
                task.set_result(Arc::clone(&data));
                Some(data)
            }
            Err(e) => {
                warn!(source = %self.name, error = %e, "Failed to parse tile");
                task.set_state(TaskState::Failed);
                None
            }
        }
    }

    /// Drop cached data and invalidate every task created so far.
    ///
    /// Tasks still loading are not canceled; they discard themselves when
    /// their data arrives.
    pub fn clear_data(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.chain.clear();
        debug!(source = %self.name, generation, "Cleared tile data");
    }

    /// Cancel `task` and its sub-tasks and stop their loads.
    pub fn cancel_loading(&self, task: &TileTask) {
        task.cancel();
        self.chain.cancel(task.address());
        for sub_task in task.sub_tasks() {
            if let Some(raster) = sub_task
                .sub_task_index()
                .and_then(|index| self.raster_sources.get(index))
            {
                raster.chain.cancel(sub_task.address());
            }
        }
    }

    /// Highest-zoom tile covering `address` that could be served without
    /// waiting on the network.
    pub fn best_available(&self, address: &TileAddress) -> Option<TileAddress> {
        self.chain.best_available(&self.source_address(address))
    }
}

impl std::fmt::Debug for TileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileSource")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("zoom", &self.zoom)
            .field("generation", &self.generation())
            .field("chain", &self.chain)
            .field("raster_sources", &self.raster_sources.len())
            .finish()
    }
}
