//! Tile tasks: one unit of "produce data for this tile from this source".

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::source::ParsedTileData;
use super::TileAddress;

/// Completion callback handed down the source chain.
pub type TileTaskCallback = Box<dyn FnOnce(Arc<TileTask>) + Send>;

/// Lifecycle of a [`TileTask`].
///
/// ```text
/// Created ──► Loading ──► Loaded ──► Processed
///                  │  └──► Failed
///                  └─────► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Created,
    Loading,
    Loaded,
    Failed,
    Canceled,
    Processed,
}

impl TaskState {
    /// Whether loading has finished one way or another.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, TaskState::Created | TaskState::Loading)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Created => "created",
            TaskState::Loading => "loading",
            TaskState::Loaded => "loaded",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
            TaskState::Processed => "processed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct TaskData {
    state: TaskState,
    payload: Option<Bytes>,
    result: Option<Arc<ParsedTileData>>,
}

/// A request for one tile's data.
///
/// Tasks are shared between the consumer and the source chain through
/// `Arc`. Priority and cancellation are lock-free; payload and state sit
/// behind a short-lived mutex.
pub struct TileTask {
    address: TileAddress,
    source_generation: i64,
    /// Position in the parent's raster list, for sub-tasks
    sub_task_index: Option<usize>,
    priority: AtomicU32,
    canceled: AtomicBool,
    needs_loading: AtomicBool,
    data: Mutex<TaskData>,
    sub_tasks: Vec<Arc<TileTask>>,
}

impl TileTask {
    pub(crate) fn new(
        address: TileAddress,
        source_generation: i64,
        sub_task_index: Option<usize>,
        sub_tasks: Vec<Arc<TileTask>>,
    ) -> Self {
        Self {
            address,
            source_generation,
            sub_task_index,
            priority: AtomicU32::new(0f32.to_bits()),
            canceled: AtomicBool::new(false),
            needs_loading: AtomicBool::new(true),
            data: Mutex::new(TaskData {
                state: TaskState::Created,
                payload: None,
                result: None,
            }),
            sub_tasks,
        }
    }

    pub fn address(&self) -> &TileAddress {
        &self.address
    }

    /// Generation of the source at the time the task was created.
    pub fn source_generation(&self) -> i64 {
        self.source_generation
    }

    pub fn sub_task_index(&self) -> Option<usize> {
        self.sub_task_index
    }

    pub fn is_sub_task(&self) -> bool {
        self.sub_task_index.is_some()
    }

    pub fn sub_tasks(&self) -> &[Arc<TileTask>] {
        &self.sub_tasks
    }

    /// Set the scheduling priority. Lower values are more urgent.
    pub fn set_priority(&self, priority: f32) {
        self.priority.store(priority.to_bits(), Ordering::Relaxed);
    }

    pub fn priority(&self) -> f32 {
        f32::from_bits(self.priority.load(Ordering::Relaxed))
    }

    /// Cancel this task and its sub-tasks.
    ///
    /// Cancellation is cooperative: work already running finishes, but its
    /// result is discarded. A task that has not resolved yet moves to
    /// [`TaskState::Canceled`] immediately.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
        {
            let mut data = self.data.lock();
            if !data.state.is_resolved() {
                data.state = TaskState::Canceled;
            }
        }
        for sub_task in &self.sub_tasks {
            sub_task.cancel();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Whether the task still has to be handed to a source chain.
    pub fn needs_loading(&self) -> bool {
        self.needs_loading.load(Ordering::Acquire)
    }

    pub fn state(&self) -> TaskState {
        self.data.lock().state
    }

    /// True once this task and every sub-task have finished loading.
    pub fn is_ready(&self) -> bool {
        if self.needs_loading() || !self.state().is_resolved() {
            return false;
        }
        self.sub_tasks.iter().all(|sub_task| sub_task.is_ready())
    }

    /// Raw payload attached by a source stage.
    pub fn payload(&self) -> Option<Bytes> {
        self.data.lock().payload.clone()
    }

    /// Whether a non-empty payload is attached.
    pub fn has_data(&self) -> bool {
        self.data
            .lock()
            .payload
            .as_ref()
            .is_some_and(|payload| !payload.is_empty())
    }

    /// Attach raw bytes. Stages call this when they satisfy a request.
    ///
    /// An empty buffer counts as "no data".
    pub fn set_payload(&self, payload: Bytes) {
        let mut data = self.data.lock();
        data.payload = if payload.is_empty() {
            None
        } else {
            Some(payload)
        };
    }

    /// Parsed data, once processed.
    pub fn result(&self) -> Option<Arc<ParsedTileData>> {
        self.data.lock().result.clone()
    }

    pub(crate) fn set_result(&self, result: Arc<ParsedTileData>) {
        let mut data = self.data.lock();
        data.result = Some(result);
        data.state = TaskState::Processed;
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.data.lock().state = state;
    }

    /// Mark the task as handed to the chain.
    pub(crate) fn start_loading(&self) {
        self.needs_loading.store(false, Ordering::Release);
        let mut data = self.data.lock();
        if data.state == TaskState::Created {
            data.state = TaskState::Loading;
        }
    }

    /// Undo [`start_loading`](Self::start_loading) after the chain refused
    /// the request.
    pub(crate) fn reset_loading(&self) {
        let mut data = self.data.lock();
        if data.state == TaskState::Loading {
            data.state = TaskState::Created;
        }
        self.needs_loading.store(true, Ordering::Release);
    }

    /// Settle the loading state once the chain has answered.
    ///
    /// `current_generation` is the owning source's generation now; a task
    /// from an older generation is discarded like a canceled one.
    pub(crate) fn finish_loading(&self, current_generation: i64) -> TaskState {
        let discard = self.is_canceled() || self.source_generation != current_generation;
        let mut data = self.data.lock();
        if data.state.is_resolved() {
            return data.state;
        }
        data.state = if discard {
            TaskState::Canceled
        } else if data.payload.is_some() {
            TaskState::Loaded
        } else {
            TaskState::Failed
        };
        data.state
    }
}

impl fmt::Debug for TileTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileTask")
            .field("address", &self.address)
            .field("generation", &self.source_generation)
            .field("state", &self.state())
            .field("canceled", &self.is_canceled())
            .field("sub_tasks", &self.sub_tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> TileTask {
        TileTask::new(TileAddress::new(1, 2, 3), 0, None, Vec::new())
    }

    #[test]
    fn test_new_task_is_created() {
        let task = task();
        assert_eq!(task.state(), TaskState::Created);
        assert!(task.needs_loading());
        assert!(!task.is_ready());
        assert!(!task.has_data());
        assert!(task.result().is_none());
    }

    #[test]
    fn test_priority_round_trip() {
        let task = task();
        task.set_priority(0.25);
        assert_eq!(task.priority(), 0.25);
        task.set_priority(-3.5);
        assert_eq!(task.priority(), -3.5);
    }

    #[test]
    fn test_cancel_propagates_to_sub_tasks() {
        let sub = Arc::new(TileTask::new(TileAddress::new(1, 2, 3), 0, Some(0), Vec::new()));
        let parent = TileTask::new(TileAddress::new(1, 2, 3), 0, None, vec![Arc::clone(&sub)]);

        parent.cancel();
        assert!(parent.is_canceled());
        assert!(sub.is_canceled());
        assert!(sub.is_sub_task());
    }

    #[test]
    fn test_empty_payload_is_no_data() {
        let task = task();
        task.set_payload(Bytes::new());
        assert!(!task.has_data());
        assert!(task.payload().is_none());
    }

    #[test]
    fn test_finish_loading_with_payload() {
        let task = task();
        task.start_loading();
        assert_eq!(task.state(), TaskState::Loading);
        assert!(!task.needs_loading());

        task.set_payload(Bytes::from_static(b"tile"));
        assert_eq!(task.finish_loading(0), TaskState::Loaded);
        assert!(task.is_ready());
    }

    #[test]
    fn test_finish_loading_without_payload_fails() {
        let task = task();
        task.start_loading();
        assert_eq!(task.finish_loading(0), TaskState::Failed);
        assert!(task.is_ready());
    }

    #[test]
    fn test_stale_generation_is_canceled() {
        let task = task();
        task.start_loading();
        task.set_payload(Bytes::from_static(b"tile"));
        assert_eq!(task.finish_loading(1), TaskState::Canceled);
    }

    #[test]
    fn test_canceled_task_finishes_canceled() {
        let task = task();
        task.start_loading();
        task.cancel();
        task.set_payload(Bytes::from_static(b"tile"));
        assert_eq!(task.finish_loading(0), TaskState::Canceled);
    }

    #[test]
    fn test_cancel_resolves_unfinished_task() {
        let loading = task();
        loading.start_loading();
        loading.cancel();
        assert_eq!(loading.state(), TaskState::Canceled);
        assert!(loading.is_ready());
        assert_eq!(loading.finish_loading(0), TaskState::Canceled);

        let loaded = task();
        loaded.start_loading();
        loaded.set_payload(Bytes::from_static(b"tile"));
        loaded.finish_loading(0);
        loaded.cancel();
        assert_eq!(loaded.state(), TaskState::Loaded);
    }

    #[test]
    fn test_reset_loading() {
        let task = task();
        task.start_loading();
        task.reset_loading();
        assert_eq!(task.state(), TaskState::Created);
        assert!(task.needs_loading());
    }

    #[test]
    fn test_ready_waits_for_sub_tasks() {
        let sub = Arc::new(TileTask::new(TileAddress::new(1, 2, 3), 0, Some(0), Vec::new()));
        let parent = TileTask::new(TileAddress::new(1, 2, 3), 0, None, vec![Arc::clone(&sub)]);

        parent.start_loading();
        parent.set_payload(Bytes::from_static(b"tile"));
        parent.finish_loading(0);
        assert!(!parent.is_ready());

        sub.start_loading();
        sub.finish_loading(0);
        assert!(parent.is_ready());
    }
}
