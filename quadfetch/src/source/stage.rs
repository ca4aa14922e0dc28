//! The source stage contract and the owned chain of stages.

use std::sync::Arc;

use crate::tile::{TileAddress, TileTask, TileTaskCallback};

/// One link of a [`SourceChain`].
///
/// A stage answers a load request in one of three ways:
///
/// 1. **Satisfy**: attach bytes to the task and call `on_done`.
/// 2. **Delegate**: pass the request to the next stage unchanged, or call
///    `on_done` with no bytes when there is no next stage.
/// 3. **Defer and learn**: pass the request on with a wrapped callback that
///    stores the bytes locally before forwarding to `on_done`.
///
/// Stages never fail across this boundary: a missing tile is a task without
/// payload.
pub trait SourceStage: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Start loading `task`. Returns false if the request was refused, in
    /// which case `on_done` is dropped without being called.
    fn load(&self, task: Arc<TileTask>, on_done: TileTaskCallback) -> bool;

    /// Attach the stage that handles requests this one cannot satisfy.
    fn set_next(&mut self, next: Box<dyn SourceStage>);

    fn next(&self) -> Option<&dyn SourceStage>;

    /// Stop work for `address` in this stage and all later ones.
    fn cancel(&self, address: &TileAddress) {
        if let Some(next) = self.next() {
            next.cancel(address);
        }
    }

    /// Drop stored tiles in this stage and all later ones.
    fn clear(&self) {
        if let Some(next) = self.next() {
            next.clear();
        }
    }

    /// Whether this stage can serve `address` from local storage.
    fn holds(&self, _address: &TileAddress) -> bool {
        false
    }

    /// Highest-zoom address at or above `address` available anywhere from
    /// this stage down. Ties go to the earlier (faster) stage.
    fn best_available(&self, address: &TileAddress) -> Option<TileAddress> {
        let local = address
            .source_tile()
            .ancestors()
            .find(|candidate| self.holds(candidate));
        let downstream = self.next().and_then(|next| next.best_available(address));

        match (local, downstream) {
            (Some(local), Some(downstream)) if downstream.z > local.z => Some(downstream),
            (Some(local), _) => Some(local),
            (None, downstream) => downstream,
        }
    }
}

/// Hand `task` to `next`, or finish it empty-handed at the end of the chain.
pub fn delegate(
    next: Option<&dyn SourceStage>,
    task: Arc<TileTask>,
    on_done: TileTaskCallback,
) -> bool {
    match next {
        Some(next) => next.load(task, on_done),
        None => {
            on_done(task);
            true
        }
    }
}

/// Owned, linear sequence of stages ordered fastest first.
pub struct SourceChain {
    head: Option<Box<dyn SourceStage>>,
}

impl SourceChain {
    /// A chain with no stages: every load completes immediately without data.
    pub fn empty() -> Self {
        Self { head: None }
    }

    /// Link `stages` head first. Each stage takes ownership of the next.
    pub fn new(stages: Vec<Box<dyn SourceStage>>) -> Self {
        let mut head: Option<Box<dyn SourceStage>> = None;
        for mut stage in stages.into_iter().rev() {
            if let Some(next) = head.take() {
                stage.set_next(next);
            }
            head = Some(stage);
        }
        Self { head }
    }

    pub fn load(&self, task: Arc<TileTask>, on_done: TileTaskCallback) -> bool {
        delegate(self.head.as_deref(), task, on_done)
    }

    pub fn cancel(&self, address: &TileAddress) {
        if let Some(head) = &self.head {
            head.cancel(address);
        }
    }

    pub fn clear(&self) {
        if let Some(head) = &self.head {
            head.clear();
        }
    }

    pub fn best_available(&self, address: &TileAddress) -> Option<TileAddress> {
        self.head
            .as_ref()
            .and_then(|head| head.best_available(address))
    }

    /// Stage names, head first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut stage = self.head.as_deref();
        while let Some(current) = stage {
            names.push(current.name());
            stage = current.next();
        }
        names
    }
}

impl std::fmt::Debug for SourceChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceChain")
            .field("stages", &self.stage_names())
            .finish()
    }
}
