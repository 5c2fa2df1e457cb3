//! Registry of in-flight tasks keyed by operation id.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::task::{Task, TaskHandle};
use crate::types::OperationId;

/// Single source of truth for "is this operation still live"
///
/// Every method takes the lock once and releases it before returning; no
/// caller code runs while it is held. Tasks leaving the registry are dropped
/// (or returned) only after the lock is released, so handler destructors never
/// run under it either.
#[derive(Default)]
pub(crate) struct TaskRegistry {
    tasks: Mutex<HashMap<OperationId, Task>>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<OperationId, Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a task under its operation id
    ///
    /// # Panics
    ///
    /// Panics if a live task already uses the id: the transport handed out a
    /// colliding identifier.
    pub(crate) fn add(&self, task: Task) {
        let id = task.id();
        let previous = self.tasks().insert(id, task);
        assert!(
            previous.is_none(),
            "duplicate task registered for operation {id}"
        );
    }

    /// Remove and return the task; `None` if it is absent (safe to repeat)
    pub(crate) fn remove(&self, id: OperationId) -> Option<Task> {
        self.tasks().remove(&id)
    }

    /// Snapshot handle to a live task
    pub(crate) fn lookup(&self, id: OperationId) -> Option<TaskHandle> {
        self.tasks().get(&id).map(|task| task.handle().clone())
    }

    /// Run `f` against a live task while holding the lock
    ///
    /// Reserved for crate-internal bookkeeping; `f` must not call back into the
    /// registry or into caller-supplied code.
    pub(crate) fn with_task<R>(&self, id: OperationId, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        self.tasks().get_mut(&id).map(f)
    }

    /// Drop every entry without touching the underlying operations
    ///
    /// Returns the number of tasks dropped.
    pub(crate) fn remove_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.tasks());
        drained.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks().len()
    }

    pub(crate) fn contains(&self, id: OperationId) -> bool {
        self.tasks().contains_key(&id)
    }
}
