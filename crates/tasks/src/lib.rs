//! Registry of in-flight save tasks.
//!
//! Each task carries a monotone cancellation flag (a [`CancellationToken`])
//! and at most one cancel callback, typically the abort hook of the
//! destination client currently uploading for that task. Entries are
//! created by [`TaskRegistry::register`] and removed when the save ends.
//! A cancel for an id that is not registered is remembered (up to
//! [`MAX_PENDING_CANCELS`] ids) and applied if that id registers later.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pagedrop_protocol::{TaskId, TaskInfo};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Number of cancels for unregistered ids kept; the oldest are dropped.
pub const MAX_PENDING_CANCELS: usize = 64;

/// Hook invoked when a task is cancelled.
pub type CancelCallback = Box<dyn FnOnce() + Send>;

/// Errors returned by the registry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task {0} was cancelled")]
    Cancelled(TaskId),
}

#[derive(Default)]
struct TaskEntry {
    token: CancellationToken,
    callback: Option<CancelCallback>,
}

#[derive(Default)]
struct Tasks {
    live: HashMap<TaskId, TaskEntry>,
    pending_cancels: VecDeque<TaskId>,
}

impl Tasks {
    /// Entry for `id`, consuming a pending cancel if there is one.
    fn entry(&mut self, id: TaskId) -> &mut TaskEntry {
        if !self.live.contains_key(&id)
            && let Some(pos) = self.pending_cancels.iter().position(|&p| p == id)
        {
            self.pending_cancels.remove(pos);
            let entry = TaskEntry::default();
            entry.token.cancel();
            self.live.insert(id, entry);
        }
        self.live.entry(id).or_default()
    }
}

/// Owned map from task id to cancellation state.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<Tasks>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a task and returns its cancellation token.
    ///
    /// Registering an existing task keeps its state; a task cancelled
    /// before its save started stays cancelled.
    pub fn register(&self, id: TaskId) -> CancellationToken {
        let mut tasks = self.lock();
        let entry = tasks.entry(id);
        debug!(task = id, cancelled = entry.token.is_cancelled(), "task registered");
        entry.token.clone()
    }

    /// Installs the cancel callback for a task, registering it if needed
    /// and replacing any previous callback.
    ///
    /// The flag is checked under the same lock as the swap: if the task is
    /// already cancelled the callback is not stored and
    /// [`TaskError::Cancelled`] is returned, so the caller must not start
    /// network work.
    pub fn set_cancel_callback(
        &self,
        id: TaskId,
        callback: CancelCallback,
    ) -> Result<(), TaskError> {
        let mut tasks = self.lock();
        let entry = tasks.entry(id);
        if entry.token.is_cancelled() {
            return Err(TaskError::Cancelled(id));
        }
        entry.callback = Some(callback);
        Ok(())
    }

    /// Removes the cancel callback without invoking it.
    pub fn clear_cancel_callback(&self, id: TaskId) {
        if let Some(entry) = self.lock().live.get_mut(&id) {
            entry.callback = None;
        }
    }

    /// Cancels a task. The callback, if any, runs once, synchronously,
    /// after the flag is set. Returns `true` if a registered task was newly
    /// cancelled.
    ///
    /// An unregistered id gets no entry; the cancel is kept pending in
    /// case a save with that id registers later.
    pub fn cancel(&self, id: TaskId) -> bool {
        let (newly, callback) = {
            let mut guard = self.lock();
            let tasks = &mut *guard;
            match tasks.live.get_mut(&id) {
                Some(entry) => {
                    let newly = !entry.token.is_cancelled();
                    entry.token.cancel();
                    (newly, entry.callback.take())
                }
                None => {
                    if !tasks.pending_cancels.contains(&id) {
                        if tasks.pending_cancels.len() == MAX_PENDING_CANCELS {
                            tasks.pending_cancels.pop_front();
                        }
                        tasks.pending_cancels.push_back(id);
                    }
                    debug!(task = id, "cancel for unregistered task kept pending");
                    return false;
                }
            }
        };
        debug!(task = id, newly, has_callback = callback.is_some(), "task cancelled");
        if let Some(callback) = callback {
            callback();
        }
        newly
    }

    /// Cancels every registered task.
    pub fn cancel_all(&self) {
        let callbacks: Vec<CancelCallback> = {
            let mut tasks = self.lock();
            tasks
                .live
                .values_mut()
                .filter_map(|entry| {
                    entry.token.cancel();
                    entry.callback.take()
                })
                .collect()
        };
        debug!(aborted = callbacks.len(), "all tasks cancelled");
        for callback in callbacks {
            callback();
        }
    }

    /// Returns `true` for a cancelled task, or an unregistered id with a
    /// pending cancel.
    pub fn is_cancelled(&self, id: TaskId) -> bool {
        let tasks = self.lock();
        match tasks.live.get(&id) {
            Some(entry) => entry.token.is_cancelled(),
            None => tasks.pending_cancels.contains(&id),
        }
    }

    pub fn get_info(&self, id: TaskId) -> Option<TaskInfo> {
        self.lock().live.get(&id).map(|entry| TaskInfo {
            id,
            cancelled: entry.token.is_cancelled(),
        })
    }

    /// Status of every registered task, ordered by id.
    pub fn tasks_info(&self) -> Vec<TaskInfo> {
        let mut infos: Vec<TaskInfo> = self
            .lock()
            .live
            .iter()
            .map(|(id, entry)| TaskInfo {
                id: *id,
                cancelled: entry.token.is_cancelled(),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Forgets a task once its save has been reported.
    pub fn on_save_end(&self, id: TaskId) {
        if self.lock().live.remove(&id).is_some() {
            debug!(task = id, "task removed");
        }
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().live.is_empty()
    }
}
