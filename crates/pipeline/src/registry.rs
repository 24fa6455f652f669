//! Per-set task registry.
//!
//! At most one background task may own a set at a time. A caller first
//! claims the set with [`TaskRegistry::try_claim`], which fails fast with
//! a conflict when the set is busy, then hands the returned [`TaskSlot`]
//! to [`TaskRegistry::spawn`]. The slot is released when the task ends,
//! however it ends.
//!
//! A semaphore bounds how many claimed tasks execute at once; tasks over
//! the bound wait for a permit. After [`TaskRegistry::shutdown`] no new
//! claims are granted.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use stampline_core::types::DbId;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::WorkflowError;

type ActiveSet = Arc<Mutex<HashSet<DbId>>>;

/// Exclusive claim on one set. Releases the set when dropped.
#[derive(Debug)]
pub struct TaskSlot {
    set_id: DbId,
    active: ActiveSet,
}

impl TaskSlot {
    pub fn set_id(&self) -> DbId {
        self.set_id
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        // A poisoned lock still holds a valid set.
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.set_id);
    }
}

/// Handle to a spawned stage task.
#[derive(Debug)]
pub struct TaskHandle {
    set_id: DbId,
    stage: &'static str,
    inner: JoinHandle<()>,
}

impl TaskHandle {
    pub fn set_id(&self) -> DbId {
        self.set_id
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Wait for the task to finish.
    pub async fn join(self) {
        if let Err(e) = self.inner.await {
            tracing::error!(set_id = self.set_id, stage = self.stage, error = %e, "Stage task panicked");
        }
    }
}

/// Registry of in-flight stage tasks, keyed by set id.
pub struct TaskRegistry {
    active: ActiveSet,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl TaskRegistry {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            active: Arc::default(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            shutdown: CancellationToken::new(),
        }
    }

    /// Claim `set_id` for a new task.
    pub fn try_claim(&self, set_id: DbId) -> Result<TaskSlot, WorkflowError> {
        if self.shutdown.is_cancelled() {
            return Err(WorkflowError::Conflict(
                "Shutting down, no new tasks are accepted".to_string(),
            ));
        }
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(set_id) {
            return Err(WorkflowError::Conflict(format!(
                "Stamp set {set_id} already has a task in progress"
            )));
        }
        Ok(TaskSlot {
            set_id,
            active: Arc::clone(&self.active),
        })
    }

    /// Spawn `task` under `slot`. The slot is held until the task ends.
    pub fn spawn<F>(&self, slot: TaskSlot, stage: &'static str, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let set_id = slot.set_id;
        let permits = Arc::clone(&self.permits);
        let inner = tokio::spawn(async move {
            let _slot = slot;
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            tracing::debug!(set_id, stage, "Stage task started");
            task.await;
            tracing::debug!(set_id, stage, "Stage task finished");
        });
        TaskHandle {
            set_id,
            stage,
            inner,
        }
    }

    /// Whether a task currently owns `set_id`.
    pub fn is_active(&self, set_id: DbId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&set_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Stop granting new claims. In-flight tasks run to completion.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
