/// The period transition engine: guarded task mutations and clock rollover.
mod state;
mod watch;

#[cfg(test)]
pub mod testing;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::registry::TaskTypeError;
use crate::types::{Period, Task, TaskId, TaskType};

pub use state::Engine;
pub use watch::PeriodWatch;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("the current clock has ended; resolve the transition first")]
    TransitionPending,
    #[error("another operation is still in flight")]
    Busy,
    #[error("task title cannot be empty")]
    EmptyTitle,
    #[error("clock name cannot be empty")]
    EmptyName,
    #[error("priority must be between 1 and 4, got {0}")]
    InvalidPriority(u8),
    #[error("no task with id {0} in the current clock")]
    UnknownTask(TaskId),
    #[error("no transition is pending")]
    NoTransitionPending,
    #[error(transparent)]
    TaskType(#[from] TaskTypeError),
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Which mutations are refused while a transition is pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PendingPolicy {
    /// Only new tasks are refused; toggling and deleting keep working.
    #[default]
    CreateOnly,
    AllMutations,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub period_days: i64,
    pub pending_policy: PendingPolicy,
    pub retry_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            period_days: crate::types::DEFAULT_PERIOD_DAYS,
            pending_policy: PendingPolicy::default(),
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Input for [`Engine::add_task`].
#[derive(Clone, Debug)]
pub struct NewTask {
    pub title: String,
    pub priority: u8,
    pub due_date: chrono::DateTime<chrono::Utc>,
    pub task_type: TaskType,
    /// Overrides the type's color when set.
    pub color: Option<String>,
}

/// Result of an end-of-period check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndCheck {
    Active,
    /// The period just ended; observers were told.
    Pending,
    AlreadyPending,
    /// An operation was in flight; check again after the delay.
    Deferred(Duration),
}

/// What a resolved transition produced.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub archived: Period,
    pub current: Period,
    pub migrated: Vec<Task>,
}

/// Notifications delivered synchronously after state changes.
#[derive(Debug)]
pub enum EngineEvent<'a> {
    TasksReloaded(&'a [Task]),
    TransitionPending(&'a Period),
    TransitionResolved {
        archived: &'a Period,
        current: &'a Period,
    },
    PeriodRenamed(&'a Period),
}

pub type Observer = Box<dyn FnMut(&EngineEvent<'_>)>;

/// Handle returned by [`Engine::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Per-engine, non-reentrant in-flight flag.
#[derive(Clone, Debug, Default)]
pub struct OperationGuard(Rc<Cell<bool>>);

impl OperationGuard {
    pub fn try_acquire(&self) -> Option<InFlight> {
        if self.0.get() {
            return None;
        }
        self.0.set(true);
        Some(InFlight(Rc::clone(&self.0)))
    }

    pub fn is_held(&self) -> bool {
        self.0.get()
    }
}

/// Releases the guard when dropped, including on early error returns.
#[derive(Debug)]
pub struct InFlight(Rc<Cell<bool>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
