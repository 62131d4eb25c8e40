use std::collections::HashSet;

use anyhow::Context;
use chrono::{DateTime, Utc};
use mockable::{Clock, DefaultClock};
use rusqlite::Connection;
use uuid::Uuid;

use crate::color;
use crate::db;
use crate::registry::{PeriodRegistry, TaskTypeRegistry};
use crate::types::{
    Period, PeriodStats, Priority, Task, TaskId, TaskQuery, TaskType, TaskTypeId, days_after,
};

use super::{
    EndCheck, EngineError, EngineEvent, EngineSettings, NewTask, Observer, OperationGuard,
    PendingPolicy, Subscription, Transition,
};

/// Owns the active clock period and its tasks.
///
/// All operations run on the caller's thread. The operation guard keeps the
/// end-of-period check from running while a mutation is in flight.
pub struct Engine<C: Clock = DefaultClock> {
    conn: Connection,
    clock: C,
    settings: EngineSettings,
    periods: PeriodRegistry,
    task_types: TaskTypeRegistry,
    tasks: Vec<Task>,
    transition_pending: bool,
    guard: OperationGuard,
    observers: Vec<(Subscription, Observer)>,
    next_subscription: u64,
}

impl<C: Clock> Engine<C> {
    pub fn new(conn: Connection, clock: C, settings: EngineSettings) -> Self {
        let now = clock.utc();
        let periods = PeriodRegistry::load(&conn, now, settings.period_days);
        let task_types = TaskTypeRegistry::load(&conn);
        let mut engine = Self {
            conn,
            clock,
            settings,
            periods,
            task_types,
            tasks: Vec::new(),
            transition_pending: false,
            guard: OperationGuard::default(),
            observers: Vec::new(),
            next_subscription: 0,
        };
        engine.load_tasks();
        engine
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    pub fn current_period(&self) -> &Period {
        self.periods.active()
    }

    pub fn shelf(&self) -> Vec<&Period> {
        self.periods.shelf()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn find_task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn is_transition_pending(&self) -> bool {
        self.transition_pending
    }

    #[cfg(test)]
    pub fn guard(&self) -> OperationGuard {
        self.guard.clone()
    }

    pub fn task_types(&self) -> &TaskTypeRegistry {
        &self.task_types
    }

    /// Not completed and not yet due.
    pub fn pending_tasks(&self) -> Vec<&Task> {
        let now = self.now();
        self.tasks.iter().filter(|t| t.is_pending(now)).collect()
    }

    pub fn overdue_tasks(&self) -> Vec<&Task> {
        let now = self.now();
        self.tasks.iter().filter(|t| t.is_overdue(now)).collect()
    }

    pub fn completed_tasks(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.is_completed).collect()
    }

    /// Candidates for migration into the next period.
    pub fn unfinished_tasks(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| !t.is_completed).collect()
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&EngineEvent<'_>) + 'static) -> Subscription {
        let subscription = Subscription(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((subscription, Box::new(observer)));
        subscription
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(s, _)| *s != subscription);
        self.observers.len() != before
    }

    /// Re-reads the active period's tasks sorted by due date. On failure the
    /// previous task list is kept.
    pub fn load_tasks(&mut self) {
        let period_id = self.periods.active().id;
        match db::query_tasks(TaskQuery::ByPeriod(period_id), &self.conn) {
            Ok(tasks) => {
                self.tasks = tasks;
                emit(&mut self.observers, &EngineEvent::TasksReloaded(&self.tasks));
            }
            Err(error) => {
                tracing::warn!(%period_id, error = %format!("{error:#}"), "failed to load tasks");
            }
        }
    }

    pub fn add_task(&mut self, new: NewTask) -> Result<Task, EngineError> {
        if self.transition_pending {
            tracing::debug!("add_task rejected, transition pending");
            return Err(EngineError::TransitionPending);
        }
        let title = new.title.trim();
        if title.is_empty() {
            return Err(EngineError::EmptyTitle);
        }
        let priority =
            Priority::new(new.priority).ok_or(EngineError::InvalidPriority(new.priority))?;
        let _in_flight = self.guard.try_acquire().ok_or(EngineError::Busy)?;

        let color = match &new.color {
            Some(color) => color::resolve(color),
            None => color::resolve(&new.task_type.color_name),
        };
        let task = Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            is_completed: false,
            priority,
            due_date: new.due_date,
            original_due_date: new.due_date,
            type_name: new.task_type.name.clone(),
            color: color.to_string(),
            period_id: self.periods.active().id,
        };
        if let Err(error) = db::create_task(&task, &self.conn) {
            tracing::warn!(task_id = %task.id, error = %format!("{error:#}"), "failed to save task");
            return Err(error.into());
        }
        tracing::debug!(task_id = %task.id, title = %task.title, "task added");
        self.load_tasks();
        Ok(task)
    }

    pub fn toggle_completion(&mut self, id: TaskId) -> Result<Task, EngineError> {
        self.check_mutation_allowed()?;
        let _in_flight = self.guard.try_acquire().ok_or(EngineError::Busy)?;
        let task = self.active_task(id)?;
        let toggled = Task {
            is_completed: !task.is_completed,
            ..task
        };
        if let Err(error) = db::update_task_completion(id, toggled.is_completed, &self.conn) {
            tracing::warn!(task_id = %id, error = %format!("{error:#}"), "failed to toggle task");
            return Err(error.into());
        }
        self.load_tasks();
        Ok(toggled)
    }

    pub fn delete_task(&mut self, id: TaskId) -> Result<(), EngineError> {
        self.check_mutation_allowed()?;
        let _in_flight = self.guard.try_acquire().ok_or(EngineError::Busy)?;
        self.active_task(id)?;
        if let Err(error) = db::delete_task(id, &self.conn) {
            tracing::warn!(task_id = %id, error = %format!("{error:#}"), "failed to delete task");
            return Err(error.into());
        }
        self.load_tasks();
        Ok(())
    }

    /// Marks the transition pending once the active period has ended.
    pub fn check_period_end(&mut self) -> EndCheck {
        if self.guard.is_held() {
            tracing::debug!(retry_in = ?self.settings.retry_delay, "period check deferred");
            return EndCheck::Deferred(self.settings.retry_delay);
        }
        if self.transition_pending {
            return EndCheck::AlreadyPending;
        }
        if !self.periods.active().has_ended(self.now()) {
            return EndCheck::Active;
        }
        self.transition_pending = true;
        tracing::info!(period_id = %self.periods.active().id, "clock ended, transition pending");
        emit(
            &mut self.observers,
            &EngineEvent::TransitionPending(self.periods.active()),
        );
        EndCheck::Pending
    }

    /// Archives the active period and starts a new one, carrying over the
    /// selected unfinished tasks. Completed or unknown ids are ignored.
    pub fn resolve_transition(&mut self, selected: &[TaskId]) -> Result<Transition, EngineError> {
        if !self.transition_pending {
            return Err(EngineError::NoTransitionPending);
        }
        let _in_flight = self.guard.try_acquire().ok_or(EngineError::Busy)?;
        let now = self.now();
        let selected: HashSet<TaskId> = selected.iter().copied().collect();

        let staged = persist_transition(
            &mut self.conn,
            &self.periods,
            &selected,
            now,
            self.settings.period_days,
        );
        let (periods, transition) = match staged {
            Ok(staged) => staged,
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "transition failed, still pending");
                return Err(error.into());
            }
        };

        self.periods = periods;
        self.transition_pending = false;
        tracing::info!(
            archived = %transition.archived.id,
            current = %transition.current.id,
            migrated = transition.migrated.len(),
            "clock transition resolved"
        );
        self.load_tasks();
        emit(
            &mut self.observers,
            &EngineEvent::TransitionResolved {
                archived: &transition.archived,
                current: self.periods.active(),
            },
        );
        Ok(transition)
    }

    pub fn rename_period(&mut self, name: &str) -> Result<(), EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::EmptyName);
        }
        let _in_flight = self.guard.try_acquire().ok_or(EngineError::Busy)?;
        self.periods.rename_active(name, &self.conn)?;
        emit(
            &mut self.observers,
            &EngineEvent::PeriodRenamed(self.periods.active()),
        );
        Ok(())
    }

    pub fn add_task_type(&mut self, name: &str, color_name: &str) -> Result<TaskType, EngineError> {
        Ok(self.task_types.add(name, color_name, &self.conn)?)
    }

    pub fn remove_task_type(&mut self, id: TaskTypeId) -> Result<bool, EngineError> {
        Ok(self.task_types.remove(id, &self.conn)?)
    }

    /// Reads `id` from the store, refusing tasks outside the active period.
    fn active_task(&self, id: TaskId) -> Result<Task, EngineError> {
        match db::query_task_by_id(id, &self.conn) {
            Ok(Some(task)) if task.period_id == self.periods.active().id => Ok(task),
            Ok(_) => Err(EngineError::UnknownTask(id)),
            Err(error) => {
                tracing::warn!(task_id = %id, error = %format!("{error:#}"), "failed to read task");
                Err(error.into())
            }
        }
    }

    fn check_mutation_allowed(&self) -> Result<(), EngineError> {
        if self.transition_pending && self.settings.pending_policy == PendingPolicy::AllMutations {
            return Err(EngineError::TransitionPending);
        }
        Ok(())
    }
}

/// Writes the whole transition in one SQLite transaction and returns the
/// registry state to adopt once it committed.
fn persist_transition(
    conn: &mut Connection,
    periods: &PeriodRegistry,
    selected: &HashSet<TaskId>,
    now: DateTime<Utc>,
    period_days: i64,
) -> anyhow::Result<(PeriodRegistry, Transition)> {
    let tx = conn.transaction()?;
    let ending = periods.active().id;
    let tasks = db::query_tasks(TaskQuery::ByPeriod(ending), &tx)
        .context("reading tasks of the ending clock")?;
    let stats = PeriodStats::from_tasks(&tasks);

    let next = Period::new(now, period_days);
    let migrated: Vec<Task> = tasks
        .iter()
        .filter(|t| !t.is_completed && selected.contains(&t.id))
        .map(|t| Task {
            id: Uuid::new_v4(),
            is_completed: false,
            due_date: days_after(now, period_days),
            period_id: next.id,
            ..t.clone()
        })
        .collect();

    let mut staged = periods.clone();
    let archived = staged.archive(stats, next, &tx)?;
    for task in &migrated {
        db::create_task(task, &tx).context("migrating task")?;
    }
    db::delete_tasks_by_period(ending, &tx)?;
    tx.commit()?;

    let current = staged.active().clone();
    Ok((
        staged,
        Transition {
            archived,
            current,
            migrated,
        },
    ))
}

fn emit(observers: &mut [(Subscription, Observer)], event: &EngineEvent<'_>) {
    for (_, observer) in observers.iter_mut() {
        observer(event);
    }
}
