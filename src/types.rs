use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TaskId = Uuid;
pub type PeriodId = Uuid;
pub type TaskTypeId = Uuid;

/// Length of a clock period when nothing else is configured.
pub const DEFAULT_PERIOD_DAYS: i64 = 7;
/// Longest clock period accepted from configuration, about ten years.
pub const MAX_PERIOD_DAYS: i64 = 3650;
pub const DEFAULT_CLOCK_NAME: &str = "New Clock";
/// Name of the task type that can never be removed.
pub const DEFAULT_TYPE_NAME: &str = "None";
pub const DEFAULT_TYPE_COLOR: &str = "Blue";

/// Task priority, 1 (most urgent) to 4.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(1);
    pub const LOWEST: Priority = Priority(4);

    pub fn new(value: u8) -> Option<Self> {
        (Self::HIGHEST.0..=Self::LOWEST.0)
            .contains(&value)
            .then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::HIGHEST
    }
}

///A single to-do item, owned by exactly one period.
///
/// `type_name` and `color` are copies taken when the task is created, so
/// later edits to the task type never relabel existing tasks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub is_completed: bool,
    pub priority: Priority,
    pub due_date: DateTime<Utc>,
    pub original_due_date: DateTime<Utc>,
    pub type_name: String,
    pub color: String,
    pub period_id: PeriodId,
}

impl Task {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && self.due_date < now
    }

    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && self.due_date >= now
    }

    /// Overdue tasks are drawn gray regardless of their type color.
    pub fn display_color(&self, now: DateTime<Utc>) -> &str {
        if self.is_overdue(now) {
            crate::color::OVERDUE_COLOR
        } else {
            &self.color
        }
    }
}

pub enum TaskQuery {
    ByPeriod(PeriodId),
}

/// Counts frozen into a period when it is archived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeriodStats {
    pub total: u32,
    pub completed: u32,
}

impl PeriodStats {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        tasks.into_iter().fold(Self::default(), |mut stats, task| {
            stats.total += 1;
            if task.is_completed {
                stats.completed += 1;
            }
            stats
        })
    }

    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.completed) / f64::from(self.total)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grade {
    Good,
    Fair,
    Poor,
}

/// A clock: the bounded window tasks are tracked in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub id: PeriodId,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_archived: bool,
    pub completion_rate: f64,
    pub total_tasks: u32,
    pub completed_tasks: u32,
}

impl Period {
    pub fn new(start_date: DateTime<Utc>, period_days: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: DEFAULT_CLOCK_NAME.to_string(),
            start_date,
            end_date: days_after(start_date, period_days),
            is_archived: false,
            completion_rate: 0.0,
            total_tasks: 0,
            completed_tasks: 0,
        }
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_date
    }

    /// Returns the archived form of this period with `stats` frozen in.
    pub fn archived(&self, stats: PeriodStats) -> Self {
        Self {
            is_archived: true,
            total_tasks: stats.total,
            completed_tasks: stats.completed,
            completion_rate: stats.completion_rate(),
            ..self.clone()
        }
    }

    pub fn grade(&self) -> Grade {
        if self.completion_rate >= 0.8 {
            Grade::Good
        } else if self.completion_rate >= 0.5 {
            Grade::Fair
        } else {
            Grade::Poor
        }
    }
}

/// `start` plus `days`, saturating at the latest representable instant.
pub fn days_after(start: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    TimeDelta::try_days(days)
        .and_then(|delta| start.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A user-defined category label with a palette color.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskType {
    pub id: TaskTypeId,
    pub name: String,
    pub color_name: String,
}

impl TaskType {
    pub fn new(name: impl Into<String>, color_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            color_name: color_name.into(),
        }
    }

    pub fn none() -> Self {
        Self::new(DEFAULT_TYPE_NAME, DEFAULT_TYPE_COLOR)
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_TYPE_NAME
    }
}
