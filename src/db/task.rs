/// Task database queries.
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, types::Type};
use uuid::Uuid;

use crate::types::{PeriodId, Priority, Task, TaskId, TaskQuery};

const TASK_COLUMNS: &str = "id, title, is_completed, priority, due_date, original_due_date, type_name, color, period_id";

pub fn create_task(task: &Task, conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks (id, title, is_completed, priority, due_date, original_due_date, type_name, color, period_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            task.id.to_string(),
            task.title,
            task.is_completed,
            task.priority.value(),
            format_datetime(task.due_date),
            format_datetime(task.original_due_date),
            task.type_name,
            task.color,
            task.period_id.to_string(),
        ],
    )?;
    Ok(())
}

/// Returns tasks matching `query`, sorted by due date ascending.
pub fn query_tasks(query: TaskQuery, conn: &Connection) -> Result<Vec<Task>> {
    match query {
        TaskQuery::ByPeriod(period_id) => {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE period_id = ?1 ORDER BY due_date ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([period_id.to_string()], row_to_task)?;
            collect_rows(rows)
        }
    }
}

pub fn query_task_by_id(id: TaskId, conn: &Connection) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    let task = conn
        .query_row(&sql, [id.to_string()], row_to_task)
        .optional()?;
    Ok(task)
}

/// Sets the completion flag, returning whether a row was touched.
pub fn update_task_completion(id: TaskId, is_completed: bool, conn: &Connection) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE tasks SET is_completed = ?1 WHERE id = ?2",
        rusqlite::params![is_completed, id.to_string()],
    )?;
    Ok(changed > 0)
}

pub fn delete_task(id: TaskId, conn: &Connection) -> Result<bool> {
    let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", [id.to_string()])?;
    Ok(changed > 0)
}

pub fn delete_tasks_by_period(period_id: PeriodId, conn: &Connection) -> Result<usize> {
    let changed = conn.execute(
        "DELETE FROM tasks WHERE period_id = ?1",
        [period_id.to_string()],
    )?;
    Ok(changed)
}

fn collect_rows(rows: impl Iterator<Item = rusqlite::Result<Task>>) -> Result<Vec<Task>> {
    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?);
    }
    Ok(tasks)
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let raw_priority: u8 = row.get(3)?;
    let priority = Priority::new(raw_priority).ok_or_else(|| {
        conversion_error(3, Type::Integer, format!("priority {raw_priority} out of range"))
    })?;
    Ok(Task {
        id: parse_uuid(row, 0)?,
        title: row.get(1)?,
        is_completed: row.get(2)?,
        priority,
        due_date: parse_datetime(row, 4)?,
        original_due_date: parse_datetime(row, 5)?,
        type_name: row.get(6)?,
        color: row.get(7)?,
        period_id: parse_uuid(row, 8)?,
    })
}

fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, Type::Text, e.to_string()))
}

/// Fixed-width UTC text so `ORDER BY due_date` sorts chronologically.
fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, Type::Text, e.to_string()))
}

fn conversion_error(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, message.into())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::db;

    fn sample(period_id: PeriodId, title: &str, due_in_days: i64) -> Task {
        let due = Utc.with_ymd_and_hms(2025, 3, 20, 8, 0, 0).unwrap() + Duration::days(due_in_days);
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            is_completed: false,
            priority: Priority::new(2).unwrap(),
            due_date: due,
            original_due_date: due,
            type_name: "Errands".to_string(),
            color: "Mint".to_string(),
            period_id,
        }
    }

    fn count_all(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?)
    }

    #[test]
    fn tasks_are_scoped_and_sorted_by_due_date() -> Result<()> {
        let conn = db::init_in_memory()?;
        let period = Uuid::new_v4();
        let other = Uuid::new_v4();
        create_task(&sample(period, "later", 5), &conn)?;
        create_task(&sample(period, "sooner", 1), &conn)?;
        create_task(&sample(other, "elsewhere", 0), &conn)?;

        let titles: Vec<String> = query_tasks(TaskQuery::ByPeriod(period), &conn)?
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, ["sooner", "later"]);
        assert_eq!(count_all(&conn)?, 3);
        Ok(())
    }

    #[test]
    fn stored_task_reads_back_identically() -> Result<()> {
        let conn = db::init_in_memory()?;
        let task = sample(Uuid::new_v4(), "file taxes", 2);
        create_task(&task, &conn)?;
        assert_eq!(query_task_by_id(task.id, &conn)?, Some(task));
        Ok(())
    }

    #[test]
    fn completion_update_and_delete_report_misses() -> Result<()> {
        let conn = db::init_in_memory()?;
        let task = sample(Uuid::new_v4(), "call mum", 1);
        create_task(&task, &conn)?;

        assert!(update_task_completion(task.id, true, &conn)?);
        assert!(query_task_by_id(task.id, &conn)?.is_some_and(|t| t.is_completed));
        assert!(!update_task_completion(Uuid::new_v4(), true, &conn)?);

        assert!(delete_task(task.id, &conn)?);
        assert!(!delete_task(task.id, &conn)?);
        Ok(())
    }

    #[test]
    fn delete_by_period_leaves_other_periods() -> Result<()> {
        let conn = db::init_in_memory()?;
        let period = Uuid::new_v4();
        let other = Uuid::new_v4();
        create_task(&sample(period, "a", 1), &conn)?;
        create_task(&sample(period, "b", 2), &conn)?;
        create_task(&sample(other, "c", 3), &conn)?;

        assert_eq!(delete_tasks_by_period(period, &conn)?, 2);
        assert_eq!(count_all(&conn)?, 1);
        Ok(())
    }

    #[test]
    fn corrupt_row_is_a_read_error() -> Result<()> {
        let conn = db::init_in_memory()?;
        let task = sample(Uuid::new_v4(), "broken", 1);
        create_task(&task, &conn)?;
        conn.execute("UPDATE tasks SET due_date = 'yesterday'", [])?;
        assert!(query_tasks(TaskQuery::ByPeriod(task.period_id), &conn).is_err());
        Ok(())
    }
}
