/// Database migrations and schema management.
use anyhow::Result;
use rusqlite::Connection;

/// Creates the schema if it doesn't exist yet.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            id                TEXT    PRIMARY KEY,
            title             TEXT    NOT NULL,
            is_completed      INTEGER NOT NULL DEFAULT 0,
            priority          INTEGER NOT NULL,
            due_date          TEXT    NOT NULL,
            original_due_date TEXT    NOT NULL,
            type_name         TEXT    NOT NULL,
            color             TEXT    NOT NULL,
            period_id         TEXT    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_period ON tasks(period_id);

        CREATE TABLE IF NOT EXISTS settings (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}
