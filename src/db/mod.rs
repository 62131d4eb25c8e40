/// Database module with task queries, the settings blob store and migrations.
mod migrations;
mod settings;
mod task;

use anyhow::Result;
use rusqlite::Connection;

pub use settings::{load_json, save_json, upsert_setting};
pub use task::{
    create_task, delete_task, delete_tasks_by_period, query_task_by_id, query_tasks,
    update_task_completion,
};

/// Settings key holding every clock period, active and archived.
pub const CLOCKS_KEY: &str = "sandclock.clocks";
/// Settings key holding the user's task types.
pub const TASK_TYPES_KEY: &str = "sandclock.task_types";

/// Opens (or creates) the SQLite database and runs migrations.
pub fn init(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

/// Opens a throwaway database, used by tests.
#[cfg(test)]
pub fn init_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

/// Returns the default database path inside the user's data directory.
/// Falls back to `./sandclock.db` when no data dir is found.
pub fn default_db_path() -> String {
    if let Some(data_dir) = dirs::data_local_dir() {
        let app_dir = data_dir.join("sandclock");
        std::fs::create_dir_all(&app_dir).ok();
        app_dir.join("sandclock.db").to_string_lossy().into_owned()
    } else {
        "sandclock.db".to_string()
    }
}
