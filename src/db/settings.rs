/// Key-value settings store, used for the small serialized collections.
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::{Serialize, de::DeserializeOwned};

pub fn query_setting(key: &str, conn: &Connection) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

pub fn upsert_setting(key: &str, value: &str, conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, value),
    )?;
    Ok(())
}

/// Reads and decodes the JSON blob stored under `key`, if any.
pub fn load_json<T: DeserializeOwned>(key: &str, conn: &Connection) -> Result<Option<T>> {
    match query_setting(key, conn)? {
        Some(raw) => {
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("setting '{key}' holds malformed JSON"))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize + ?Sized>(key: &str, value: &T, conn: &Connection) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    upsert_setting(key, &raw, conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn missing_key_reads_as_none() -> Result<()> {
        let conn = db::init_in_memory()?;
        assert_eq!(query_setting("nope", &conn)?, None);
        assert_eq!(load_json::<Vec<String>>("nope", &conn)?, None);
        Ok(())
    }

    #[test]
    fn upsert_overwrites_previous_value() -> Result<()> {
        let conn = db::init_in_memory()?;
        save_json("labels", &["a", "b"], &conn)?;
        save_json("labels", &["c"], &conn)?;
        assert_eq!(load_json::<Vec<String>>("labels", &conn)?, Some(vec!["c".to_string()]));
        Ok(())
    }

    #[test]
    fn malformed_blob_is_an_error() -> Result<()> {
        let conn = db::init_in_memory()?;
        upsert_setting("labels", "{not json", &conn)?;
        assert!(load_json::<Vec<String>>("labels", &conn).is_err());
        Ok(())
    }
}
