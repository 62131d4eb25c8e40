/// User-defined task categories. The "None" type is always present.
use rusqlite::Connection;
use thiserror::Error;

use crate::color;
use crate::db;
use crate::types::{DEFAULT_TYPE_NAME, TaskType, TaskTypeId};

#[derive(Debug, Error)]
pub enum TaskTypeError {
    #[error("task type name cannot be empty")]
    EmptyName,
    #[error("a task type named '{0}' already exists")]
    Duplicate(String),
    #[error("unknown color '{0}', pick one of: {palette}", palette = color::PALETTE.join(", "))]
    UnknownColor(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Clone, Debug)]
pub struct TaskTypeRegistry {
    types: Vec<TaskType>,
}

impl TaskTypeRegistry {
    /// Loads stored types, reinserting the default type when it is missing.
    pub fn load(conn: &Connection) -> Self {
        let stored = match db::load_json::<Vec<TaskType>>(db::TASK_TYPES_KEY, conn) {
            Ok(stored) => stored.unwrap_or_default(),
            Err(error) => {
                tracing::warn!(%error, "could not read stored task types, using defaults");
                Vec::new()
            }
        };
        Self {
            types: with_single_default(stored),
        }
    }

    pub fn list(&self) -> &[TaskType] {
        &self.types
    }

    pub fn find(&self, name: &str) -> Option<&TaskType> {
        let name = name.trim();
        self.types.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn default_type(&self) -> &TaskType {
        self.types
            .iter()
            .find(|t| t.is_default())
            .unwrap_or(&self.types[0])
    }

    pub fn add(
        &mut self,
        name: &str,
        color_name: &str,
        conn: &Connection,
    ) -> Result<TaskType, TaskTypeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TaskTypeError::EmptyName);
        }
        if self.find(name).is_some() {
            return Err(TaskTypeError::Duplicate(name.to_string()));
        }
        let color_name = color::palette_name(color_name)
            .ok_or_else(|| TaskTypeError::UnknownColor(color_name.to_string()))?;

        let task_type = TaskType::new(name, color_name);
        let mut types = self.types.clone();
        types.push(task_type.clone());
        db::save_json(db::TASK_TYPES_KEY, &types, conn)?;
        self.types = types;
        tracing::debug!(name, color = color_name, "task type added");
        Ok(task_type)
    }

    /// Removes the type with `id`. Returns `false` when nothing was removed,
    /// which includes any attempt to remove the default type.
    pub fn remove(&mut self, id: TaskTypeId, conn: &Connection) -> Result<bool, TaskTypeError> {
        let Some(target) = self.types.iter().find(|t| t.id == id) else {
            return Ok(false);
        };
        if target.is_default() {
            tracing::debug!("refusing to remove the default task type");
            return Ok(false);
        }
        let types: Vec<TaskType> = self.types.iter().filter(|t| t.id != id).cloned().collect();
        db::save_json(db::TASK_TYPES_KEY, &types, conn)?;
        self.types = types;
        Ok(true)
    }
}

fn with_single_default(stored: Vec<TaskType>) -> Vec<TaskType> {
    let mut types = Vec::with_capacity(stored.len() + 1);
    let mut seen_default = false;
    for task_type in stored {
        if task_type.name == DEFAULT_TYPE_NAME {
            if seen_default {
                continue;
            }
            seen_default = true;
        }
        types.push(task_type);
    }
    if !seen_default {
        types.insert(0, TaskType::none());
    }
    types
}
