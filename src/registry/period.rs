/// The active clock period plus every archived one.
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::db;
use crate::types::{Period, PeriodStats};

#[derive(Clone, Debug)]
pub struct PeriodRegistry {
    active: Period,
    archived: Vec<Period>,
}

impl PeriodRegistry {
    /// Loads the stored periods and splits them into the active one and the
    /// archive. A missing or unreadable collection, or one without an
    /// unarchived entry, gets a fresh period starting at `now`.
    pub fn load(conn: &Connection, now: DateTime<Utc>, period_days: i64) -> Self {
        let stored = match db::load_json::<Vec<Period>>(db::CLOCKS_KEY, conn) {
            Ok(stored) => stored.unwrap_or_default(),
            Err(error) => {
                tracing::warn!(%error, "could not read stored clocks, starting fresh");
                Vec::new()
            }
        };

        let mut active = None;
        let mut archived = Vec::new();
        for period in stored {
            if period.is_archived {
                archived.push(period);
            } else if active.is_none() {
                active = Some(period);
            } else {
                tracing::warn!(period_id = %period.id, "extra unarchived clock found, archiving it");
                archived.push(Period {
                    is_archived: true,
                    ..period
                });
            }
        }

        match active {
            Some(active) => Self { active, archived },
            None => {
                let active = Period::new(now, period_days);
                tracing::info!(period_id = %active.id, "no active clock stored, created a new one");
                let registry = Self { active, archived };
                if let Err(error) = registry.save(conn) {
                    tracing::warn!(%error, "could not persist the new clock");
                }
                registry
            }
        }
    }

    pub fn active(&self) -> &Period {
        &self.active
    }

    /// Archived periods, most recently ended first.
    pub fn shelf(&self) -> Vec<&Period> {
        let mut shelf: Vec<&Period> = self.archived.iter().collect();
        shelf.sort_by(|a, b| b.end_date.cmp(&a.end_date));
        shelf
    }

    /// Replaces the active period. The replacement is stored unarchived.
    pub fn set_active(&mut self, period: Period, conn: &Connection) -> Result<()> {
        let period = Period {
            is_archived: false,
            ..period
        };
        let previous = std::mem::replace(&mut self.active, period);
        if let Err(error) = self.save(conn) {
            self.active = previous;
            return Err(error);
        }
        Ok(())
    }

    pub fn rename_active(&mut self, name: &str, conn: &Connection) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            bail!("clock name cannot be empty");
        }
        let renamed = Period {
            name: name.to_string(),
            ..self.active.clone()
        };
        self.set_active(renamed, conn)
    }

    /// Freezes `stats` into the active period, moves it to the archive and
    /// makes `next` the active period. Returns the archived record.
    pub fn archive(
        &mut self,
        stats: PeriodStats,
        next: Period,
        conn: &Connection,
    ) -> Result<Period> {
        let finished = self.active.archived(stats);
        let mut archived = self.archived.clone();
        match archived.iter_mut().find(|p| p.id == finished.id) {
            Some(slot) => *slot = finished.clone(),
            None => archived.push(finished.clone()),
        }
        let staged = Self {
            active: Period {
                is_archived: false,
                ..next
            },
            archived,
        };
        staged.save(conn)?;
        *self = staged;
        Ok(finished)
    }

    fn save(&self, conn: &Connection) -> Result<()> {
        let mut all = self.archived.clone();
        all.push(self.active.clone());
        db::save_json(db::CLOCKS_KEY, &all, conn)
    }
}
