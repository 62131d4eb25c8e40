use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;

use super::{EndCheck, Engine};

/// Drives [`Engine::check_period_end`] on a fixed interval, re-polling
/// sooner when the engine defers the check.
#[derive(Clone, Debug)]
pub struct PeriodWatch {
    interval: TimeDelta,
    next_check: DateTime<Utc>,
}

impl PeriodWatch {
    /// The first check is due immediately.
    pub fn new(interval: std::time::Duration, now: DateTime<Utc>) -> Self {
        Self {
            interval: to_delta(interval),
            next_check: now,
        }
    }

    pub fn next_check(&self) -> DateTime<Utc> {
        self.next_check
    }

    /// How long to sleep before the next check is due.
    pub fn until_next(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.next_check - now).to_std().unwrap_or_default()
    }

    /// Runs the check if it is due and schedules the next one.
    pub fn tick<C: Clock>(&mut self, engine: &mut Engine<C>, now: DateTime<Utc>) -> Option<EndCheck> {
        if now < self.next_check {
            return None;
        }
        let outcome = engine.check_period_end();
        let wait = match outcome {
            EndCheck::Deferred(retry) => to_delta(retry),
            _ => self.interval,
        };
        self.next_check = now.checked_add_signed(wait).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Some(outcome)
    }
}

fn to_delta(duration: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use rstest::rstest;

    use super::*;
    use crate::db;
    use crate::engine::EngineSettings;
    use crate::engine::testing::{ManualClock, t0};

    fn engine(clock: &ManualClock) -> Engine<ManualClock> {
        Engine::new(db::init_in_memory().unwrap(), clock.clone(), EngineSettings::default())
    }

    #[rstest]
    fn checks_only_when_due() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);
        let mut watch = PeriodWatch::new(StdDuration::from_secs(3600), t0());

        assert_eq!(watch.tick(&mut engine, t0()), Some(EndCheck::Active));
        assert_eq!(watch.next_check(), t0() + Duration::hours(1));
        assert_eq!(watch.tick(&mut engine, t0() + Duration::minutes(59)), None);
        assert_eq!(watch.until_next(t0() + Duration::minutes(59)), StdDuration::from_secs(60));
        assert_eq!(
            watch.tick(&mut engine, t0() + Duration::hours(1)),
            Some(EndCheck::Active)
        );
    }

    #[rstest]
    fn deferral_reschedules_with_retry_delay() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);
        clock.advance(Duration::days(8));
        let now = clock.utc();
        let mut watch = PeriodWatch::new(StdDuration::from_secs(3600), now);

        let held = engine.guard().try_acquire();
        assert_eq!(
            watch.tick(&mut engine, now),
            Some(EndCheck::Deferred(StdDuration::from_secs(5)))
        );
        assert_eq!(watch.next_check(), now + Duration::seconds(5));
        drop(held);

        let later = now + Duration::seconds(5);
        assert_eq!(watch.tick(&mut engine, later), Some(EndCheck::Pending));
        assert_eq!(watch.next_check(), later + Duration::hours(1));
        assert_eq!(
            watch.tick(&mut engine, later + Duration::hours(1)),
            Some(EndCheck::AlreadyPending)
        );
    }

    #[rstest]
    fn overdue_schedule_sleeps_zero() {
        let watch = PeriodWatch::new(StdDuration::from_secs(60), t0());
        assert_eq!(watch.until_next(t0() + Duration::hours(2)), StdDuration::ZERO);
    }
}
