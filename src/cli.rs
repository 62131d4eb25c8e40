/// CLI argument parsing and command handling.
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Local, NaiveDate, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use mockable::Clock;

use crate::color;
use crate::engine::{EndCheck, Engine, EngineError, EngineEvent, NewTask, PeriodWatch};
use crate::types::{Period, Task, TaskId};

#[derive(Parser)]
#[command(
    name = "sandclock",
    version,
    about = "SandClock - to-dos that fall through an hourglass"
)]
pub struct Cli {
    /// Database file to use instead of the default one.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    /// Config file to use instead of the default one.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the current clock and its tasks at a glance.
    Status,
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    Clock {
        #[command(subcommand)]
        command: ClockCommand,
    },
    Type {
        #[command(subcommand)]
        command: TypeCommand,
    },
    /// Stay in the foreground and report when the current clock ends.
    Watch,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    Add {
        title: String,
        #[arg(short = 'p', long = "priority", default_value_t = 1)]
        priority: u8,
        /// RFC 3339 timestamp, YYYY-MM-DD, or an offset like +2d / +6h.
        #[arg(short = 'd', long = "due")]
        due: Option<String>,
        #[arg(short = 't', long = "type")]
        task_type: Option<String>,
        #[arg(short = 'c', long = "color")]
        color: Option<String>,
    },
    List,
    Toggle {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ClockCommand {
    Rename {
        name: String,
    },
    /// Archive the ended clock and start a new one. Tasks not kept are dropped.
    Transition {
        #[arg(short = 'k', long = "keep")]
        keep: Vec<String>,
    },
    /// List archived clocks, newest first.
    Shelf,
}

#[derive(Subcommand, Debug)]
pub enum TypeCommand {
    List,
    Add {
        name: String,
        color: Option<String>,
    },
    Remove {
        name: String,
    },
}

/// Execute a CLI command against the engine.
pub fn run<C: Clock>(
    command: Command,
    engine: &mut Engine<C>,
    check_interval: Duration,
) -> Result<()> {
    if !matches!(command, Command::Watch) {
        let pending = matches!(
            engine.check_period_end(),
            EndCheck::Pending | EndCheck::AlreadyPending
        );
        let resolving = matches!(
            command,
            Command::Clock {
                command: ClockCommand::Transition { .. }
            }
        );
        if pending && !resolving {
            println!(
                "'{}' ended on {}. Run `sandclock clock transition` to start a new clock.",
                engine.current_period().name,
                format_local(engine.current_period().end_date)
            );
        }
    }

    match command {
        Command::Status => handle_status(engine),
        Command::Task { command } => match command {
            TaskCommand::Add {
                title,
                priority,
                due,
                task_type,
                color,
            } => handle_task_add(engine, title, priority, due, task_type, color),
            TaskCommand::List => handle_task_list(engine),
            TaskCommand::Toggle { id } => {
                let id = resolve_task_id(engine.tasks().iter(), &id)?;
                let task = engine.toggle_completion(id)?;
                let state = if task.is_completed { "done" } else { "not done" };
                println!("Marked '{}' as {state}.", task.title);
                Ok(())
            }
            TaskCommand::Delete { id } => {
                let id = resolve_task_id(engine.tasks().iter(), &id)?;
                engine.delete_task(id)?;
                println!("Task deleted.");
                Ok(())
            }
        },
        Command::Clock { command } => match command {
            ClockCommand::Rename { name } => {
                engine.rename_period(&name)?;
                println!("Clock renamed to '{}'.", engine.current_period().name);
                Ok(())
            }
            ClockCommand::Transition { keep } => handle_transition(engine, &keep),
            ClockCommand::Shelf => {
                handle_shelf(engine.shelf());
                Ok(())
            }
        },
        Command::Type { command } => handle_type(engine, command),
        Command::Watch => handle_watch(engine, check_interval),
    }
}

fn handle_status<C: Clock>(engine: &Engine<C>) -> Result<()> {
    let period = engine.current_period();
    let now = engine.now();
    println!("{}", period.name);
    println!(
        "  {} -> {}",
        format_local(period.start_date),
        format_local(period.end_date)
    );
    if period.has_ended(now) {
        println!("  ended");
    } else {
        println!("  {} left", format_remaining(period.end_date - now));
    }
    println!(
        "  {} pending, {} overdue, {} completed",
        engine.pending_tasks().len(),
        engine.overdue_tasks().len(),
        engine.completed_tasks().len()
    );
    Ok(())
}

fn handle_task_add<C: Clock>(
    engine: &mut Engine<C>,
    title: String,
    priority: u8,
    due: Option<String>,
    task_type: Option<String>,
    color: Option<String>,
) -> Result<()> {
    // Refuse before a missing type gets created as a side effect.
    if engine.is_transition_pending() {
        return Err(EngineError::TransitionPending.into());
    }
    let now = engine.now();
    let due_date = match due {
        Some(raw) => parse_due(&raw, now)?,
        None => now,
    };
    if let Some(color) = &color {
        if color::palette_name(color).is_none() {
            bail!(
                "Unknown color '{color}'. Pick one of: {}",
                color::PALETTE.join(", ")
            );
        }
    }
    let task_type = match task_type {
        Some(name) => match engine.task_types().find(&name).cloned() {
            Some(found) => found,
            None => {
                println!("Type '{name}' not found, creating it with a random color.");
                engine.add_task_type(&name, &color::random_color())?
            }
        },
        None => engine.task_types().default_type().clone(),
    };
    let task = engine.add_task(NewTask {
        title,
        priority,
        due_date,
        task_type,
        color,
    })?;
    println!("Added '{}' ({}).", task.title, short_id(task.id));
    Ok(())
}

fn handle_task_list<C: Clock>(engine: &Engine<C>) -> Result<()> {
    let now = engine.now();
    let sections = [
        ("Pending", engine.pending_tasks()),
        ("Overdue", engine.overdue_tasks()),
        ("Completed", engine.completed_tasks()),
    ];
    for (heading, tasks) in sections {
        println!("{heading} ({})", tasks.len());
        for task in tasks {
            println!("  {}", format_task(task, now));
        }
    }
    Ok(())
}

fn handle_transition<C: Clock>(engine: &mut Engine<C>, keep: &[String]) -> Result<()> {
    if !engine.is_transition_pending() {
        println!(
            "'{}' is still running until {}.",
            engine.current_period().name,
            format_local(engine.current_period().end_date)
        );
        return Ok(());
    }
    let selected = keep
        .iter()
        .map(|prefix| resolve_task_id(engine.unfinished_tasks().into_iter(), prefix))
        .collect::<Result<Vec<TaskId>>>()?;
    let transition = engine.resolve_transition(&selected)?;
    println!(
        "Archived '{}': {}/{} tasks done ({:.0}%).",
        transition.archived.name,
        transition.archived.completed_tasks,
        transition.archived.total_tasks,
        transition.archived.completion_rate * 100.0
    );
    println!(
        "Started a new clock ending {}, carried over {} task(s).",
        format_local(transition.current.end_date),
        transition.migrated.len()
    );
    Ok(())
}

fn handle_shelf(shelf: Vec<&Period>) {
    if shelf.is_empty() {
        println!("The shelf is empty.");
        return;
    }
    for period in shelf {
        println!(
            "{:<24} {:>4.0}%  {}/{} tasks  {:?}  {} -> {}",
            period.name,
            period.completion_rate * 100.0,
            period.completed_tasks,
            period.total_tasks,
            period.grade(),
            format_local(period.start_date),
            format_local(period.end_date)
        );
    }
}

fn handle_type<C: Clock>(engine: &mut Engine<C>, command: TypeCommand) -> Result<()> {
    match command {
        TypeCommand::List => {
            for task_type in engine.task_types().list() {
                println!("{:<16} {}", task_type.name, task_type.color_name);
            }
        }
        TypeCommand::Add { name, color } => {
            let color = color.unwrap_or_else(color::random_color);
            let added = engine.add_task_type(&name, &color)?;
            println!("Added type '{}' ({}).", added.name, added.color_name);
        }
        TypeCommand::Remove { name } => {
            let Some(id) = engine.task_types().find(&name).map(|t| t.id) else {
                println!("Type '{name}' not found.");
                return Ok(());
            };
            if engine.remove_task_type(id)? {
                println!("Removed type '{name}'.");
            } else {
                println!("The default type cannot be removed.");
            }
        }
    }
    Ok(())
}

fn handle_watch<C: Clock>(engine: &mut Engine<C>, check_interval: Duration) -> Result<()> {
    let mut watch = PeriodWatch::new(check_interval, engine.now());
    tracing::info!(period_id = %engine.current_period().id, "watching clock");
    let subscription = engine.subscribe(log_event);
    let outcome = watch_until_ended(engine, &mut watch);
    engine.unsubscribe(subscription);
    outcome
}

fn watch_until_ended<C: Clock>(engine: &mut Engine<C>, watch: &mut PeriodWatch) -> Result<()> {
    loop {
        let now = engine.now();
        match watch.tick(engine, now) {
            Some(EndCheck::Pending | EndCheck::AlreadyPending) => {
                println!(
                    "'{}' has ended. Run `sandclock clock transition` to start a new clock.",
                    engine.current_period().name
                );
                return Ok(());
            }
            Some(EndCheck::Deferred(retry)) => {
                tracing::debug!(?retry, "check deferred");
            }
            Some(EndCheck::Active) => {
                tracing::info!(next_check = %watch.next_check(), "clock still running");
            }
            None => {}
        }
        std::thread::sleep(watch.until_next(engine.now()));
    }
}

fn log_event(event: &EngineEvent<'_>) {
    match event {
        EngineEvent::TasksReloaded(tasks) => tracing::debug!(count = tasks.len(), "tasks reloaded"),
        EngineEvent::TransitionPending(period) => {
            tracing::info!(period_id = %period.id, ended = %period.end_date, "transition pending")
        }
        EngineEvent::TransitionResolved { archived, current } => {
            tracing::info!(archived = %archived.id, current = %current.id, "transition resolved")
        }
        EngineEvent::PeriodRenamed(period) => tracing::info!(name = %period.name, "clock renamed"),
    }
}

/// Finds the single task whose id starts with `prefix`.
fn resolve_task_id<'a>(tasks: impl Iterator<Item = &'a Task>, prefix: &str) -> Result<TaskId> {
    let prefix = prefix.trim().to_ascii_lowercase();
    if prefix.is_empty() {
        bail!("Task id cannot be empty");
    }
    let matches: Vec<TaskId> = tasks
        .filter(|t| t.id.to_string().starts_with(&prefix))
        .map(|t| t.id)
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(anyhow!("No task matches '{prefix}'")),
        _ => Err(anyhow!("'{prefix}' matches several tasks, use a longer prefix")),
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD` (end of that local day) or `+<n>d` / `+<n>h`.
fn parse_due(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Some(offset) = value.strip_prefix('+') {
        let unit_start = offset.char_indices().last().map_or(0, |(i, _)| i);
        let (amount, unit) = offset.split_at(unit_start);
        let amount: i64 = amount
            .parse()
            .map_err(|_| anyhow!("Invalid offset '{value}', expected e.g. +3d or +6h"))?;
        let delta = match unit {
            "d" => TimeDelta::try_days(amount),
            "h" => TimeDelta::try_hours(amount),
            _ => None,
        }
        .ok_or_else(|| anyhow!("Invalid offset '{value}', expected e.g. +3d or +6h"))?;
        return now
            .checked_add_signed(delta)
            .ok_or_else(|| anyhow!("Offset '{value}' is out of range"));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let end_of_day = date
            .and_hms_opt(23, 59, 59)
            .and_then(|naive| naive.and_local_timezone(Local).earliest())
            .ok_or_else(|| anyhow!("'{value}' is not a valid local date"))?;
        return Ok(end_of_day.with_timezone(&Utc));
    }
    let parsed = DateTime::parse_from_rfc3339(value)
        .map_err(|e| anyhow!("Invalid due date '{value}': {e}"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn format_task(task: &Task, now: DateTime<Utc>) -> String {
    let check = if task.is_completed { "x" } else { " " };
    format!(
        "[{check}] {} {:<32} p{} ({:<6}) {:<8} {:<10} due {}",
        short_id(task.id),
        task.title,
        task.priority.value(),
        color::priority_color(task.priority),
        task.display_color(now),
        task.type_name,
        format_local(task.due_date)
    )
}

fn short_id(id: TaskId) -> String {
    id.to_string()[..8].to_string()
}

fn format_local(value: DateTime<Utc>) -> String {
    value.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn format_remaining(remaining: TimeDelta) -> String {
    let days = remaining.num_days();
    let hours = remaining.num_hours() - days * 24;
    if days > 0 {
        format!("{days}d {hours}h")
    } else {
        format!("{hours}h {}m", remaining.num_minutes() - remaining.num_hours() * 60)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rstest::rstest;
    use uuid::Uuid;

    use super::*;
    use crate::engine::EngineSettings;
    use crate::engine::testing::ManualClock;
    use crate::types::Priority;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 24, 9, 0, 0).unwrap()
    }

    fn task_with_id(id: &str) -> Task {
        Task {
            id: Uuid::parse_str(id).unwrap(),
            title: "t".to_string(),
            is_completed: false,
            priority: Priority::default(),
            due_date: now(),
            original_due_date: now(),
            type_name: "None".to_string(),
            color: "Blue".to_string(),
            period_id: Uuid::new_v4(),
        }
    }

    #[rstest]
    #[case("+2d", now() + Duration::days(2))]
    #[case("+6h", now() + Duration::hours(6))]
    #[case("2025-03-30T10:00:00Z", Utc.with_ymd_and_hms(2025, 3, 30, 10, 0, 0).unwrap())]
    fn due_dates_parse(#[case] input: &str, #[case] expected: DateTime<Utc>) {
        assert_eq!(parse_due(input, now()).unwrap(), expected);
    }

    #[rstest]
    #[case("+2w")]
    #[case("+d")]
    #[case("tomorrow")]
    fn bad_due_dates_are_rejected(#[case] input: &str) {
        assert!(parse_due(input, now()).is_err());
    }

    #[rstest]
    fn plain_date_means_end_of_local_day() {
        let due = parse_due("2025-04-01", now()).unwrap().with_timezone(&Local);
        assert_eq!(due.format("%Y-%m-%d %H:%M:%S").to_string(), "2025-04-01 23:59:59");
    }

    #[rstest]
    fn task_ids_resolve_by_unique_prefix() {
        let tasks = [
            task_with_id("aaaa1111-0000-4000-8000-000000000000"),
            task_with_id("aaaa2222-0000-4000-8000-000000000000"),
            task_with_id("bbbb3333-0000-4000-8000-000000000000"),
        ];
        assert_eq!(resolve_task_id(tasks.iter(), "AAAA2").unwrap(), tasks[1].id);
        assert_eq!(resolve_task_id(tasks.iter(), "b").unwrap(), tasks[2].id);
        assert!(resolve_task_id(tasks.iter(), "aaaa").is_err());
        assert!(resolve_task_id(tasks.iter(), "cc").is_err());
        assert!(resolve_task_id(tasks.iter(), " ").is_err());
    }

    #[rstest]
    fn remaining_time_is_human_readable() {
        assert_eq!(format_remaining(Duration::days(2) + Duration::hours(3)), "2d 3h");
        assert_eq!(format_remaining(Duration::minutes(125)), "2h 5m");
    }

    #[rstest]
    fn cli_parses_transition_keeps() {
        let cli = Cli::try_parse_from([
            "sandclock", "clock", "transition", "-k", "ab12", "--keep", "cd34",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Clock {
                command: ClockCommand::Transition { keep },
            }) => assert_eq!(keep, ["ab12", "cd34"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[rstest]
    fn task_add_while_pending_creates_no_type() {
        let clock = ManualClock::new(now());
        let conn = crate::db::init_in_memory().unwrap();
        let mut engine = Engine::new(conn, clock.clone(), EngineSettings::default());
        clock.advance(Duration::days(8));
        assert_eq!(engine.check_period_end(), EndCheck::Pending);

        let error = handle_task_add(
            &mut engine,
            "file taxes".to_string(),
            1,
            None,
            Some("Errands".to_string()),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<EngineError>(),
            Some(EngineError::TransitionPending)
        ));
        assert!(engine.task_types().find("Errands").is_none());
        assert_eq!(engine.task_types().list().len(), 1);
        assert!(engine.tasks().is_empty());
    }
}
