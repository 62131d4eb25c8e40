mod cli;
mod color;
mod config;
mod db;
mod engine;
mod registry;
mod types;

use anyhow::{Context, Result};
use clap::Parser;
use mockable::DefaultClock;

fn main() -> Result<()> {
    let cli_opts = cli::Cli::parse();
    let command = cli_opts.command.unwrap_or(cli::Command::Status);

    let default_level = if matches!(command, cli::Command::Watch) {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config = config::Config::load(cli_opts.config.as_deref())?;
    let db_path = match cli_opts.db.or_else(|| config.db_path.clone()) {
        Some(path) => path.to_string_lossy().into_owned(),
        None => db::default_db_path(),
    };
    let conn = db::init(&db_path).with_context(|| format!("opening database {db_path}"))?;

    let mut engine = engine::Engine::new(conn, DefaultClock, config.engine_settings());
    cli::run(command, &mut engine, config.check_interval())
}
