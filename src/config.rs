/// User configuration, read from an optional TOML file.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::engine::{EngineSettings, PendingPolicy};
use crate::types::{DEFAULT_PERIOD_DAYS, MAX_PERIOD_DAYS};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub period_days: i64,
    pub check_interval_secs: u64,
    pub retry_delay_secs: u64,
    pub pending_policy: PendingPolicy,
    pub db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            period_days: DEFAULT_PERIOD_DAYS,
            check_interval_secs: 60 * 60,
            retry_delay_secs: 5,
            pending_policy: PendingPolicy::CreateOnly,
            db_path: None,
        }
    }
}

impl Config {
    /// Loads `explicit` if given, otherwise the default config file when it
    /// exists. No file at all means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        anyhow::ensure!(
            (1..=MAX_PERIOD_DAYS).contains(&config.period_days),
            "period_days must be between 1 and {MAX_PERIOD_DAYS}"
        );
        anyhow::ensure!(
            config.check_interval_secs > 0,
            "check_interval_secs must be positive"
        );
        Ok(config)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            period_days: self.period_days,
            pending_policy: self.pending_policy,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// `<config_dir>/sandclock/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sandclock").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.engine_settings(), EngineSettings::default());
        assert_eq!(config.check_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn fields_override_defaults() {
        let config = Config::parse(
            r#"
            period_days = 14
            retry_delay_secs = 1
            pending_policy = "all-mutations"
            db_path = "/tmp/clock.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.period_days, 14);
        assert_eq!(config.check_interval_secs, 3600);
        let settings = config.engine_settings();
        assert_eq!(settings.retry_delay, Duration::from_secs(1));
        assert_eq!(settings.pending_policy, PendingPolicy::AllMutations);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/clock.db")));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(Config::parse("period_dayz = 3").is_err());
        assert!(Config::parse("period_days = 0").is_err());
        assert!(Config::parse("period_days = -3").is_err());
        assert!(Config::parse("period_days = 100000000").is_err());
        assert!(Config::parse("period_days = 3650").is_ok());
        assert!(Config::parse("check_interval_secs = 0").is_err());
        assert!(Config::parse("pending_policy = \"sometimes\"").is_err());
    }

    #[test]
    fn explicit_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "period_days = 3").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.period_days, 3);
        assert!(Config::load(Some(Path::new("/definitely/not/here.toml"))).is_err());
    }
}
