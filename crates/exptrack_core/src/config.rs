//! Process configuration.
//!
//! # Responsibility
//! - Describe database, logging and hierarchy settings in one value built at
//!   process start and passed down explicitly.
//! - Layer environment overrides on top of defaults.
//!
//! # Invariants
//! - Loading never touches the filesystem; paths are only recorded.
//! - Unknown values for enumerated settings are rejected, not defaulted.

use crate::logging::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "EXPTRACK_DB_PATH";
pub const ENV_DB_BUSY_TIMEOUT_MS: &str = "EXPTRACK_DB_BUSY_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "EXPTRACK_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "EXPTRACK_LOG_DIR";
pub const ENV_CLOSURE_STRATEGY: &str = "EXPTRACK_CLOSURE_STRATEGY";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Configuration error with the offending key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue {
                key,
                value,
                expected,
            } => write!(f, "invalid value `{value}` for {key}; expected {expected}"),
        }
    }
}

impl Error for ConfigError {}

/// How descendant closures are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosureStrategy {
    /// Load every parent link and walk the forest in process.
    #[default]
    InProcess,
    /// Push the walk down to SQLite as a recursive CTE.
    RecursiveSql,
}

impl ClosureStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProcess => "in_process",
            Self::RecursiveSql => "recursive_sql",
        }
    }
}

impl FromStr for ClosureStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_process" | "in-process" => Ok(Self::InProcess),
            "recursive_sql" | "recursive-sql" => Ok(Self::RecursiveSql),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_CLOSURE_STRATEGY,
                value: value.to_string(),
                expected: "in_process|recursive_sql",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `None` means a private in-memory database.
    pub path: Option<PathBuf>,
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    /// Rolling log directory. `None` logs to stderr.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HierarchyConfig {
    pub closure_strategy: ClosureStrategy,
}

/// Complete process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub hierarchy: HierarchyConfig,
}

impl AppConfig {
    /// Builds configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from defaults overridden by `lookup`.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();

        if let Some(path) = read(ENV_DB_PATH) {
            config.database.path = Some(PathBuf::from(path));
        }
        if let Some(raw) = read(ENV_DB_BUSY_TIMEOUT_MS) {
            let millis = raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: ENV_DB_BUSY_TIMEOUT_MS,
                value: raw.clone(),
                expected: "a non-negative integer (milliseconds)",
            })?;
            config.database.busy_timeout = Duration::from_millis(millis);
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.logging.level = level;
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            config.logging.dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = read(ENV_CLOSURE_STRATEGY) {
            config.hierarchy.closure_strategy = raw.parse()?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.database.path.is_none());
        assert_eq!(config.database.busy_timeout, Duration::from_secs(5));
        assert_eq!(config.hierarchy.closure_strategy, ClosureStrategy::InProcess);
    }

    #[test]
    fn environment_overrides_every_section() {
        let config = AppConfig::from_lookup(lookup_from(&[
            (ENV_DB_PATH, "/var/lib/exptrack/exptrack.db"),
            (ENV_DB_BUSY_TIMEOUT_MS, "250"),
            (ENV_LOG_LEVEL, "warn"),
            (ENV_LOG_DIR, "/var/log/exptrack"),
            (ENV_CLOSURE_STRATEGY, "recursive_sql"),
        ]))
        .unwrap();

        assert_eq!(
            config.database.path,
            Some(PathBuf::from("/var/lib/exptrack/exptrack.db"))
        );
        assert_eq!(config.database.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.dir, Some(PathBuf::from("/var/log/exptrack")));
        assert_eq!(
            config.hierarchy.closure_strategy,
            ClosureStrategy::RecursiveSql
        );
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = AppConfig::from_lookup(lookup_from(&[(ENV_DB_PATH, "   ")])).unwrap();
        assert!(config.database.path.is_none());
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = AppConfig::from_lookup(lookup_from(&[(ENV_DB_BUSY_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_DB_BUSY_TIMEOUT_MS));

        let err = AppConfig::from_lookup(lookup_from(&[(ENV_CLOSURE_STRATEGY, "magic")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key, .. } if key == ENV_CLOSURE_STRATEGY
        ));
    }

    #[test]
    fn closure_strategy_round_trips_through_str() {
        for strategy in [ClosureStrategy::InProcess, ClosureStrategy::RecursiveSql] {
            assert_eq!(strategy.as_str().parse::<ClosureStrategy>().unwrap(), strategy);
        }
    }
}
