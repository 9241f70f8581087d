//! Core domain logic for exptrack.
//! Teams form a forest; experiments link one or two independent teams.
//! This crate owns every invariant over that data.

pub mod api;
pub mod config;
pub mod db;
pub mod hierarchy;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod validation;

pub use api::{Api, ApiResponse};
pub use config::{AppConfig, ClosureStrategy, ConfigError};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::experiment::{Experiment, ExperimentId, SortKey, SortOrder};
pub use model::team::{Team, TeamId};
pub use repo::{RepoError, RepoResult, SqliteStore, Store};
pub use service::experiment_service::{ExperimentService, ListExperimentsFilter, UpdateOutcome};
pub use service::team_service::{TeamDetail, TeamService};
pub use service::{ErrorKind, ServiceError};
pub use validation::ValidationErrors;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
