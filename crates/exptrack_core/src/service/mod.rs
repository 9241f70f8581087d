//! Use-case services over the entity store.
//!
//! # Responsibility
//! - Enforce the team/experiment invariants that need storage to check.
//! - Run every read-check-write sequence inside one `Store::atomically` unit.
//! - Translate storage failures into user-facing error kinds.
//!
//! # Invariants
//! - Services stay storage-agnostic: they only see the `Store` traits.
//! - No service keeps state between calls.

use crate::model::experiment::ExperimentId;
use crate::model::team::TeamId;
use crate::repo::RepoError;
use crate::validation::ValidationErrors;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod experiment_service;
pub mod team_service;

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input.
    Validation,
    /// A referenced team or experiment does not exist.
    NotFound,
    /// Uniqueness conflict.
    Conflict,
    /// Structural rule of the data model violated.
    Invariant,
    /// Storage failure; not caused by the request.
    Storage,
}

/// Errors from team and experiment use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Field-level input errors.
    Validation(ValidationErrors),
    /// Some of the referenced teams do not exist.
    TeamsNotFound { missing: BTreeSet<TeamId> },
    /// Requested team does not exist.
    TeamNotFound(TeamId),
    /// Parent given for a new team does not exist.
    ParentNotFound(TeamId),
    /// Target experiment does not exist.
    ExperimentNotFound(ExperimentId),
    /// Team name already used.
    TeamAlreadyExists(String),
    /// Update tried to change how many teams an experiment links.
    TeamCountChanged { current: usize, requested: usize },
    /// Update paired a team with one of its ancestors.
    TeamsNotIndependent { nested_team_id: TeamId },
    /// Storage-layer failure.
    Repo(RepoError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::TeamsNotFound { .. }
            | Self::TeamNotFound(_)
            | Self::ParentNotFound(_)
            | Self::ExperimentNotFound(_) => ErrorKind::NotFound,
            Self::TeamAlreadyExists(_) => ErrorKind::Conflict,
            Self::TeamCountChanged { .. } | Self::TeamsNotIndependent { .. } => {
                ErrorKind::Invariant
            }
            Self::Repo(_) => ErrorKind::Storage,
        }
    }

    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::TeamsNotFound { .. } => "teams_not_found",
            Self::TeamNotFound(_) => "team_not_found",
            Self::ParentNotFound(_) => "parent_not_found",
            Self::ExperimentNotFound(_) => "experiment_not_found",
            Self::TeamAlreadyExists(_) => "team_already_exists",
            Self::TeamCountChanged { .. } => "team_count_changed",
            Self::TeamsNotIndependent { .. } => "teams_not_independent",
            Self::Repo(_) => "storage_failed",
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(errors) => write!(f, "{errors}"),
            Self::TeamsNotFound { .. } => {
                write!(f, "Some/All of the teams specified were not found")
            }
            Self::TeamNotFound(_) => write!(f, "Team not found"),
            Self::ParentNotFound(_) => write!(f, "Specified parent not found"),
            Self::ExperimentNotFound(_) => write!(f, "Experiment not found"),
            Self::TeamAlreadyExists(_) => write!(f, "Team already exists"),
            Self::TeamCountChanged { .. } => write!(f, "Cannot change number of linked teams"),
            Self::TeamsNotIndependent { .. } => {
                write!(f, "Experiment teams cannot be descendants of one another")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(errors) => Some(errors),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::DuplicateTeamName(name) => Self::TeamAlreadyExists(name),
            RepoError::ExperimentNotFound(id) => Self::ExperimentNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(value: ValidationErrors) -> Self {
        Self::Validation(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ServiceError};
    use crate::repo::RepoError;

    #[test]
    fn repo_errors_with_domain_meaning_are_lifted() {
        let err = ServiceError::from(RepoError::DuplicateTeamName("core".to_string()));
        assert!(matches!(err, ServiceError::TeamAlreadyExists(ref name) if name == "core"));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = ServiceError::from(RepoError::ExperimentNotFound(9));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = ServiceError::from(RepoError::InvalidData("bad".to_string()));
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn invariant_messages_are_user_facing() {
        let err = ServiceError::TeamCountChanged {
            current: 1,
            requested: 2,
        };
        assert_eq!(err.to_string(), "Cannot change number of linked teams");
        assert_eq!(err.kind(), ErrorKind::Invariant);
    }
}
