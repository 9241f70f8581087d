//! Team use-cases.
//!
//! # Invariants
//! - Team names are unique; the check and the insert share one unit of work.
//! - A parent, when given, must already exist.

use super::experiment_service::log_rejection;
use super::ServiceError;
use crate::model::experiment::ExperimentSummary;
use crate::model::team::{NewTeam, Team, TeamId};
use crate::repo::Store;
use crate::validation::{ValidationErrors, BLANK_FIELD};
use log::info;

/// Team with the experiments linked to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamDetail {
    pub team: Team,
    pub experiments: Vec<ExperimentSummary>,
}

/// Team use-case service.
pub struct TeamService<S: Store> {
    store: S,
}

impl<S: Store> TeamService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a team under an optional parent.
    pub fn create_team(
        &self,
        name: &str,
        parent_id: Option<TeamId>,
    ) -> Result<TeamDetail, ServiceError> {
        let result = NewTeam::new(name, parent_id)
            .ok_or_else(|| ServiceError::Validation(ValidationErrors::single("name", BLANK_FIELD)))
            .and_then(|new_team| {
                self.store.atomically(|store| {
                    if store.get_team_by_name(&new_team.name)?.is_some() {
                        return Err(ServiceError::TeamAlreadyExists(new_team.name.clone()));
                    }
                    if let Some(parent_id) = new_team.parent_id {
                        store
                            .get_team(parent_id)?
                            .ok_or(ServiceError::ParentNotFound(parent_id))?;
                    }
                    Ok(store.create_team(&new_team)?)
                })
            });

        match result {
            Ok(team) => {
                info!(
                    "event=team_create module=service status=ok team_id={} has_parent={}",
                    team.id,
                    team.parent_id.is_some()
                );
                Ok(TeamDetail {
                    team,
                    experiments: Vec::new(),
                })
            }
            Err(err) => {
                log_rejection("team_create", &err);
                Err(err)
            }
        }
    }

    /// Loads a team with its linked experiments.
    pub fn get_team(&self, id: TeamId) -> Result<TeamDetail, ServiceError> {
        let team = self
            .store
            .get_team(id)?
            .ok_or(ServiceError::TeamNotFound(id))?;
        let experiments = self.store.list_team_experiments(id)?;
        Ok(TeamDetail { team, experiments })
    }
}
