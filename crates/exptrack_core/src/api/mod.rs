//! Transport-agnostic endpoint handlers.
//!
//! # Responsibility
//! - Validate requests, call the services and render views.
//! - Map service error kinds to HTTP-style status codes.
//!
//! # Invariants
//! - Handlers never panic and never return `Err`; every outcome is an
//!   `ApiResponse`.
//! - Storage failures surface as a generic 500 message; details go to logs.

use crate::model::experiment::ExperimentId;
use crate::model::team::TeamId;
use crate::repo::Store;
use crate::service::experiment_service::{ExperimentService, UpdateOutcome};
use crate::service::team_service::TeamService;
use crate::service::{ErrorKind, ServiceError};
use crate::validation::ValidationErrors;
use log::{debug, error};
use serde::Serialize;
use serde_json::{json, Value};

pub mod requests;
pub mod views;

pub use requests::{
    parse_list_query, CreateExperimentRequest, CreateTeamRequest, UpdateExperimentRequest,
    TEAM_IDS_QUERY_KEY,
};
pub use views::{
    ExperimentListView, ExperimentSummaryView, ExperimentView, ListMeta, TeamSummaryView,
    TeamView,
};

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;

pub const NOTHING_TO_UPDATE: &str = "Nothing to update";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Status code plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    /// Serializes `payload`; a serialization failure becomes a 500.
    pub fn json<T: Serialize>(status: u16, payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(body) => Self { status, body },
            Err(err) => {
                error!("event=response_render module=api status=error error={err}");
                Self::message(STATUS_INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
            }
        }
    }

    /// Body is a bare JSON string.
    pub fn message(status: u16, message: &str) -> Self {
        Self {
            status,
            body: Value::String(message.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Endpoint handlers over one store.
pub struct Api<S: Store + Clone> {
    experiments: ExperimentService<S>,
    teams: TeamService<S>,
}

impl<S: Store + Clone> Api<S> {
    pub fn new(store: S) -> Self {
        Self {
            experiments: ExperimentService::new(store.clone()),
            teams: TeamService::new(store),
        }
    }

    /// `GET /health`
    pub fn health(&self) -> ApiResponse {
        ApiResponse {
            status: STATUS_OK,
            body: json!({"status": "OK"}),
        }
    }

    /// `GET /experiments`
    pub fn list_experiments(&self, query: &[(String, String)]) -> ApiResponse {
        let filter = match parse_list_query(query) {
            Ok(filter) => filter,
            Err(errors) => return rejected("experiment_list", errors),
        };
        match self.experiments.list_experiments(&filter) {
            Ok(page) => ApiResponse::json(STATUS_OK, &ExperimentListView::from(&page)),
            Err(err) => error_response(&err),
        }
    }

    /// `POST /experiments`
    pub fn create_experiment(&self, body: &Value) -> ApiResponse {
        let request = match CreateExperimentRequest::from_json(body) {
            Ok(request) => request,
            Err(errors) => return rejected("experiment_create", errors),
        };
        match self.experiments.create_experiment(
            &request.description,
            request.sample_ratio,
            &request.team_ids,
        ) {
            Ok(experiment) => ApiResponse::json(STATUS_CREATED, &ExperimentView::from(&experiment)),
            Err(err) => error_response(&err),
        }
    }

    /// `PUT /experiments/{id}`
    pub fn update_experiment(&self, id: ExperimentId, body: &Value) -> ApiResponse {
        let request = match UpdateExperimentRequest::from_json(body) {
            Ok(request) => request,
            Err(errors) => return rejected("experiment_update_teams", errors),
        };
        match self
            .experiments
            .update_experiment_teams(id, &request.team_ids)
        {
            Ok(UpdateOutcome::Updated(experiment)) => {
                ApiResponse::json(STATUS_OK, &ExperimentView::from(&experiment))
            }
            Ok(UpdateOutcome::Unchanged) => ApiResponse::message(STATUS_OK, NOTHING_TO_UPDATE),
            Err(err) => error_response(&err),
        }
    }

    /// `POST /teams`
    pub fn create_team(&self, body: &Value) -> ApiResponse {
        let request = match CreateTeamRequest::from_json(body) {
            Ok(request) => request,
            Err(errors) => return rejected("team_create", errors),
        };
        match self
            .teams
            .create_team(&request.name, request.parent_team_id)
        {
            Ok(detail) => ApiResponse::json(STATUS_CREATED, &TeamView::from(&detail)),
            Err(err) => error_response(&err),
        }
    }

    /// `GET /teams/{id}`
    pub fn get_team(&self, id: TeamId) -> ApiResponse {
        match self.teams.get_team(id) {
            Ok(detail) => ApiResponse::json(STATUS_OK, &TeamView::from(&detail)),
            Err(err) => error_response(&err),
        }
    }
}

fn rejected(event: &str, errors: ValidationErrors) -> ApiResponse {
    debug!("event={event} module=api status=rejected error_code=validation_failed");
    ApiResponse::json(STATUS_BAD_REQUEST, &errors)
}

/// Maps a service failure to its response.
///
/// A missing referenced team in a request body is a bad request; a missing
/// addressed resource or parent is a 404.
pub fn error_response(err: &ServiceError) -> ApiResponse {
    match (err.kind(), err) {
        (_, ServiceError::Validation(errors)) => ApiResponse::json(STATUS_BAD_REQUEST, errors),
        (_, ServiceError::TeamsNotFound { .. }) => {
            ApiResponse::message(STATUS_BAD_REQUEST, &err.to_string())
        }
        (ErrorKind::NotFound, _) => ApiResponse::message(STATUS_NOT_FOUND, &err.to_string()),
        (ErrorKind::Conflict | ErrorKind::Invariant | ErrorKind::Validation, _) => {
            ApiResponse::message(STATUS_BAD_REQUEST, &err.to_string())
        }
        (ErrorKind::Storage, _) => {
            ApiResponse::message(STATUS_INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{error_response, ApiResponse, INTERNAL_ERROR_MESSAGE};
    use crate::repo::RepoError;
    use crate::service::ServiceError;
    use crate::validation::{ValidationErrors, BLANK_FIELD};
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn error_kinds_map_to_status_codes() {
        let cases = [
            (
                ServiceError::Validation(ValidationErrors::single("name", BLANK_FIELD)),
                400,
                json!({"name": [BLANK_FIELD]}),
            ),
            (
                ServiceError::TeamsNotFound {
                    missing: BTreeSet::from([9]),
                },
                400,
                json!("Some/All of the teams specified were not found"),
            ),
            (ServiceError::ParentNotFound(3), 404, json!("Specified parent not found")),
            (ServiceError::ExperimentNotFound(3), 404, json!("Experiment not found")),
            (ServiceError::TeamAlreadyExists("a".to_string()), 400, json!("Team already exists")),
            (
                ServiceError::TeamsNotIndependent { nested_team_id: 2 },
                400,
                json!("Experiment teams cannot be descendants of one another"),
            ),
            (
                ServiceError::Repo(RepoError::InvalidData("broken row".to_string())),
                500,
                json!(INTERNAL_ERROR_MESSAGE),
            ),
        ];

        for (err, status, body) in cases {
            let response = error_response(&err);
            assert_eq!(response, ApiResponse { status, body }, "{err:?}");
        }
    }

    #[test]
    fn success_range_is_2xx() {
        assert!(ApiResponse::message(201, "x").is_success());
        assert!(!ApiResponse::message(404, "x").is_success());
    }
}
