//! Experiment listing and mutation use-cases.
//!
//! # Responsibility
//! - Normalize paging/sorting input and expand team filters through the
//!   descendant closure before querying.
//! - Create experiments and replace their team sets under the membership
//!   invariants.
//!
//! # Invariants
//! - An experiment links 1 or 2 existing teams.
//! - The number of linked teams never changes after creation.
//! - Two linked teams are never ancestor and descendant of each other.
//! - Every check of a write runs in the same `Store::atomically` unit as the
//!   write itself.

use super::ServiceError;
use crate::hierarchy::first_nested_member;
use crate::model::experiment::{
    validate_team_count, Experiment, ExperimentId, ExperimentValidationError, NewExperiment,
    SortKey, SortOrder,
};
use crate::model::team::TeamId;
use crate::repo::{ExperimentQuery, Store};
use crate::validation::{ValidationErrors, BLANK_FIELD, TEAM_IDS_LENGTH};
use log::{debug, info, warn};
use std::collections::BTreeSet;

/// Page size used when the caller asks for less than one item.
pub const DEFAULT_PAGE_LIMIT: u32 = 25;

/// Raw listing input as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListExperimentsFilter {
    /// Teams to filter by; descendants are included automatically.
    pub team_ids: Option<Vec<TeamId>>,
    /// 1-based page; `0` and negatives select the first page.
    pub page: i64,
    /// Items per page; values below 1 select `DEFAULT_PAGE_LIMIT`.
    pub limit: i64,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
}

/// Paging parameters after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    /// 0-based page index.
    pub page_index: u64,
    pub limit: u32,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
}

impl PageParams {
    pub fn offset(&self) -> u64 {
        self.page_index.saturating_mul(u64::from(self.limit))
    }

    /// 1-based page number, as echoed back to callers.
    pub fn page_number(&self) -> u64 {
        self.page_index.saturating_add(1)
    }
}

impl ListExperimentsFilter {
    pub fn normalize(&self) -> PageParams {
        let page_index = self.page.saturating_sub(1).max(0).unsigned_abs();
        let limit = if self.limit < 1 {
            DEFAULT_PAGE_LIMIT
        } else {
            u32::try_from(self.limit).unwrap_or(u32::MAX)
        };

        PageParams {
            page_index,
            limit,
            sort_key: self.sort_key,
            sort_order: self.sort_order,
        }
    }
}

/// One page of experiments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentPage {
    pub items: Vec<Experiment>,
    /// Number of items in this page, not in the whole result set.
    pub total_item_count: usize,
    pub params: PageParams,
}

/// Result of a team-set replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(Experiment),
    /// Requested set equals the current one; nothing was written.
    Unchanged,
}

/// Experiment use-case service.
pub struct ExperimentService<S: Store> {
    store: S,
}

impl<S: Store> ExperimentService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Lists one page of experiments, expanding team filters to descendants.
    pub fn list_experiments(
        &self,
        filter: &ListExperimentsFilter,
    ) -> Result<ExperimentPage, ServiceError> {
        let params = filter.normalize();

        let team_filter = match filter.team_ids.as_deref() {
            Some(ids) if !ids.is_empty() => {
                let requested: BTreeSet<TeamId> = ids.iter().copied().collect();
                let mut effective = self.store.descendant_ids(&requested)?;
                effective.extend(requested);
                Some(effective)
            }
            _ => None,
        };

        let query = ExperimentQuery {
            team_filter,
            sort_key: params.sort_key,
            sort_order: params.sort_order,
            offset: params.offset(),
            limit: params.limit,
        };
        let items = self.store.query_experiments(&query)?;

        debug!(
            "event=experiment_list module=service status=ok page_index={} limit={} sort_by={} order_by={} team_filter_size={} items={}",
            params.page_index,
            params.limit,
            params.sort_key.as_str(),
            params.sort_order.as_str(),
            query.team_filter.as_ref().map_or(0, BTreeSet::len),
            items.len()
        );

        Ok(ExperimentPage {
            total_item_count: items.len(),
            items,
            params,
        })
    }

    /// Creates an experiment linked to 1 or 2 existing teams.
    pub fn create_experiment(
        &self,
        description: &str,
        sample_ratio: i64,
        team_ids: &[TeamId],
    ) -> Result<Experiment, ServiceError> {
        let result = NewExperiment::new(description, sample_ratio, team_ids)
            .map_err(validation_error)
            .and_then(|new_experiment| {
                self.store.atomically(|store| {
                    ensure_teams_exist(store, &new_experiment.team_ids)?;
                    Ok(store.create_experiment(&new_experiment)?)
                })
            });

        match &result {
            Ok(experiment) => info!(
                "event=experiment_create module=service status=ok experiment_id={} team_count={}",
                experiment.id,
                experiment.teams.len()
            ),
            Err(err) => log_rejection("experiment_create", err),
        }
        result
    }

    /// Replaces the team set of an experiment.
    ///
    /// Checks run in order: experiment exists, team count unchanged, set
    /// differs from the current one, teams exist, teams independent.
    pub fn update_experiment_teams(
        &self,
        id: ExperimentId,
        team_ids: &[TeamId],
    ) -> Result<UpdateOutcome, ServiceError> {
        let result = validate_team_count(team_ids.len())
            .map_err(validation_error)
            .and_then(|()| {
                let requested: BTreeSet<TeamId> = team_ids.iter().copied().collect();
                self.store
                    .atomically(|store| replace_teams_checked(store, id, &requested))
            });

        match &result {
            Ok(UpdateOutcome::Updated(experiment)) => info!(
                "event=experiment_update_teams module=service status=ok experiment_id={} team_count={}",
                experiment.id,
                experiment.teams.len()
            ),
            Ok(UpdateOutcome::Unchanged) => info!(
                "event=experiment_update_teams module=service status=unchanged experiment_id={id}"
            ),
            Err(err) => log_rejection("experiment_update_teams", err),
        }
        result
    }
}

fn replace_teams_checked<S: Store>(
    store: &S,
    id: ExperimentId,
    requested: &BTreeSet<TeamId>,
) -> Result<UpdateOutcome, ServiceError> {
    let current = store
        .get_experiment(id)?
        .ok_or(ServiceError::ExperimentNotFound(id))?;
    let current_ids = current.team_ids();

    if requested.len() != current_ids.len() {
        return Err(ServiceError::TeamCountChanged {
            current: current_ids.len(),
            requested: requested.len(),
        });
    }
    if *requested == current_ids {
        return Ok(UpdateOutcome::Unchanged);
    }

    ensure_teams_exist(store, requested)?;

    if requested.len() > 1 {
        let closure = store.descendant_ids(requested)?;
        if let Some(nested_team_id) = first_nested_member(requested, &closure) {
            return Err(ServiceError::TeamsNotIndependent { nested_team_id });
        }
    }

    store.replace_experiment_teams(id, requested)?;
    let updated = store
        .get_experiment(id)?
        .ok_or(ServiceError::ExperimentNotFound(id))?;
    Ok(UpdateOutcome::Updated(updated))
}

fn ensure_teams_exist<S: Store>(store: &S, team_ids: &BTreeSet<TeamId>) -> Result<(), ServiceError> {
    let found: BTreeSet<TeamId> = store
        .get_teams_by_ids(team_ids)?
        .into_iter()
        .map(|team| team.id)
        .collect();
    let missing: BTreeSet<TeamId> = team_ids.difference(&found).copied().collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::TeamsNotFound { missing })
    }
}

fn validation_error(err: ExperimentValidationError) -> ServiceError {
    let errors = match err {
        ExperimentValidationError::BlankDescription => {
            ValidationErrors::single("description", BLANK_FIELD)
        }
        ExperimentValidationError::TeamCount(_) => {
            ValidationErrors::single("team_ids", TEAM_IDS_LENGTH)
        }
    };
    ServiceError::Validation(errors)
}

pub(crate) fn log_rejection(event: &str, err: &ServiceError) {
    match err {
        ServiceError::Repo(repo_err) => log::error!(
            "event={event} module=service status=error error_code={} error={repo_err}",
            err.code()
        ),
        _ => warn!(
            "event={event} module=service status=rejected error_code={}",
            err.code()
        ),
    }
}
