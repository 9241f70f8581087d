//! Experiment records and their team membership.
//!
//! # Invariants
//! - `teams` holds 1 or 2 entries, sorted by team id.
//! - `description` is never blank.

use crate::model::team::{TeamId, TeamRef};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage-assigned experiment identifier.
pub type ExperimentId = i64;

pub const MIN_LINKED_TEAMS: usize = 1;
pub const MAX_LINKED_TEAMS: usize = 2;

/// Experiment with its linked teams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Experiment {
    pub id: ExperimentId,
    pub description: String,
    pub sample_ratio: i64,
    pub teams: Vec<TeamRef>,
}

impl Experiment {
    /// Team ids this experiment is a member of.
    pub fn team_ids(&self) -> BTreeSet<TeamId> {
        self.teams.iter().map(|team| team.id).collect()
    }
}

/// Experiment without membership, as listed under a team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentSummary {
    pub id: ExperimentId,
    pub description: String,
    pub sample_ratio: i64,
}

/// Field-level rejection of experiment input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExperimentValidationError {
    BlankDescription,
    /// Number of team ids supplied, outside `1..=2`.
    TeamCount(usize),
}

impl Display for ExperimentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankDescription => write!(f, "description must not be blank"),
            Self::TeamCount(count) => write!(
                f,
                "experiment must link between {MIN_LINKED_TEAMS} and {MAX_LINKED_TEAMS} teams, got {count}"
            ),
        }
    }
}

impl Error for ExperimentValidationError {}

/// Validated input for experiment creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExperiment {
    pub description: String,
    pub sample_ratio: i64,
    /// Deduplicated; duplicates in the input collapse here.
    pub team_ids: BTreeSet<TeamId>,
}

impl NewExperiment {
    pub fn new(
        description: &str,
        sample_ratio: i64,
        team_ids: &[TeamId],
    ) -> Result<Self, ExperimentValidationError> {
        validate_team_count(team_ids.len())?;
        if description.trim().is_empty() {
            return Err(ExperimentValidationError::BlankDescription);
        }

        Ok(Self {
            description: description.to_string(),
            sample_ratio,
            team_ids: team_ids.iter().copied().collect(),
        })
    }
}

/// Checks a raw team id count against `MIN_LINKED_TEAMS..=MAX_LINKED_TEAMS`.
pub fn validate_team_count(count: usize) -> Result<(), ExperimentValidationError> {
    if (MIN_LINKED_TEAMS..=MAX_LINKED_TEAMS).contains(&count) {
        Ok(())
    } else {
        Err(ExperimentValidationError::TeamCount(count))
    }
}

/// Field used to order experiment listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Id,
    SampleRatio,
}

impl SortKey {
    pub const ALL: [SortKey; 2] = [SortKey::Id, SortKey::SampleRatio];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::SampleRatio => "sample_ratio",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == value)
    }
}

/// Direction of the primary sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub const ALL: [SortOrder; 2] = [SortOrder::Asc, SortOrder::Desc];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|order| order.as_str() == value)
    }
}
