//! Experiment rows and the experiment/team membership join.
//!
//! # Responsibility
//! - Persist experiments together with their team links.
//! - Answer paged, sorted listings filtered by team membership.
//!
//! # Invariants
//! - Listing order is `<sort key> <order>, id ASC`, so pages are stable.
//! - Read models always carry their teams sorted by team id.
//! - `replace_experiment_teams` swaps the whole link set; it never edits it
//!   incrementally.

use super::{id_array, RepoError, RepoResult, SqliteStore};
use crate::model::experiment::{Experiment, ExperimentId, NewExperiment, SortKey, SortOrder};
use crate::model::team::{TeamId, TeamRef};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeSet, HashMap};

/// Listing options, already normalized by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentQuery {
    /// Keep experiments linked to at least one of these teams.
    /// `None` disables the filter; an empty set matches nothing.
    pub team_filter: Option<BTreeSet<TeamId>>,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
    pub offset: u64,
    pub limit: u32,
}

/// Repository interface for experiments.
pub trait ExperimentRepository {
    /// Inserts an experiment with its team links and returns the stored row.
    fn create_experiment(&self, experiment: &NewExperiment) -> RepoResult<Experiment>;
    /// Loads one experiment with its teams.
    fn get_experiment(&self, id: ExperimentId) -> RepoResult<Option<Experiment>>;
    /// Loads one page of experiments with their teams.
    fn query_experiments(&self, query: &ExperimentQuery) -> RepoResult<Vec<Experiment>>;
    /// Replaces every team link of `id` with `team_ids`.
    fn replace_experiment_teams(
        &self,
        id: ExperimentId,
        team_ids: &BTreeSet<TeamId>,
    ) -> RepoResult<()>;
}

impl ExperimentRepository for SqliteStore<'_> {
    fn create_experiment(&self, experiment: &NewExperiment) -> RepoResult<Experiment> {
        self.conn().execute(
            "INSERT INTO experiments (description, sample_ratio) VALUES (?1, ?2);",
            params![experiment.description.as_str(), experiment.sample_ratio],
        )?;
        let id = self.conn().last_insert_rowid();
        insert_links(self.conn(), id, &experiment.team_ids)?;

        self.get_experiment(id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("experiment {id} missing after insert"))
        })
    }

    fn get_experiment(&self, id: ExperimentId) -> RepoResult<Option<Experiment>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, description, sample_ratio FROM experiments WHERE id = ?1;",
                [id],
                parse_experiment_row,
            )
            .optional()?;

        match row {
            Some(experiment) => Ok(attach_teams(self.conn(), vec![experiment])?.pop()),
            None => Ok(None),
        }
    }

    fn query_experiments(&self, query: &ExperimentQuery) -> RepoResult<Vec<Experiment>> {
        let mut sql = String::from(
            "SELECT e.id AS id, e.description AS description, e.sample_ratio AS sample_ratio
             FROM experiments e",
        );
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(team_ids) = &query.team_filter {
            if team_ids.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(
                " WHERE EXISTS (
                    SELECT 1
                    FROM experiments_teams m
                    WHERE m.experiment_id = e.id
                      AND m.team_id IN (SELECT value FROM json_each(?))
                )",
            );
            bind_values.push(Value::Text(id_array(team_ids)?));
        }

        sql.push_str(&format!(
            " ORDER BY {} {}",
            sort_column(query.sort_key),
            sort_direction(query.sort_order)
        ));
        if query.sort_key != SortKey::Id {
            sql.push_str(", e.id ASC");
        }

        sql.push_str(" LIMIT ? OFFSET ?;");
        bind_values.push(Value::Integer(i64::from(query.limit)));
        bind_values.push(Value::Integer(
            i64::try_from(query.offset).unwrap_or(i64::MAX),
        ));

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind_values), parse_experiment_row)?
            .collect::<Result<Vec<_>, _>>()?;

        attach_teams(self.conn(), rows)
    }

    fn replace_experiment_teams(
        &self,
        id: ExperimentId,
        team_ids: &BTreeSet<TeamId>,
    ) -> RepoResult<()> {
        let changed = self.conn().execute(
            "UPDATE experiments
             SET updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            [id],
        )?;
        if changed == 0 {
            return Err(RepoError::ExperimentNotFound(id));
        }

        self.conn().execute(
            "DELETE FROM experiments_teams WHERE experiment_id = ?1;",
            [id],
        )?;
        insert_links(self.conn(), id, team_ids)
    }
}

fn insert_links(
    conn: &Connection,
    experiment_id: ExperimentId,
    team_ids: &BTreeSet<TeamId>,
) -> RepoResult<()> {
    let mut stmt =
        conn.prepare("INSERT INTO experiments_teams (experiment_id, team_id) VALUES (?1, ?2);")?;
    for team_id in team_ids {
        stmt.execute(params![experiment_id, team_id])?;
    }
    Ok(())
}

/// Loads memberships for `experiments` in one query and attaches them.
fn attach_teams(conn: &Connection, mut experiments: Vec<Experiment>) -> RepoResult<Vec<Experiment>> {
    if experiments.is_empty() {
        return Ok(experiments);
    }

    let experiment_ids = id_array(experiments.iter().map(|experiment| &experiment.id))?;
    let mut stmt = conn.prepare(
        "SELECT m.experiment_id, t.id, t.name
         FROM experiments_teams m
         INNER JOIN teams t ON t.id = m.team_id
         WHERE m.experiment_id IN (SELECT value FROM json_each(?1))
         ORDER BY m.experiment_id ASC, t.id ASC;",
    )?;
    let mut rows = stmt.query([experiment_ids])?;

    let mut memberships: HashMap<ExperimentId, Vec<TeamRef>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let experiment_id: ExperimentId = row.get(0)?;
        memberships.entry(experiment_id).or_default().push(TeamRef {
            id: row.get(1)?,
            name: row.get(2)?,
        });
    }

    for experiment in &mut experiments {
        experiment.teams = memberships.remove(&experiment.id).unwrap_or_default();
        if experiment.teams.is_empty() {
            return Err(RepoError::InvalidData(format!(
                "experiment {} has no linked teams",
                experiment.id
            )));
        }
    }

    Ok(experiments)
}

fn parse_experiment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Experiment> {
    Ok(Experiment {
        id: row.get("id")?,
        description: row.get("description")?,
        sample_ratio: row.get("sample_ratio")?,
        teams: Vec::new(),
    })
}

fn sort_column(key: SortKey) -> &'static str {
    match key {
        SortKey::Id => "e.id",
        SortKey::SampleRatio => "e.sample_ratio",
    }
}

fn sort_direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}
