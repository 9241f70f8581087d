//! Team store: team rows, parent links and descendant closures.
//!
//! # Invariants
//! - `teams.name` is unique; a violating insert maps to `DuplicateTeamName`.
//! - Id-set lookups return rows ordered by `id ASC`.
//! - Both closure strategies return the same set for the same data.

use super::{id_array, RepoError, RepoResult, SqliteStore};
use crate::config::ClosureStrategy;
use crate::hierarchy::TeamForest;
use crate::model::experiment::ExperimentSummary;
use crate::model::team::{NewTeam, Team, TeamId, TeamLink};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::BTreeSet;

const TEAM_SELECT_SQL: &str = "SELECT id, name, parent_team_id FROM teams";

/// Repository interface for the team forest.
pub trait TeamRepository {
    /// Inserts a team and returns the stored row.
    fn create_team(&self, team: &NewTeam) -> RepoResult<Team>;
    /// Loads one team by id.
    fn get_team(&self, id: TeamId) -> RepoResult<Option<Team>>;
    /// Loads the subset of `ids` that exist.
    fn get_teams_by_ids(&self, ids: &BTreeSet<TeamId>) -> RepoResult<Vec<Team>>;
    /// Loads one team by exact name.
    fn get_team_by_name(&self, name: &str) -> RepoResult<Option<Team>>;
    /// Loads the parent link of every team.
    fn list_team_links(&self) -> RepoResult<Vec<TeamLink>>;
    /// Teams below any of `roots`; roots excluded unless below another root.
    fn descendant_ids(&self, roots: &BTreeSet<TeamId>) -> RepoResult<BTreeSet<TeamId>>;
    /// Experiments directly linked to `team_id`, by id.
    fn list_team_experiments(&self, team_id: TeamId) -> RepoResult<Vec<ExperimentSummary>>;
}

impl TeamRepository for SqliteStore<'_> {
    fn create_team(&self, team: &NewTeam) -> RepoResult<Team> {
        let inserted = self.conn().execute(
            "INSERT INTO teams (name, parent_team_id) VALUES (?1, ?2);",
            params![team.name.as_str(), team.parent_id],
        );

        match inserted {
            Ok(_) => Ok(Team {
                id: self.conn().last_insert_rowid(),
                name: team.name.clone(),
                parent_id: team.parent_id,
            }),
            Err(err) if is_unique_violation(&err) => {
                Err(RepoError::DuplicateTeamName(team.name.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn get_team(&self, id: TeamId) -> RepoResult<Option<Team>> {
        let team = self
            .conn()
            .query_row(
                &format!("{TEAM_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_team_row,
            )
            .optional()?;
        Ok(team)
    }

    fn get_teams_by_ids(&self, ids: &BTreeSet<TeamId>) -> RepoResult<Vec<Team>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn().prepare(&format!(
            "{TEAM_SELECT_SQL} WHERE id IN (SELECT value FROM json_each(?1)) ORDER BY id ASC;"
        ))?;
        let teams = stmt
            .query_map([id_array(ids)?], parse_team_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(teams)
    }

    fn get_team_by_name(&self, name: &str) -> RepoResult<Option<Team>> {
        let team = self
            .conn()
            .query_row(
                &format!("{TEAM_SELECT_SQL} WHERE name = ?1;"),
                [name],
                parse_team_row,
            )
            .optional()?;
        Ok(team)
    }

    fn list_team_links(&self) -> RepoResult<Vec<TeamLink>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, parent_team_id FROM teams ORDER BY id ASC;")?;
        let links = stmt
            .query_map([], |row| {
                Ok(TeamLink {
                    id: row.get("id")?,
                    parent_id: row.get("parent_team_id")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn descendant_ids(&self, roots: &BTreeSet<TeamId>) -> RepoResult<BTreeSet<TeamId>> {
        if roots.is_empty() {
            return Ok(BTreeSet::new());
        }

        match self.closure_strategy() {
            ClosureStrategy::InProcess => {
                let forest = TeamForest::from_links(self.list_team_links()?);
                Ok(forest.descendants(roots))
            }
            ClosureStrategy::RecursiveSql => recursive_descendant_ids(self.conn(), roots),
        }
    }

    fn list_team_experiments(&self, team_id: TeamId) -> RepoResult<Vec<ExperimentSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT e.id AS id, e.description AS description, e.sample_ratio AS sample_ratio
             FROM experiments e
             INNER JOIN experiments_teams m ON m.experiment_id = e.id
             WHERE m.team_id = ?1
             ORDER BY e.id ASC;",
        )?;
        let experiments = stmt
            .query_map([team_id], |row| {
                Ok(ExperimentSummary {
                    id: row.get("id")?,
                    description: row.get("description")?,
                    sample_ratio: row.get("sample_ratio")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(experiments)
    }
}

// `UNION` (not `UNION ALL`) deduplicates rows, which also bounds the walk.
fn recursive_descendant_ids(
    conn: &Connection,
    roots: &BTreeSet<TeamId>,
) -> RepoResult<BTreeSet<TeamId>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE below(id) AS (
            SELECT id
            FROM teams
            WHERE parent_team_id IN (SELECT value FROM json_each(?1))
            UNION
            SELECT child.id
            FROM teams child
            INNER JOIN below parent ON child.parent_team_id = parent.id
        )
        SELECT id FROM below;",
    )?;

    let ids = stmt
        .query_map([id_array(roots)?], |row| row.get::<_, TeamId>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(ids)
}

fn parse_team_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get("id")?,
        name: row.get("name")?,
        parent_id: row.get("parent_team_id")?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
