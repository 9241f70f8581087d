//! Storage contracts and the SQLite implementation behind them.
//!
//! # Responsibility
//! - Define the entity-storage interface the services depend on.
//! - Keep every SQL statement inside this module tree.
//! - Provide a unit-of-work primitive so services can check and write inside
//!   one transaction.
//!
//! # Invariants
//! - Repository methods never open transactions themselves; multi-statement
//!   writes are expected to run inside `Store::atomically`.
//! - Repository APIs surface semantic errors (`DuplicateTeamName`,
//!   `ExperimentNotFound`) next to transport errors.

use crate::config::ClosureStrategy;
use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::experiment::ExperimentId;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod experiment_repo;
pub mod team_repo;

pub use experiment_repo::{ExperimentQuery, ExperimentRepository};
pub use team_repo::TeamRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage-level failure.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the version this binary expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Unique constraint on `teams.name` rejected an insert.
    DuplicateTeamName(String),
    /// Write targeted an experiment row that does not exist.
    ExperimentNotFound(ExperimentId),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "store requires table `{table}`"),
            Self::DuplicateTeamName(name) => write!(f, "team name already taken: `{name}`"),
            Self::ExperimentNotFound(id) => write!(f, "experiment not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Uniform entity storage consumed by the services.
pub trait Store: TeamRepository + ExperimentRepository {
    /// Runs `work` as one atomic unit.
    ///
    /// Everything `work` reads and writes through `self` commits together when
    /// it returns `Ok`, and is rolled back when it returns `Err`. Calls made
    /// while a unit is already open join it.
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>;
}

/// SQLite-backed store over one borrowed connection.
#[derive(Debug, Clone, Copy)]
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
    closure_strategy: ClosureStrategy,
}

impl<'conn> SqliteStore<'conn> {
    /// Wraps a migrated connection, rejecting one that is not.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_store_connection_ready(conn)?;
        Ok(Self {
            conn,
            closure_strategy: ClosureStrategy::default(),
        })
    }

    /// Selects how `descendant_ids` computes closures.
    pub fn with_closure_strategy(mut self, closure_strategy: ClosureStrategy) -> Self {
        self.closure_strategy = closure_strategy;
        self
    }

    pub fn closure_strategy(&self) -> ClosureStrategy {
        self.closure_strategy
    }

    pub(crate) fn conn(&self) -> &'conn Connection {
        self.conn
    }
}

impl Store for SqliteStore<'_> {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        if !self.conn.is_autocommit() {
            return work(self);
        }

        // IMMEDIATE takes the write lock before the first read, so checks made
        // by `work` still hold when it writes.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;
        let value = work(self)?;
        tx.commit().map_err(RepoError::from)?;
        Ok(value)
    }
}

/// Encodes `ids` as a JSON array for a single `json_each(?)` parameter.
///
/// SQLite caps bound variables per statement, so id sets of any size go in
/// as one text value instead of one `?` each.
pub(crate) fn id_array<'a>(ids: impl IntoIterator<Item = &'a i64>) -> RepoResult<String> {
    let ids: Vec<i64> = ids.into_iter().copied().collect();
    serde_json::to_string(&ids)
        .map_err(|err| RepoError::InvalidData(format!("id list encoding failed: {err}")))
}

fn ensure_store_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["teams", "experiments", "experiments_teams"] {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}
