//! `exptrack` command-line entry point.
//!
//! # Responsibility
//! - Resolve configuration (environment, then flags), start logging and open
//!   the database.
//! - Run one endpoint per invocation and print its status and JSON body.
//!
//! # Invariants
//! - Exit code is 0 for 2xx responses, 1 for rejected requests and 2 when
//!   the process could not be set up.
//! - Without `--db` or `EXPTRACK_DB_PATH`, data lives in `exptrack.db` in the
//!   working directory. An in-memory database is only used on `--in-memory`.

use clap::{Args, Parser, Subcommand};
use exptrack_core::api::TEAM_IDS_QUERY_KEY;
use exptrack_core::db::open_from_config;
use exptrack_core::{init_logging, Api, ApiResponse, AppConfig, ClosureStrategy, SqliteStore};
use log::info;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;

/// Database file used when neither `--db` nor `EXPTRACK_DB_PATH` is set.
const DEFAULT_DB_FILE_NAME: &str = "exptrack.db";

#[derive(Parser)]
#[command(name = "exptrack")]
#[command(author, version, about = "Track experiments and the teams that run them")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

/// Overrides for environment configuration.
#[derive(Args)]
struct GlobalArgs {
    /// SQLite database file; defaults to EXPTRACK_DB_PATH, then ./exptrack.db.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Use a throwaway in-memory database; nothing outlives the command.
    #[arg(long, global = true, conflicts_with = "db")]
    in_memory: bool,
    /// trace|debug|info|warn|error
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Directory for rolling log files; stderr when unset.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    /// Descendant closure implementation: in_process|recursive_sql.
    #[arg(long, global = true)]
    closure: Option<ClosureStrategy>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a team, optionally under a parent.
    CreateTeam {
        #[arg(long)]
        name: String,
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Show a team with its experiments.
    ShowTeam { id: i64 },
    /// Create an experiment linked to one or two teams.
    CreateExperiment {
        #[arg(long)]
        description: String,
        #[arg(long)]
        sample_ratio: i64,
        /// Repeat for a second team.
        #[arg(long = "team", required = true)]
        teams: Vec<i64>,
    },
    /// Replace the teams of an experiment.
    UpdateTeams {
        id: i64,
        #[arg(long = "team", required = true)]
        teams: Vec<i64>,
    },
    /// List experiments, optionally filtered by team (descendants included).
    ListExperiments {
        #[arg(long)]
        page: Option<String>,
        #[arg(long)]
        limit: Option<String>,
        /// asc|desc
        #[arg(long)]
        order_by: Option<String>,
        /// id|sample_ratio
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long = "team")]
        teams: Vec<String>,
    },
    /// Report service health.
    Health,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = AppConfig::from_env()
        .map_err(|err| err.to_string())
        .and_then(|base| run(cli, base));
    match outcome {
        Ok(response) => match print_response(&response) {
            Ok(()) if response.is_success() => ExitCode::SUCCESS,
            Ok(()) => ExitCode::from(1),
            Err(message) => {
                eprintln!("exptrack: {message}");
                ExitCode::from(2)
            }
        },
        Err(message) => {
            eprintln!("exptrack: {message}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli, base: AppConfig) -> Result<ApiResponse, String> {
    let config = resolve_config(&cli.global, base)?;
    init_logging(&config.logging)?;

    let conn = open_from_config(&config.database).map_err(|err| err.to_string())?;
    let store = SqliteStore::try_new(&conn)
        .map_err(|err| err.to_string())?
        .with_closure_strategy(config.hierarchy.closure_strategy);
    info!(
        "event=cli_start module=cli status=ok closure_strategy={} db={}",
        config.hierarchy.closure_strategy.as_str(),
        config
            .database
            .path
            .as_deref()
            .map_or_else(|| ":memory:".to_string(), |path| path.display().to_string())
    );

    Ok(dispatch(&Api::new(store), cli.command))
}

/// Applies flag overrides on top of `base` (normally the environment).
fn resolve_config(global: &GlobalArgs, base: AppConfig) -> Result<AppConfig, String> {
    let mut config = base;

    if global.in_memory {
        config.database.path = None;
    } else if let Some(path) = &global.db {
        config.database.path = Some(path.clone());
    } else if config.database.path.is_none() {
        config.database.path = Some(PathBuf::from(DEFAULT_DB_FILE_NAME));
    }
    if let Some(level) = &global.log_level {
        config.logging.level = level.clone();
    }
    if let Some(dir) = &global.log_dir {
        config.logging.dir = Some(dir.clone());
    }
    if let Some(strategy) = global.closure {
        config.hierarchy.closure_strategy = strategy;
    }

    // Logging requires an absolute directory.
    if let Some(dir) = config.logging.dir.take() {
        let absolute = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()
                .map_err(|err| format!("failed to resolve current directory: {err}"))?
                .join(dir)
        };
        config.logging.dir = Some(absolute);
    }

    Ok(config)
}

fn dispatch<S>(api: &Api<S>, command: Commands) -> ApiResponse
where
    S: exptrack_core::Store + Clone,
{
    match command {
        Commands::CreateTeam { name, parent } => {
            api.create_team(&json!({"name": name, "parent_team_id": parent}))
        }
        Commands::ShowTeam { id } => api.get_team(id),
        Commands::CreateExperiment {
            description,
            sample_ratio,
            teams,
        } => api.create_experiment(&json!({
            "description": description,
            "sample_ratio": sample_ratio,
            "team_ids": teams,
        })),
        Commands::UpdateTeams { id, teams } => {
            api.update_experiment(id, &json!({"team_ids": teams}))
        }
        Commands::ListExperiments {
            page,
            limit,
            order_by,
            sort_by,
            teams,
        } => {
            let mut query: Vec<(String, String)> = [
                ("page", page),
                ("limit", limit),
                ("order_by", order_by),
                ("sort_by", sort_by),
            ]
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
            .collect();
            query.extend(
                teams
                    .into_iter()
                    .map(|team| (TEAM_IDS_QUERY_KEY.to_string(), team)),
            );
            api.list_experiments(&query)
        }
        Commands::Health => api.health(),
    }
}

fn print_response(response: &ApiResponse) -> Result<(), String> {
    let body = match &response.body {
        Value::String(message) => message.clone(),
        other => serde_json::to_string_pretty(other)
            .map_err(|err| format!("failed to render response: {err}"))?,
    };
    println!("{}", response.status);
    println!("{body}");
    Ok(())
}
