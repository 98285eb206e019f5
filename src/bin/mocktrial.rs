//! Command line access to the pairing, allocation and progression
//! operations.
//!
//! Results are printed to stdout as JSON. Errors are printed to stderr (also
//! as JSON) and the process exits with a non-zero status.

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use mocktrial::{
    config::{Config, ConfigError},
    engine::Engine,
    state::open_pool,
    store::verify_schema,
    tournaments::{TournamentStatus, standings::RecordedScores},
};
use serde_json::json;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file. `DATABASE_URL` overrides the database it
    /// names.
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON file holding team records and trial winners.
    #[arg(long)]
    scores: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Applies any pending migrations.
    Migrate,
    /// Checks the database schema without changing it.
    CheckSchema,
    /// Moves a tournament to a later status.
    Transition {
        tournament: String,
        status: TournamentStatus,
    },
    /// Generates pairings for a round.
    Pair {
        round: String,
        /// Replace existing pairings (and take over an abandoned pairing
        /// attempt).
        #[arg(long)]
        force: bool,
    },
    /// Assigns courtrooms to the trials of a round.
    Allocate { round: String },
    /// Publishes a round, making its trials visible to competitors.
    Publish { round: String },
    /// Breaks to (or advances) the elimination bracket.
    Advance { tournament: String },
    /// Ranks the teams of a tournament by their preliminary record.
    Standings { tournament: String },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not read scores from {path}: {reason}")]
    Scores { path: String, reason: String },
    #[error(transparent)]
    Engine(#[from] mocktrial::Error),
    #[error("could not encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    fn to_json(&self) -> serde_json::Value {
        match self {
            CliError::Engine(e) => json!({
                "error": e.to_string(),
                "wrote_nothing": e.wrote_nothing(),
            }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return report(CliError::from(e)),
    };
    // `Config::load` has already checked the level
    let level = config.log_level().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli, config).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => report(e),
    }
}

fn report(e: CliError) -> ExitCode {
    tracing::error!("{e}");
    eprintln!("{}", e.to_json());
    ExitCode::FAILURE
}

fn load_scores(path: Option<PathBuf>) -> Result<RecordedScores, CliError> {
    let Some(path) = path else {
        return Ok(RecordedScores::default());
    };
    let scores_error = |reason: String| CliError::Scores {
        path: path.display().to_string(),
        reason,
    };

    let text =
        std::fs::read_to_string(&path).map_err(|e| scores_error(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| scores_error(e.to_string()))
}

async fn check_schema(config: Config) -> Result<String, CliError> {
    let pool = tokio::task::spawn_blocking(move || open_pool(&config))
        .await
        .map_err(mocktrial::Error::from)??;
    tokio::task::spawn_blocking(move || -> Result<(), mocktrial::Error> {
        let mut conn = pool.get()?;
        verify_schema(&mut conn)
    })
    .await
    .map_err(mocktrial::Error::from)??;

    Ok(json!({ "schema": "ok" }).to_string())
}

async fn run(cli: Cli, config: Config) -> Result<String, CliError> {
    let command = match cli.command {
        Command::CheckSchema => return check_schema(config).await,
        command => command,
    };

    let scores = load_scores(cli.scores)?;
    let engine = Engine::connect(config, Arc::new(scores)).await?;

    let output = match command {
        Command::CheckSchema => json!({ "schema": "ok" }),
        Command::Migrate => json!({ "migrated": true }),
        Command::Transition { tournament, status } => serde_json::to_value(
            engine.transition_tournament(&tournament, status).await?,
        )?,
        Command::Pair { round, force } => serde_json::to_value(
            engine.generate_pairings(&round, force).await?,
        )?,
        Command::Allocate { round } => {
            serde_json::to_value(engine.allocate_courtrooms(&round).await?)?
        }
        Command::Publish { round } => {
            serde_json::to_value(engine.publish_round(&round).await?)?
        }
        Command::Advance { tournament } => serde_json::to_value(
            engine.advance_tournament_phase(&tournament).await?,
        )?,
        Command::Standings { tournament } => {
            serde_json::to_value(engine.standings(&tournament).await?)?
        }
    };

    Ok(serde_json::to_string_pretty(&output)?)
}
