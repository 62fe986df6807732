use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sqlsift_core::dialect::{build_retry_candidates_with, translate_mysql_to_postgres_with};
use sqlsift_core::execution_target::{pick_execution_target_with, ExecutionMode};
use sqlsift_core::parameters::{apply_parameters_with, extract_parameter_names_with};
use sqlsift_core::settings::{FileSettingsStore, Settings, SettingsError};
use sqlsift_core::splitter::split_statements_with;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SQLSIFT_LOG";
const FINDINGS_EXIT_CODE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Clean,
    Findings,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Clean => Self::SUCCESS,
            Outcome::Findings => Self::from(FINDINGS_EXIT_CODE),
        }
    }
}

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to read SQL from {path}: {source}")]
    ReadInput {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[derive(Debug, Parser)]
#[command(
    name = "sqlsift",
    version,
    about = "Quote-aware SQL splitting, auditing and rewriting"
)]
struct Cli {
    /// Settings file; defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log scanner decisions to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Input {
    /// SQL file; stdin when omitted.
    file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print top-level statements with byte offsets.
    Split(Input),
    /// Resolve what an execute command would run.
    Target {
        #[command(flatten)]
        input: Input,
        /// Cursor byte offset, also the selection start.
        #[arg(long, default_value_t = 0)]
        cursor: usize,
        /// Selection end byte offset; defaults to the cursor.
        #[arg(long)]
        selection_end: Option<usize>,
        #[arg(long)]
        mode: Option<ExecutionMode>,
    },
    /// List UPDATE/DELETE statements without WHERE. Exits with 2 on findings.
    Audit(Input),
    /// List named `:parameters`.
    Params(Input),
    /// Substitute `:parameters` with values.
    Bind {
        #[command(flatten)]
        input: Input,
        /// Binding in `name=value` form; repeatable.
        #[arg(long = "param", value_parser = parse_binding)]
        params: Vec<(String, String)>,
    },
    /// Rewrite backtick identifiers as double-quoted identifiers.
    Translate(Input),
    /// Propose rewritten queries after a failed execution.
    Retry {
        #[command(flatten)]
        input: Input,
        /// Error message returned by the failed query.
        #[arg(long)]
        error: String,
        /// Active database; overrides the settings file.
        #[arg(long)]
        database: Option<String>,
    },
}

fn parse_binding(raw: &str) -> Result<(String, String), String> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(format!("expected name=value, got `{raw}`"));
    };
    let name = name.trim().trim_start_matches(':');
    if name.is_empty() {
        return Err(format!("missing parameter name in `{raw}`"));
    }
    Ok((name.to_string(), value.to_string()))
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .try_init();
}

fn load_settings(config: Option<&PathBuf>) -> Result<Settings, AppError> {
    let store = match config {
        Some(path) => FileSettingsStore::load_from_path(path)?,
        None => match FileSettingsStore::load_default() {
            Ok(store) => store,
            Err(SettingsError::ConfigDirUnavailable) => return Ok(Settings::default()),
            Err(err) => return Err(err.into()),
        },
    };
    log::debug!("using settings from {}", store.path().display());
    Ok(store.settings().clone())
}

fn read_input(input: &Input, stdin: &mut impl Read) -> Result<String, AppError> {
    match &input.file {
        Some(path) => fs::read_to_string(path).map_err(|source| AppError::ReadInput {
            path: path.display().to_string(),
            source,
        }),
        None => {
            let mut sql = String::new();
            stdin
                .read_to_string(&mut sql)
                .map_err(|source| AppError::ReadInput {
                    path: "stdin".to_string(),
                    source,
                })?;
            Ok(sql)
        }
    }
}

fn write_json(out: &mut impl Write, value: &impl Serialize) -> Result<(), AppError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn run(
    cli: &Cli,
    settings: &Settings,
    stdin: &mut impl Read,
    out: &mut impl Write,
) -> Result<Outcome, AppError> {
    let options = settings.scan_options();

    match &cli.command {
        Command::Split(input) => {
            let sql = read_input(input, stdin)?;
            write_json(out, &split_statements_with(&sql, options))?;
        }
        Command::Target {
            input,
            cursor,
            selection_end,
            mode,
        } => {
            let sql = read_input(input, stdin)?;
            let mode = mode.unwrap_or(settings.execution.default_mode);
            let target = pick_execution_target_with(
                &sql,
                *cursor,
                selection_end.unwrap_or(*cursor),
                mode,
                options,
            );
            write_json(out, &target)?;
        }
        Command::Audit(input) => {
            let sql = read_input(input, stdin)?;
            let findings = settings.auditor().audit(&sql);
            write_json(out, &findings)?;
            if !findings.is_empty() {
                return Ok(Outcome::Findings);
            }
        }
        Command::Params(input) => {
            let sql = read_input(input, stdin)?;
            write_json(out, &extract_parameter_names_with(&sql, options))?;
        }
        Command::Bind { input, params } => {
            let sql = read_input(input, stdin)?;
            let values: HashMap<String, String> = params.iter().cloned().collect();
            out.write_all(apply_parameters_with(&sql, &values, options).as_bytes())?;
        }
        Command::Translate(input) => {
            let sql = read_input(input, stdin)?;
            out.write_all(translate_mysql_to_postgres_with(&sql, options).as_bytes())?;
        }
        Command::Retry {
            input,
            error,
            database,
        } => {
            let sql = read_input(input, stdin)?;
            let database = database.as_deref().or_else(|| settings.active_database());
            let candidates = build_retry_candidates_with(sql.trim(), error, database, options);
            write_json(out, &candidates)?;
        }
    }

    Ok(Outcome::Clean)
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = load_settings(cli.config.as_ref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let outcome = run(&cli, &settings, &mut io::stdin().lock(), &mut out)?;
    out.flush()?;
    Ok(outcome.into())
}
