mod client;
mod commands;
mod config;
mod redact;
mod registry;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use seedwright_generate::{GenerationError, Style};

use config::Settings;
use registry::{LogFormat, RegistryError};

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("schema error: {0}")]
    Core(#[from] seedwright_core::Error),
    #[error("{0}")]
    Generation(#[from] GenerationError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),
    #[error("{count} table(s) failed: {tables}; rerun one with --table <name>", count = .0.len(), tables = .0.join(", "))]
    TablesFailed(Vec<String>),
    #[error("{0} record issue(s) found")]
    IssuesFound(usize),
}

#[derive(Parser, Debug)]
#[command(
    name = "seedwright",
    version,
    about = "Seed relational databases with model-generated data"
)]
struct Cli {
    /// Settings file; `seedwright.toml` is used when present.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Format of log lines on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show parsed tables, insert order, cycles and warnings.
    Inspect(InspectArgs),
    /// Print the prompt sent to the model for one table.
    Prompt(PromptArgs),
    /// Recover records from raw model output.
    Recover(RecoverArgs),
    /// Generate rows and insert them.
    Seed(SeedArgs),
    /// Generate a sample without a database and check it.
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Schema file with CREATE TABLE statements.
    #[arg(long, value_name = "FILE")]
    schema: PathBuf,
}

#[derive(Args, Debug)]
struct GenerationArgs {
    /// Rows per table.
    #[arg(long)]
    rows: Option<u64>,
    /// realistic, minimal or edge-cases.
    #[arg(long)]
    style: Option<Style>,
    /// Model name passed to the model command.
    #[arg(long)]
    model: Option<String>,
}

impl GenerationArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(rows) = self.rows {
            settings.rows = rows;
        }
        if let Some(style) = self.style {
            settings.style = style;
        }
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
    }
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[command(flatten)]
    schema: SchemaArgs,
    /// Print the schema and dependency report as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Fail on reference cycles.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Args, Debug)]
struct PromptArgs {
    #[command(flatten)]
    schema: SchemaArgs,
    #[arg(long)]
    table: String,
    #[command(flatten)]
    generation: GenerationArgs,
}

#[derive(Args, Debug)]
struct RecoverArgs {
    #[command(flatten)]
    schema: SchemaArgs,
    #[arg(long)]
    table: String,
    /// File with the raw model output; stdin when absent.
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SeedArgs {
    #[command(flatten)]
    schema: SchemaArgs,
    /// PostgreSQL connection URL; falls back to `database_url` in settings.
    #[arg(long, value_name = "URL")]
    db: Option<String>,
    /// Seed only this table.
    #[arg(long)]
    table: Option<String>,
    /// Keep rows in memory, or write CSV files with --out.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Directory for CSV files of a dry run.
    #[arg(long, value_name = "DIR", requires = "dry_run")]
    out: Option<PathBuf>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// Fail tables whose records violate constraints, and fail on cycles.
    #[arg(long, default_value_t = false)]
    strict: bool,
    /// Directory that receives run records.
    #[arg(long, value_name = "DIR")]
    run_dir: Option<PathBuf>,
    #[command(flatten)]
    generation: GenerationArgs,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[command(flatten)]
    schema: SchemaArgs,
    #[arg(long)]
    table: Option<String>,
    /// Rows per table in the sample.
    #[arg(long, default_value_t = 10)]
    rows: u64,
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let settings = Settings::load(cli.config.as_deref())?;
    let format = cli.log_format;

    match cli.command {
        Command::Inspect(args) => {
            registry::init_logging(format, None)?;
            commands::run_inspect(args)
        }
        Command::Prompt(args) => {
            registry::init_logging(format, None)?;
            commands::run_prompt(args, settings)
        }
        Command::Recover(args) => {
            registry::init_logging(format, None)?;
            commands::run_recover(args)
        }
        Command::Validate(args) => {
            registry::init_logging(format, None)?;
            commands::run_validate(args, settings).await
        }
        // Seeding also logs into its run directory.
        Command::Seed(args) => commands::run_seed(args, settings, format).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_seed_flags() {
        let cli = Cli::try_parse_from([
            "seedwright",
            "--log-format",
            "json",
            "seed",
            "--schema",
            "schema.sql",
            "--dry-run",
            "--out",
            "out",
            "--rows",
            "5",
            "--style",
            "edge-cases",
        ])
        .expect("parse");
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Command::Seed(args) => {
                assert!(args.dry_run);
                assert_eq!(args.generation.rows, Some(5));
                assert_eq!(args.generation.style, Some(Style::EdgeCases));
                assert_eq!(args.out, Some(PathBuf::from("out")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn out_requires_dry_run() {
        let parsed = Cli::try_parse_from([
            "seedwright",
            "seed",
            "--schema",
            "schema.sql",
            "--out",
            "out",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn flags_override_settings() {
        let mut settings = Settings::default();
        GenerationArgs {
            rows: Some(3),
            style: Some(Style::Minimal),
            model: None,
        }
        .apply(&mut settings);
        assert_eq!(settings.rows, 3);
        assert_eq!(settings.style, Style::Minimal);
        assert_eq!(settings.model, "llama3");
    }
}
