use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use seedwright_core::{Column, Schema, load_schema};
use seedwright_generate::{
    CsvStore, GenerationError, GenerationReport, MemoryStore, PlanOptions, ProgressEvent,
    PromptRequest, RecordCollection, ReferencePool, SeedEngine, TableStatus, build_prompt,
    check_records, plan_tables, recover,
};

use crate::client::CommandClient;
use crate::config::Settings;
use crate::redact::{RedactedConnection, redact_connection};
use crate::registry::{self, LogFormat, RunContext, start_run, write_report};
use crate::store::PostgresStore;
use crate::{CliError, InspectArgs, PromptArgs, RecoverArgs, SeedArgs, ValidateArgs};

/// Rows shown per table after an in-memory dry run.
const PREVIEW_ROWS: usize = 5;

pub fn run_inspect(args: InspectArgs) -> Result<(), CliError> {
    let schema = load_schema_file(&args.schema.schema)?;

    if args.json {
        let document = json!({
            "schema": &schema,
            "dependencies": schema.dependency_report(),
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        print_schema(&schema)?;
    }

    if args.strict {
        schema.ensure_acyclic()?;
    }
    Ok(())
}

pub fn run_prompt(args: PromptArgs, mut settings: Settings) -> Result<(), CliError> {
    args.generation.apply(&mut settings);
    let schema = load_schema_file(&args.schema.schema)?;
    let table = schema.require_table(&args.table)?;

    let references = ReferencePool::new();
    let prompt = build_prompt(&PromptRequest {
        table,
        rows: settings.rows,
        style: settings.style,
        references: &references,
    });
    print!("{prompt}");
    Ok(())
}

pub fn run_recover(args: RecoverArgs) -> Result<(), CliError> {
    let schema = load_schema_file(&args.schema.schema)?;
    let table = schema.require_table(&args.table)?;

    let raw = match &args.input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let recovery = recover(&raw).map_err(GenerationError::from)?;
    for repair in &recovery.repairs {
        info!(event = "recover.repaired", table = %table.name, ?repair, "payload repaired");
    }
    let collection = RecordCollection::for_table(table, recovery.records);
    let issues = check_records(table, &collection, &ReferencePool::new());
    for issue in &issues {
        warn!(
            event = "recover.issue",
            row = issue.row,
            column = %issue.column,
            code = %issue.code,
            "{}",
            issue.message
        );
    }

    let document = json!({
        "table": table.name,
        "records": collection.records,
        "repairs": recovery.repairs,
        "issues": issues,
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

pub async fn run_validate(args: ValidateArgs, mut settings: Settings) -> Result<(), CliError> {
    settings.rows = args.rows;
    if let Some(model) = args.model {
        settings.model = model;
    }

    let schema = load_schema_file(&args.schema.schema)?;
    let tasks = plan_tables(
        &schema,
        &PlanOptions {
            rows: settings.rows,
            only: args.table,
        },
    )?;
    let client = model_client(&settings)?;
    let engine = SeedEngine::new(settings.generate_options(false)).with_progress(print_progress);

    let mut store = MemoryStore::new();
    let report = engine.run(&schema, &tasks, &client, &mut store).await;
    print_summary(&report, true)?;

    let failed = report.failed_tables();
    if !failed.is_empty() {
        return Err(CliError::TablesFailed(
            failed.into_iter().map(str::to_string).collect(),
        ));
    }
    let issues: usize = report
        .tables
        .iter()
        .map(|table| match &table.status {
            TableStatus::Seeded { issues, .. } => issues.len(),
            TableStatus::Failed { .. } => 0,
        })
        .sum();
    if issues > 0 {
        return Err(CliError::IssuesFound(issues));
    }
    Ok(())
}

/// Where a seeding run puts its rows.
#[derive(Debug, Clone, PartialEq)]
enum Target {
    Memory,
    Csv(PathBuf),
    Postgres(String),
}

impl Target {
    fn resolve(args: &SeedArgs, settings: &Settings) -> Result<Self, CliError> {
        if args.dry_run {
            return Ok(args.out.clone().map_or(Target::Memory, Target::Csv));
        }
        let url = args
            .db
            .clone()
            .or_else(|| settings.database_url.clone())
            .ok_or_else(|| {
                CliError::InvalidConfig(
                    "a connection URL is required; pass --db or use --dry-run".to_string(),
                )
            })?;
        detect_engine(&url)?;
        Ok(Target::Postgres(url))
    }

    fn name(&self) -> &'static str {
        match self {
            Target::Memory => "memory",
            Target::Csv(_) => "csv",
            Target::Postgres(_) => "postgres",
        }
    }

    fn connection(&self) -> Option<RedactedConnection> {
        match self {
            Target::Postgres(url) => Some(redact_connection(url)),
            Target::Memory | Target::Csv(_) => None,
        }
    }
}

pub async fn run_seed(
    args: SeedArgs,
    mut settings: Settings,
    format: LogFormat,
) -> Result<(), CliError> {
    args.generation.apply(&mut settings);
    if let Some(batch_size) = args.batch_size {
        settings.batch_size = batch_size;
    }
    let target = Target::resolve(&args, &settings)?;
    let options = settings.generate_options(args.strict);

    let ctx = RunContext {
        run_id: Uuid::new_v4().to_string(),
        started_at: Utc::now(),
        run_dir: args.run_dir.clone().unwrap_or_else(|| settings.run_dir.clone()),
        schema_path: args.schema.schema.clone(),
        model: settings.model.clone(),
        store: target.name().to_string(),
        only_table: args.table.clone(),
        options: options.clone(),
        connection: target.connection(),
    };
    let paths = start_run(&ctx)?;
    registry::init_logging(format, Some(&paths.logs_path))?;
    info!(event = "run.created", run_id = %ctx.run_id, path = %paths.root.display(), "run directory created");

    let schema = load_schema_file(&args.schema.schema)?;
    if args.strict {
        schema.ensure_acyclic()?;
    }
    let tasks = plan_tables(
        &schema,
        &PlanOptions {
            rows: settings.rows,
            only: args.table.clone(),
        },
    )?;
    let client = model_client(&settings)?;
    let engine = SeedEngine::new(options)
        .with_run_id(ctx.run_id.clone())
        .with_progress(print_progress);

    let report = match &target {
        Target::Postgres(url) => {
            let mut store = PostgresStore::connect(url).await?;
            engine.run(&schema, &tasks, &client, &mut store).await
        }
        Target::Csv(dir) => {
            let mut store = CsvStore::create(dir)?;
            let report = engine.run(&schema, &tasks, &client, &mut store).await;
            info!(
                event = "csv.written",
                dir = %store.dir().display(),
                bytes = store.bytes_written(),
                "csv files written"
            );
            report
        }
        Target::Memory => {
            let mut store = MemoryStore::new();
            let report = engine.run(&schema, &tasks, &client, &mut store).await;
            print_preview(&report, &store)?;
            report
        }
    };

    write_report(&paths, &report)?;
    print_summary(&report, false)?;
    println!("run record: {}", paths.root.display());

    let failed = report.failed_tables();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::TablesFailed(
            failed.into_iter().map(str::to_string).collect(),
        ))
    }
}

fn detect_engine(conn: &str) -> Result<&'static str, CliError> {
    if conn.starts_with("postgres://") || conn.starts_with("postgresql://") {
        Ok("postgres")
    } else {
        Err(CliError::UnsupportedEngine(redact_connection(conn).redacted))
    }
}

fn model_client(settings: &Settings) -> Result<CommandClient, CliError> {
    let client = CommandClient::new(
        &settings.model,
        &settings.model_command,
        Duration::from_secs(settings.timeout_secs),
    )?;
    Ok(client)
}

fn load_schema_file(path: &Path) -> Result<Schema, CliError> {
    let schema = load_schema(path)?;
    for warning in schema.warnings() {
        warn!(event = "schema.warning", code = warning.code(), "{warning}");
    }
    info!(
        event = "schema.loaded",
        path = %path.display(),
        tables = schema.tables().len(),
        "schema loaded"
    );
    Ok(schema)
}

fn print_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::TableStarted {
            table,
            index,
            total,
        } => eprintln!("[{}/{total}] {table}", index + 1),
        ProgressEvent::Attempt { table, attempt } if *attempt > 1 => {
            eprintln!("      {table}: attempt {attempt}")
        }
        ProgressEvent::TableFailed {
            table,
            stage,
            error,
        } => eprintln!("      {table} failed at {}: {error}", stage.as_str()),
        _ => {}
    }
}

fn print_schema(schema: &Schema) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{} table(s) in insert order:", schema.tables().len())?;
    for (idx, table) in schema.ordered_tables().into_iter().enumerate() {
        let depends_on = schema.depends_on(&table.name);
        if depends_on.is_empty() {
            writeln!(out, "{:>3}. {}", idx + 1, table.name)?;
        } else {
            writeln!(out, "{:>3}. {} -> {}", idx + 1, table.name, depends_on.join(", "))?;
        }
        for column in &table.columns {
            writeln!(
                out,
                "       {} {} ({}){}",
                column.name,
                column.raw_type,
                column.semantic_type,
                column_flags(column)
            )?;
        }
    }

    if !schema.cycles().is_empty() {
        writeln!(out, "\ncycles:")?;
        for cycle in schema.cycles() {
            writeln!(out, "  {}", cycle.join(" -> "))?;
        }
    }
    if !schema.warnings().is_empty() {
        writeln!(out, "\nwarnings:")?;
        for warning in schema.warnings() {
            writeln!(out, "  [{}] {warning}", warning.code())?;
        }
    }
    Ok(())
}

fn column_flags(column: &Column) -> String {
    let mut flags = Vec::new();
    if column.is_auto_generated() {
        flags.push("generated key".to_string());
    } else if column.primary_key {
        flags.push("primary key".to_string());
    }
    if column.not_null {
        flags.push("not null".to_string());
    }
    if column.unique {
        flags.push("unique".to_string());
    }
    if let Some(fk) = &column.foreign_key {
        flags.push(format!("references {}", fk.qualified()));
    }
    if let Some(allowed) = &column.allowed_values {
        flags.push(format!("in ({})", allowed.join(", ")));
    }
    if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    }
}

fn print_preview(report: &GenerationReport, store: &MemoryStore) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    for table in report.tables.iter().filter(|table| table.succeeded()) {
        let rows = store.rows(&table.table);
        let shown = &rows[..rows.len().min(PREVIEW_ROWS)];
        writeln!(out, "{} ({} row(s)):", table.table, rows.len())?;
        writeln!(out, "{}", serde_json::to_string_pretty(shown)?)?;
    }
    Ok(())
}

fn print_summary(report: &GenerationReport, with_issues: bool) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "run {} ({} -> {})", report.run_id, report.model, report.store)?;
    for table in &report.tables {
        match &table.status {
            TableStatus::Seeded {
                rows_inserted,
                rows_dropped,
                attempts,
                issues,
                ..
            } => {
                writeln!(
                    out,
                    "  {:<24} {rows_inserted}/{} rows, {attempts} attempt(s), {rows_dropped} dropped, {} issue(s)",
                    table.table,
                    table.rows_requested,
                    issues.len()
                )?;
                if with_issues {
                    for issue in issues {
                        writeln!(
                            out,
                            "      row {} {}: {} ({})",
                            issue.row, issue.column, issue.message, issue.code
                        )?;
                    }
                }
            }
            TableStatus::Failed {
                stage,
                attempts,
                error,
            } => writeln!(
                out,
                "  {:<24} failed at {} after {attempts} attempt(s): {error}",
                table.table,
                stage.as_str()
            )?,
        }
    }
    for warning in &report.warnings {
        writeln!(out, "  warning: {warning}")?;
    }
    writeln!(out, "{} row(s) inserted", report.rows_inserted())?;
    Ok(())
}
