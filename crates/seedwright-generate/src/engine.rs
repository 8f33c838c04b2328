use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use seedwright_core::{Schema, Table};

use crate::checks::check_records;
use crate::client::ModelClient;
use crate::errors::GenerationError;
use crate::model::{
    GenerateOptions, GenerationReport, RecordCollection, RecordIssue, Stage, TableReport,
    TableStatus,
};
use crate::planner::GenerationTask;
use crate::prompt::{PromptRequest, ReferencePool, build_prompt};
use crate::recover::{Recovery, recover};
use crate::store::RecordStore;

/// Issue codes that do not keep a record from being inserted.
const HARMLESS_ISSUES: &[&str] = &["unknown_column"];

/// Progress notifications emitted while a run advances.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    TableStarted {
        table: String,
        index: usize,
        total: usize,
    },
    Attempt {
        table: String,
        attempt: u32,
    },
    TableSeeded {
        table: String,
        rows_inserted: u64,
    },
    TableFailed {
        table: String,
        stage: Stage,
        error: String,
    },
}

type ProgressCallback = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Drives prompt, recovery, checks and insert for each planned table.
///
/// A table that fails at any stage is reported and the run moves on; later
/// tables that depend on it simply see no reference values.
pub struct SeedEngine {
    options: GenerateOptions,
    run_id: Option<String>,
    progress: Option<ProgressCallback>,
}

struct TableFailure {
    stage: Stage,
    error: GenerationError,
}

impl TableFailure {
    fn new(stage: Stage, error: impl Into<GenerationError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

impl SeedEngine {
    pub fn new(options: GenerateOptions) -> Self {
        Self {
            options,
            run_id: None,
            progress: None,
        }
    }

    /// Use a caller-provided run id instead of a fresh one.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_progress(mut self, callback: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub async fn run(
        &self,
        schema: &Schema,
        tasks: &[GenerationTask],
        client: &dyn ModelClient,
        store: &mut dyn RecordStore,
    ) -> GenerationReport {
        let run_id = self
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut report = GenerationReport::new(run_id, client.name(), store.name());
        let run_start = Instant::now();

        info!(
            event = "run.started",
            run_id = %report.run_id,
            tables = tasks.len(),
            model = client.name(),
            store = store.name(),
            strict = self.options.strict,
            "seeding started"
        );

        for (index, task) in tasks.iter().enumerate() {
            let table_start = Instant::now();
            self.emit(ProgressEvent::TableStarted {
                table: task.table.clone(),
                index,
                total: tasks.len(),
            });
            info!(event = "table.started", table = %task.table, rows = task.rows, "seeding table");

            let mut attempts = 0;
            let outcome = match schema.require_table(&task.table) {
                Ok(table) => {
                    self.seed_table(table, task.rows, client, store, &mut attempts, &mut report.warnings)
                        .await
                }
                Err(err) => Err(TableFailure::new(Stage::Plan, err)),
            };
            let duration_ms = table_start.elapsed().as_millis() as u64;

            let status = match outcome {
                Ok(status) => {
                    if let TableStatus::Seeded {
                        rows_inserted,
                        rows_dropped,
                        ..
                    } = &status
                    {
                        info!(
                            event = "table.seeded",
                            table = %task.table,
                            rows_inserted,
                            rows_dropped,
                            attempts,
                            duration_ms,
                            "table seeded"
                        );
                        self.emit(ProgressEvent::TableSeeded {
                            table: task.table.clone(),
                            rows_inserted: *rows_inserted,
                        });
                    }
                    status
                }
                Err(failure) => {
                    let error = failure.error.to_string();
                    warn!(
                        event = "table.failed",
                        table = %task.table,
                        stage = failure.stage.as_str(),
                        attempts,
                        error = %error,
                        "table failed"
                    );
                    self.emit(ProgressEvent::TableFailed {
                        table: task.table.clone(),
                        stage: failure.stage,
                        error: error.clone(),
                    });
                    TableStatus::Failed {
                        stage: failure.stage,
                        attempts,
                        error,
                    }
                }
            };

            report.tables.push(TableReport {
                table: task.table.clone(),
                rows_requested: task.rows,
                duration_ms,
                status,
            });
        }

        info!(
            event = "run.finished",
            run_id = %report.run_id,
            rows_inserted = report.rows_inserted(),
            failed = report.failed_tables().len(),
            duration_ms = run_start.elapsed().as_millis() as u64,
            "seeding finished"
        );
        report
    }

    async fn seed_table(
        &self,
        table: &Table,
        rows: u64,
        client: &dyn ModelClient,
        store: &mut dyn RecordStore,
        attempts: &mut u32,
        warnings: &mut Vec<String>,
    ) -> Result<TableStatus, TableFailure> {
        let references = self.fetch_references(table, store, warnings).await;
        let prompt = build_prompt(&PromptRequest {
            table,
            rows,
            style: self.options.style,
            references: &references,
        });

        let recovery = self.generate(table, &prompt, client, attempts).await?;
        let rows_generated = recovery.records.len() as u64;
        let mut records = recovery.records;
        if records.len() as u64 > rows {
            debug!(
                event = "table.rows_trimmed",
                table = %table.name,
                received = records.len(),
                requested = rows,
                "model returned extra rows"
            );
            records.truncate(rows as usize);
        }

        let collection = RecordCollection::for_table(table, records);
        let issues = check_records(table, &collection, &references);
        let (collection, rows_dropped) = self.apply_checks(table, collection, &issues)?;

        let rows_inserted = store
            .insert(&collection, self.options.batch_size)
            .await
            .map_err(|err| TableFailure::new(Stage::Insert, err))?;

        Ok(TableStatus::Seeded {
            rows_generated,
            rows_dropped,
            rows_inserted,
            attempts: *attempts,
            repairs: recovery.repairs,
            issues,
        })
    }

    /// Reference values for every foreign-key column. A store that cannot
    /// answer leaves that column without values.
    async fn fetch_references(
        &self,
        table: &Table,
        store: &mut dyn RecordStore,
        warnings: &mut Vec<String>,
    ) -> ReferencePool {
        let mut pool = ReferencePool::new();
        for (column, target) in table.foreign_keys() {
            if column.is_auto_generated() {
                continue;
            }
            match store
                .reference_values(target, self.options.reference_limit)
                .await
            {
                Ok(values) => {
                    debug!(
                        event = "table.references",
                        table = %table.name,
                        column = %column.name,
                        target = %target.qualified(),
                        values = values.len(),
                        "reference values fetched"
                    );
                    pool.insert(column.name.clone(), values);
                }
                Err(err) => {
                    warn!(
                        event = "table.references_unavailable",
                        table = %table.name,
                        column = %column.name,
                        error = %err,
                        "reference values unavailable"
                    );
                    warnings.push(format!(
                        "{}.{}: reference values unavailable: {err}",
                        table.name, column.name
                    ));
                }
            }
        }
        pool
    }

    /// Call the model until its output yields at least one record.
    async fn generate(
        &self,
        table: &Table,
        prompt: &str,
        client: &dyn ModelClient,
        attempts: &mut u32,
    ) -> Result<Recovery, TableFailure> {
        let max_attempts = self.options.max_attempts_table.max(1);
        loop {
            *attempts += 1;
            self.emit(ProgressEvent::Attempt {
                table: table.name.clone(),
                attempt: *attempts,
            });

            let failure = match client.complete(prompt).await {
                Err(err) => TableFailure::new(Stage::Model, err),
                Ok(raw) => match recover(&raw) {
                    Ok(recovery) if !recovery.records.is_empty() => return Ok(recovery),
                    Ok(_) => TableFailure::new(
                        Stage::Recovery,
                        GenerationError::Model("model returned no records".to_string()),
                    ),
                    Err(err) => TableFailure::new(Stage::Recovery, err),
                },
            };

            if *attempts >= max_attempts {
                return Err(failure);
            }
            warn!(
                event = "table.retry",
                table = %table.name,
                attempt = *attempts,
                stage = failure.stage.as_str(),
                error = %failure.error,
                "attempt failed, retrying"
            );
        }
    }

    /// Fail the table in strict mode, otherwise drop the offending records.
    fn apply_checks(
        &self,
        table: &Table,
        mut collection: RecordCollection,
        issues: &[RecordIssue],
    ) -> Result<(RecordCollection, u64), TableFailure> {
        let blocking: Vec<&RecordIssue> = issues
            .iter()
            .filter(|issue| !HARMLESS_ISSUES.contains(&issue.code.as_str()))
            .collect();
        if blocking.is_empty() {
            return Ok((collection, 0));
        }

        if self.options.strict {
            let first = blocking[0];
            return Err(TableFailure::new(
                Stage::Checks,
                GenerationError::Checks(format!(
                    "{} constraint violation(s); first at row {}: {}",
                    blocking.len(),
                    first.row,
                    first.message
                )),
            ));
        }

        let before = collection.records.len();
        let mut row = 0;
        collection.records.retain(|_| {
            row += 1;
            !blocking.iter().any(|issue| issue.row == row)
        });
        let dropped = (before - collection.records.len()) as u64;
        warn!(
            event = "table.rows_dropped",
            table = %table.name,
            dropped,
            issues = blocking.len(),
            "records violating constraints dropped"
        );

        if collection.is_empty() {
            return Err(TableFailure::new(
                Stage::Checks,
                GenerationError::Checks(
                    "every generated record violates a constraint".to_string(),
                ),
            ));
        }
        Ok((collection, dropped))
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(&event);
        }
    }
}
