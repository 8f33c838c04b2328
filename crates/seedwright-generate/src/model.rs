use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use seedwright_core::Table;

use crate::prompt::Style;
use crate::recover::Repair;

/// One generated row, keyed by column name.
pub type Record = serde_json::Map<String, Value>;

/// Records recovered for one table, with enough column metadata to insert
/// them without further schema lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordCollection {
    pub table: String,
    /// Generated column names in table order.
    pub columns: Vec<String>,
    /// Declared types, parallel to `columns`.
    pub column_types: Vec<String>,
    /// Integer primary keys left for the store to assign.
    pub generated_keys: Vec<String>,
    pub records: Vec<Record>,
}

impl RecordCollection {
    pub fn for_table(table: &Table, records: Vec<Record>) -> Self {
        let columns = table.non_auto_columns();
        Self {
            table: table.name.clone(),
            columns: columns.iter().map(|column| column.name.clone()).collect(),
            column_types: columns.iter().map(|column| column.raw_type.clone()).collect(),
            generated_keys: table
                .generated_keys()
                .iter()
                .map(|column| column.name.clone())
                .collect(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Look up a record field, falling back to a case-insensitive match since
/// models do not always keep the declared casing.
pub fn field<'a>(record: &'a Record, column: &str) -> Option<&'a Value> {
    record.get(column).or_else(|| {
        record
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    })
}

/// Text form of a value as it is bound, written or compared.
///
/// `null` has no text form; nested arrays and objects become JSON text.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Options for the seeding engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Rows requested per table.
    pub rows: u64,
    /// Rows per insert statement.
    pub batch_size: usize,
    /// Existing target values fetched per foreign-key column.
    pub reference_limit: usize,
    /// Model calls per table before giving up on recovery.
    pub max_attempts_table: u32,
    /// Fail a table when its records violate declared constraints.
    pub strict: bool,
    pub style: Style,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            rows: 100,
            batch_size: 500,
            reference_limit: 1000,
            max_attempts_table: 3,
            strict: false,
            style: Style::Realistic,
        }
    }
}

/// Pipeline stage at which a table failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plan,
    Model,
    Recovery,
    Checks,
    Insert,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Model => "model",
            Stage::Recovery => "recovery",
            Stage::Checks => "checks",
            Stage::Insert => "insert",
        }
    }
}

/// Constraint violation found in a generated record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIssue {
    /// 1-based record position.
    pub row: usize,
    pub column: String,
    pub code: String,
    pub message: String,
}

/// Outcome of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableStatus {
    Seeded {
        rows_generated: u64,
        /// Records dropped for constraint violations.
        rows_dropped: u64,
        rows_inserted: u64,
        attempts: u32,
        repairs: Vec<Repair>,
        issues: Vec<RecordIssue>,
    },
    Failed {
        stage: Stage,
        attempts: u32,
        error: String,
    },
}

/// Summary of a seeded table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub rows_requested: u64,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub status: TableStatus,
}

impl TableReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, TableStatus::Seeded { .. })
    }
}

/// Report for a seeding run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub model: String,
    pub store: String,
    pub tables: Vec<TableReport>,
    /// Non-fatal conditions outside any single table.
    pub warnings: Vec<String>,
}

impl GenerationReport {
    pub fn new(run_id: impl Into<String>, model: &str, store: &str) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            model: model.to_string(),
            store: store.to_string(),
            tables: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|table| !table.succeeded())
            .map(|table| table.table.as_str())
            .collect()
    }

    pub fn rows_inserted(&self) -> u64 {
        self.tables
            .iter()
            .map(|table| match &table.status {
                TableStatus::Seeded { rows_inserted, .. } => *rows_inserted,
                TableStatus::Failed { .. } => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn stage_names_match_their_serialized_form() {
        let stages = [
            Stage::Plan,
            Stage::Model,
            Stage::Recovery,
            Stage::Checks,
            Stage::Insert,
        ];
        for stage in stages {
            assert_eq!(
                serde_json::to_value(stage).expect("serialize"),
                json!(stage.as_str())
            );
        }
    }
}
