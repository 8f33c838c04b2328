use serde::{Deserialize, Serialize};

use crate::schema::Column;

/// Reference from a column to another table's column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

impl ForeignKey {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// `table.column`, as used for reference pools and prompts.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

/// One top-level clause of a table body, as recognized by the parser.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Clause {
    Column(Column),
    PrimaryKey(Vec<String>),
    ForeignKey {
        columns: Vec<String>,
        table: String,
        target_columns: Vec<String>,
    },
    Unique(Vec<String>),
    CheckIn {
        column: String,
        values: Vec<String>,
    },
    /// Recognized shape that the model cannot represent, or no shape at all.
    Unsupported(String),
}

impl Clause {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Clause::Column(_) => "column",
            Clause::PrimaryKey(_) => "primary key",
            Clause::ForeignKey { .. } => "foreign key",
            Clause::Unique(_) => "unique",
            Clause::CheckIn { .. } => "check",
            Clause::Unsupported(_) => "unsupported",
        }
    }
}
