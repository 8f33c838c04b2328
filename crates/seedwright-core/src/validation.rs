use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::schema::Table;

/// Non-fatal condition found while building a schema.
///
/// None of these stop extraction; they are collected on the
/// [`Schema`](crate::Schema) so callers can surface them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum SchemaWarning {
    /// A clause with no supported shape was skipped.
    UnsupportedClause { table: String, clause: String },
    /// A table-level constraint named a column the table does not have.
    UnmatchedColumn {
        table: String,
        column: String,
        constraint: String,
    },
    DuplicateTable { table: String },
    DuplicateColumn { table: String, column: String },
    /// The declaration body never closed; columns were read up to the end.
    UnterminatedBody { table: String },
    /// A foreign key targets a table that is not declared.
    DanglingReference {
        table: String,
        column: String,
        target: String,
    },
    /// A foreign key targets a declared table but an unknown column.
    UnknownTargetColumn {
        table: String,
        column: String,
        target: String,
        target_column: String,
    },
    /// Distinct tables reference each other; their relative order is arbitrary.
    DependencyCycle { tables: Vec<String> },
}

impl SchemaWarning {
    pub fn code(&self) -> &'static str {
        match self {
            SchemaWarning::UnsupportedClause { .. } => "unsupported_clause",
            SchemaWarning::UnmatchedColumn { .. } => "unmatched_column",
            SchemaWarning::DuplicateTable { .. } => "duplicate_table",
            SchemaWarning::DuplicateColumn { .. } => "duplicate_column",
            SchemaWarning::UnterminatedBody { .. } => "unterminated_body",
            SchemaWarning::DanglingReference { .. } => "dangling_reference",
            SchemaWarning::UnknownTargetColumn { .. } => "unknown_target_column",
            SchemaWarning::DependencyCycle { .. } => "dependency_cycle",
        }
    }
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaWarning::UnsupportedClause { table, clause } => {
                write!(f, "{table}: skipped unsupported clause `{clause}`")
            }
            SchemaWarning::UnmatchedColumn {
                table,
                column,
                constraint,
            } => write!(f, "{table}: {constraint} names unknown column `{column}`"),
            SchemaWarning::DuplicateTable { table } => {
                write!(f, "{table}: declared more than once, keeping the first")
            }
            SchemaWarning::DuplicateColumn { table, column } => {
                write!(f, "{table}.{column}: declared more than once, keeping the first")
            }
            SchemaWarning::UnterminatedBody { table } => {
                write!(f, "{table}: declaration body is not closed")
            }
            SchemaWarning::DanglingReference {
                table,
                column,
                target,
            } => write!(f, "{table}.{column}: references undeclared table `{target}`"),
            SchemaWarning::UnknownTargetColumn {
                table,
                column,
                target,
                target_column,
            } => write!(
                f,
                "{table}.{column}: references unknown column `{target}.{target_column}`"
            ),
            SchemaWarning::DependencyCycle { tables } => {
                write!(f, "dependency cycle: {}", tables.join(" -> "))
            }
        }
    }
}

/// Check every foreign key against the declared tables.
///
/// `index` maps lowercased table names to positions in `tables`.
pub(crate) fn reference_warnings(
    tables: &[Table],
    index: &HashMap<String, usize>,
) -> Vec<SchemaWarning> {
    let mut warnings = Vec::new();

    for table in tables {
        for (column, fk) in table.foreign_keys() {
            match index.get(&fk.table.to_lowercase()) {
                None => warnings.push(SchemaWarning::DanglingReference {
                    table: table.name.clone(),
                    column: column.name.clone(),
                    target: fk.table.clone(),
                }),
                Some(&target_idx) => {
                    let target = &tables[target_idx];
                    if target.column(&fk.column).is_none() {
                        warnings.push(SchemaWarning::UnknownTargetColumn {
                            table: table.name.clone(),
                            column: column.name.clone(),
                            target: target.name.clone(),
                            target_column: fk.column.clone(),
                        });
                    }
                }
            }
        }
    }

    warnings
}
