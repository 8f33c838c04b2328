use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::constraints::ForeignKey;
use crate::error::{Error, Result};
use crate::graph::{DependencyReport, build_dependency_report, order_tables};
use crate::parser::parse_tables;
use crate::types::{SemanticType, normalize_type};
use crate::validation::{SchemaWarning, reference_warnings};

/// Column definition extracted from a table body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Declared type as written, e.g. `VARCHAR(255)`.
    pub raw_type: String,
    pub semantic_type: SemanticType,
    /// Declared size of text types.
    pub max_length: Option<u32>,
    pub not_null: bool,
    pub unique: bool,
    pub primary_key: bool,
    /// Values from a `CHECK (col IN (...))` constraint, in declared order.
    pub allowed_values: Option<Vec<String>>,
    pub foreign_key: Option<ForeignKey>,
}

impl Column {
    /// A nullable, unconstrained column of the given declared type.
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        let raw_type = raw_type.into();
        Self {
            name: name.into(),
            semantic_type: normalize_type(&raw_type),
            raw_type,
            max_length: None,
            not_null: false,
            unique: false,
            primary_key: false,
            allowed_values: None,
            foreign_key: None,
        }
    }

    /// Integer primary keys are assumed to be assigned by the database.
    pub fn is_auto_generated(&self) -> bool {
        self.primary_key && self.semantic_type == SemanticType::Integer
    }

    /// Whether a value must be present: `NOT NULL` or part of the primary key.
    pub fn is_required(&self) -> bool {
        self.not_null || self.primary_key
    }
}

/// A declared table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns
            .iter_mut()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// Columns carrying a foreign key, in declaration order.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&Column, &ForeignKey)> {
        self.columns
            .iter()
            .filter_map(|column| column.foreign_key.as_ref().map(|fk| (column, fk)))
    }

    /// Distinct referenced table names in first-seen order, without self-references.
    pub fn depends_on(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (_, fk) in self.foreign_keys() {
            if fk.table.eq_ignore_ascii_case(&self.name) {
                continue;
            }
            if seen.insert(fk.table.to_lowercase()) {
                out.push(fk.table.clone());
            }
        }
        out
    }

    /// Columns the generator must fill: everything except auto-generated keys.
    ///
    /// A table made only of auto-generated keys returns all of its columns.
    pub fn non_auto_columns(&self) -> Vec<&Column> {
        let columns: Vec<&Column> = self
            .columns
            .iter()
            .filter(|column| !column.is_auto_generated())
            .collect();
        if columns.is_empty() {
            self.columns.iter().collect()
        } else {
            columns
        }
    }

    /// Names of the columns excluded by [`Table::non_auto_columns`].
    pub fn generated_keys(&self) -> Vec<&Column> {
        if self.columns.iter().all(Column::is_auto_generated) {
            return Vec::new();
        }
        self.columns
            .iter()
            .filter(|column| column.is_auto_generated())
            .collect()
    }
}

/// Tables parsed from one source text plus their derived insert order.
///
/// Built once; every derived value is computed at construction and the
/// schema is read-only afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    tables: Vec<Table>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    insert_order: Vec<String>,
    cycles: Vec<Vec<String>>,
    warnings: Vec<SchemaWarning>,
}

impl Schema {
    /// Extract tables from declarative text. Never fails; problems are
    /// reported through [`Schema::warnings`].
    pub fn parse(text: &str) -> Self {
        let parsed = parse_tables(text);
        Self::build(parsed.tables, parsed.warnings)
    }

    /// Assemble a schema from already-built tables.
    pub fn from_tables(tables: Vec<Table>) -> Self {
        Self::build(tables, Vec::new())
    }

    fn build(candidates: Vec<Table>, mut warnings: Vec<SchemaWarning>) -> Self {
        let mut tables: Vec<Table> = Vec::with_capacity(candidates.len());
        let mut index = HashMap::new();

        for table in candidates {
            let key = table.name.to_lowercase();
            if index.contains_key(&key) {
                warnings.push(SchemaWarning::DuplicateTable {
                    table: table.name.clone(),
                });
                continue;
            }
            index.insert(key, tables.len());
            tables.push(table);
        }

        warnings.extend(reference_warnings(&tables, &index));

        let ordering = order_tables(&tables, |name| index.get(&name.to_lowercase()).copied());
        let insert_order: Vec<String> = ordering
            .order
            .iter()
            .map(|&idx| tables[idx].name.clone())
            .collect();
        let cycles: Vec<Vec<String>> = ordering
            .cycles
            .iter()
            .map(|cycle| cycle.iter().map(|&idx| tables[idx].name.clone()).collect())
            .collect();
        warnings.extend(
            cycles
                .iter()
                .map(|tables| SchemaWarning::DependencyCycle {
                    tables: tables.clone(),
                }),
        );

        Self {
            tables,
            index,
            insert_order,
            cycles,
            warnings,
        }
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Case-insensitive table lookup.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.index
            .get(&name.to_lowercase())
            .map(|&idx| &self.tables[idx])
    }

    pub fn require_table(&self, name: &str) -> Result<&Table> {
        self.table(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Table names such that every referenced table precedes its dependents.
    pub fn insert_order(&self) -> &[String] {
        &self.insert_order
    }

    /// Tables in insert order.
    pub fn ordered_tables(&self) -> Vec<&Table> {
        self.insert_order
            .iter()
            .filter_map(|name| self.table(name))
            .collect()
    }

    /// Declared tables referenced by `table`, using their declared names.
    /// Dangling targets are omitted.
    pub fn depends_on(&self, table: &str) -> Vec<String> {
        self.table(table)
            .map(|table| {
                table
                    .depends_on()
                    .iter()
                    .filter_map(|target| self.table(target).map(|t| t.name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Groups of distinct tables that reference each other.
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    pub fn warnings(&self) -> &[SchemaWarning] {
        &self.warnings
    }

    /// Fail when any multi-table dependency cycle exists.
    pub fn ensure_acyclic(&self) -> Result<()> {
        match self.cycles.first() {
            Some(cycle) => Err(Error::DependencyCycle(cycle.clone())),
            None => Ok(()),
        }
    }

    pub fn dependency_report(&self) -> DependencyReport {
        build_dependency_report(self)
    }
}
