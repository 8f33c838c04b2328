//! Schema extraction and dependency ordering for seedwright.
//!
//! This crate turns loosely formatted `CREATE TABLE` text into a structural
//! model of tables, columns and references, and computes an insert order
//! in which every referenced table precedes its dependents.

pub mod constraints;
pub mod error;
pub mod graph;
pub mod lexer;
pub mod normalize;
mod parser;
pub mod schema;
pub mod types;
pub mod validation;

use std::path::Path;

pub use constraints::ForeignKey;
pub use error::{Error, Result};
pub use graph::{DependencyReport, GraphSummary, TableDependencies, build_dependency_report};
pub use normalize::{normalize_statements, split_declarations, split_top_level};
pub use schema::{Column, Schema, Table};
pub use types::{SemanticType, normalize_type};
pub use validation::SchemaWarning;

/// Parse schema text. Never fails; see [`Schema::warnings`].
pub fn parse_schema(text: &str) -> Schema {
    Schema::parse(text)
}

/// Read and parse a schema file.
pub fn load_schema(path: impl AsRef<Path>) -> Result<Schema> {
    let text = std::fs::read_to_string(path)?;
    Ok(Schema::parse(&text))
}
