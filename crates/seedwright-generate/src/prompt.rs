use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use seedwright_core::{Column, Table};

use crate::model::scalar_text;

/// Reference values listed per column in the reference section.
const REFERENCE_VALUES_SHOWN: usize = 20;
/// Reference values repeated inline in a column rule.
const REFERENCE_VALUES_IN_RULE: usize = 10;

/// Flavor of the generated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Style {
    #[default]
    Realistic,
    Minimal,
    EdgeCases,
}

impl Style {
    pub fn as_str(self) -> &'static str {
        match self {
            Style::Realistic => "realistic",
            Style::Minimal => "minimal",
            Style::EdgeCases => "edge-cases",
        }
    }

    fn hints(self) -> &'static [&'static str] {
        match self {
            Style::Realistic => &[
                "Use plausible names, addresses and wording from a real application.",
                "Make related fields agree, e.g. an email derived from the person's name.",
                "Spread dates over the last two years.",
                "Keep amounts in a believable range for the domain.",
            ],
            Style::Minimal => &[
                "Use short, simple ASCII values.",
                "Avoid punctuation and special characters in text.",
                "Prefer values like \"item1\", \"item2\".",
            ],
            Style::EdgeCases => &[
                "Use null for roughly one in five optional fields.",
                "Include text close to its maximum length.",
                "Include apostrophes, hyphens and accented characters.",
                "Include boundary numbers such as 0, 1 and large values.",
                "Include dates on month and year boundaries.",
            ],
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "realistic" => Ok(Style::Realistic),
            "minimal" => Ok(Style::Minimal),
            "edge-cases" | "edge_cases" | "edgecases" => Ok(Style::EdgeCases),
            other => Err(format!(
                "unknown style '{other}' (expected realistic, minimal or edge-cases)"
            )),
        }
    }
}

/// Existing target values per foreign-key column, keyed by the referencing
/// column's name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferencePool {
    values: BTreeMap<String, Vec<Value>>,
}

impl ReferencePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, values: Vec<Value>) {
        self.values.insert(column.into(), values);
    }

    /// Values offered for `column`, if any were fetched.
    pub fn values(&self, column: &str) -> Option<&[Value]> {
        self.values
            .get(column)
            .map(Vec::as_slice)
            .filter(|values| !values.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.values
            .iter()
            .map(|(column, values)| (column.as_str(), values.as_slice()))
    }
}

/// Everything needed to ask for one table's rows.
#[derive(Debug, Clone)]
pub struct PromptRequest<'a> {
    pub table: &'a Table,
    pub rows: u64,
    pub style: Style,
    pub references: &'a ReferencePool,
}

/// Build the instruction text for one table.
pub fn build_prompt(request: &PromptRequest<'_>) -> String {
    let table = request.table;
    let columns = table.non_auto_columns();
    let mut out = String::new();

    out.push_str(&format!(
        "You generate seed data for a relational database.\nProduce exactly {} rows for the table below.\n\n",
        request.rows
    ));
    out.push_str(&format!("TABLE: {}\n\n", table.name));

    out.push_str("COLUMNS:\n");
    for column in &columns {
        out.push_str(&format!("  - {}\n", describe_column(column)));
    }

    out.push_str("\nRULES:\n");
    let rules: Vec<String> = columns
        .iter()
        .flat_map(|column| column_rules(column, request.references))
        .collect();
    if rules.is_empty() {
        out.push_str("  - No additional constraints.\n");
    }
    for rule in rules {
        out.push_str(&format!("  - {rule}\n"));
    }

    out.push_str(&format!("\nSTYLE: {}\n", request.style));
    for hint in request.style.hints() {
        out.push_str(&format!("  - {hint}\n"));
    }

    out.push_str("\nREFERENCE VALUES:\n");
    if request.references.is_empty() {
        out.push_str("  None; this table has no populated references.\n");
    }
    for (column, values) in request.references.iter() {
        if values.is_empty() {
            continue;
        }
        out.push_str(&format!(
            "  {column}: [{}]\n",
            join_values(values, REFERENCE_VALUES_SHOWN)
        ));
    }

    let keys: Vec<&str> = columns.iter().map(|column| column.name.as_str()).collect();
    out.push_str("\nOUTPUT:\n");
    out.push_str("  - Reply with a single JSON array of objects and nothing else.\n");
    out.push_str("  - No explanations, no markdown and no code fences.\n");
    out.push_str(&format!(
        "  - Each object uses exactly these keys: {}.\n",
        keys.join(", ")
    ));
    if !table.generated_keys().is_empty() {
        out.push_str("  - Leave out auto-generated key columns.\n");
    }
    out.push_str("  - Start the reply with [ and end it with ].\n");

    out
}

fn describe_column(column: &Column) -> String {
    let mut line = format!("{}: {}", column.name, column.raw_type);
    if column.is_required() {
        line.push_str(" [required]");
    }
    if column.unique {
        line.push_str(" [unique]");
    }
    if let Some(fk) = &column.foreign_key {
        line.push_str(&format!(" [references {}]", fk.qualified()));
    }
    if let Some(allowed) = &column.allowed_values {
        line.push_str(&format!(" [one of: {}]", allowed.join(", ")));
    }
    line
}

fn column_rules(column: &Column, references: &ReferencePool) -> Vec<String> {
    let mut rules = Vec::new();
    if column.is_required() {
        rules.push(format!("{} must never be null or empty.", column.name));
    }
    if column.unique {
        rules.push(format!("{} must differ in every row.", column.name));
    }
    if let Some(max) = column.max_length {
        rules.push(format!("{} is at most {max} characters long.", column.name));
    }
    if let Some(allowed) = &column.allowed_values {
        rules.push(format!(
            "{} must be exactly one of: {}.",
            column.name,
            allowed.join(" | ")
        ));
    }
    if column.foreign_key.is_some() {
        match references.values(&column.name) {
            Some(values) => rules.push(format!(
                "{} must be one of the existing values: [{}].",
                column.name,
                join_values(values, REFERENCE_VALUES_IN_RULE)
            )),
            None => rules.push(format!(
                "{} refers to another table; use small positive integers such as 1, 2, 3.",
                column.name
            )),
        }
    }
    rules
}

fn join_values(values: &[Value], limit: usize) -> String {
    values
        .iter()
        .take(limit)
        .map(|value| scalar_text(value).unwrap_or_else(|| "null".to_string()))
        .collect::<Vec<_>>()
        .join(", ")
}
