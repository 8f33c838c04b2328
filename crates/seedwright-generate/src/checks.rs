use std::collections::{HashMap, HashSet};

use serde_json::Value;

use seedwright_core::{SemanticType, Table};

use crate::model::{RecordCollection, RecordIssue, field, scalar_text};
use crate::prompt::ReferencePool;

/// Check generated records against the table's declared constraints.
///
/// Values are compared by their text form, so `1` and `"1"` are the same
/// reference. Reference membership is only checked for columns whose pool
/// is non-empty.
pub fn check_records(
    table: &Table,
    collection: &RecordCollection,
    references: &ReferencePool,
) -> Vec<RecordIssue> {
    let columns = table.non_auto_columns();
    let pools: HashMap<&str, HashSet<String>> = columns
        .iter()
        .filter(|column| column.foreign_key.is_some())
        .filter_map(|column| {
            references.values(&column.name).map(|values| {
                let texts = values.iter().filter_map(scalar_text).collect();
                (column.name.as_str(), texts)
            })
        })
        .collect();
    let mut seen: HashMap<&str, HashSet<String>> = HashMap::new();
    let mut issues = Vec::new();

    for (idx, record) in collection.records.iter().enumerate() {
        let row = idx + 1;
        let mut issue = |column: &str, code: &str, message: String| {
            issues.push(RecordIssue {
                row,
                column: column.to_string(),
                code: code.to_string(),
                message,
            });
        };

        for key in record.keys() {
            if table.column(key).is_none() {
                issue(key, "unknown_column", format!("`{key}` is not a column of {}", table.name));
            }
        }

        for column in &columns {
            let name = column.name.as_str();
            let value = match field(record, name) {
                None => {
                    if column.is_required() {
                        issue(name, "missing_required", format!("{name} is required"));
                    }
                    continue;
                }
                Some(Value::Null) => {
                    if column.is_required() {
                        issue(name, "null_required", format!("{name} must not be null"));
                    }
                    continue;
                }
                Some(value @ (Value::Array(_) | Value::Object(_))) => {
                    issue(name, "non_scalar", format!("{name} holds a nested value: {value}"));
                    continue;
                }
                Some(value) => value,
            };
            let Some(text) = scalar_text(value) else {
                continue;
            };

            if let Some(allowed) = &column.allowed_values {
                if !allowed.iter().any(|candidate| candidate == &text) {
                    issue(
                        name,
                        "not_allowed",
                        format!("{name} = {text:?} is not one of {}", allowed.join(", ")),
                    );
                }
            }
            if let Some(max) = column.max_length {
                let length = text.chars().count();
                if column.semantic_type == SemanticType::Text && length > max as usize {
                    issue(
                        name,
                        "too_long",
                        format!("{name} has {length} characters, more than {max}"),
                    );
                }
            }
            if let Some(pool) = pools.get(name) {
                if !pool.contains(&text) {
                    issue(
                        name,
                        "unknown_reference",
                        format!("{name} = {text} is not an existing reference value"),
                    );
                }
            }
            let keyed = column.unique || (column.primary_key && !column.is_auto_generated());
            if keyed && !seen.entry(name).or_default().insert(text.clone()) {
                issue(
                    name,
                    "duplicate_unique",
                    format!("{name} = {text:?} repeats an earlier row"),
                );
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use seedwright_core::parse_schema;

    use super::*;
    use crate::model::Record;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn codes(issues: &[RecordIssue]) -> Vec<(usize, &str, &str)> {
        issues
            .iter()
            .map(|issue| (issue.row, issue.column.as_str(), issue.code.as_str()))
            .collect()
    }

    #[test]
    fn reports_each_violation_with_its_row() {
        let schema = parse_schema(
            "CREATE TABLE tickets (
                id SERIAL PRIMARY KEY,
                owner_id INT NOT NULL REFERENCES users(id),
                state TEXT NOT NULL CHECK (state IN ('open', 'closed')),
                slug VARCHAR(5) UNIQUE,
                note TEXT
            );",
        );
        let table = schema.require_table("tickets").expect("tickets");
        let records = vec![
            record(json!({"owner_id": 1, "state": "open", "slug": "a", "note": null})),
            record(json!({"owner_id": "2", "state": "stuck", "slug": "a"})),
            record(json!({"state": null, "slug": "toolong", "extra": 1, "note": ["x"]})),
            record(json!({"owner_id": 9, "state": "closed"})),
        ];
        let collection = RecordCollection::for_table(table, records);
        let mut references = ReferencePool::new();
        references.insert("owner_id", vec![json!(1), json!(2)]);

        let issues = check_records(table, &collection, &references);
        let mut found = codes(&issues);
        found.sort();
        assert_eq!(
            found,
            vec![
                (2, "slug", "duplicate_unique"),
                (2, "state", "not_allowed"),
                (3, "extra", "unknown_column"),
                (3, "note", "non_scalar"),
                (3, "owner_id", "missing_required"),
                (3, "slug", "too_long"),
                (3, "state", "null_required"),
                (4, "owner_id", "unknown_reference"),
            ]
        );
    }

    #[test]
    fn empty_reference_pool_skips_membership() {
        let schema = parse_schema(
            "CREATE TABLE posts (id SERIAL PRIMARY KEY, author_id INT REFERENCES users(id));",
        );
        let table = schema.require_table("posts").expect("posts");
        let collection = RecordCollection::for_table(table, vec![record(json!({"author_id": 42}))]);
        assert!(check_records(table, &collection, &ReferencePool::new()).is_empty());
    }

    #[test]
    fn column_names_match_case_insensitively() {
        let schema = parse_schema("CREATE TABLE tags (label TEXT NOT NULL);");
        let table = schema.require_table("tags").expect("tags");
        let collection = RecordCollection::for_table(table, vec![record(json!({"Label": "x"}))]);
        assert!(check_records(table, &collection, &ReferencePool::new()).is_empty());
    }
}
