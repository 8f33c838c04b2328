use seedwright_core::Schema;

use crate::errors::GenerationError;

/// Planned generation task for a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTask {
    pub table: String,
    pub rows: u64,
}

/// What to plan.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub rows: u64,
    /// Restrict the plan to one table, e.g. to retry a table that failed.
    pub only: Option<String>,
}

/// Build a plan of tables in insert order.
pub fn plan_tables(
    schema: &Schema,
    options: &PlanOptions,
) -> Result<Vec<GenerationTask>, GenerationError> {
    if options.rows == 0 {
        return Err(GenerationError::InvalidPlan(
            "row count must be at least 1".to_string(),
        ));
    }

    let tasks: Vec<GenerationTask> = match &options.only {
        Some(name) => {
            let table = schema
                .table(name)
                .ok_or_else(|| GenerationError::InvalidPlan(format!("unknown table '{name}'")))?;
            vec![GenerationTask {
                table: table.name.clone(),
                rows: options.rows,
            }]
        }
        None => schema
            .insert_order()
            .iter()
            .map(|table| GenerationTask {
                table: table.clone(),
                rows: options.rows,
            })
            .collect(),
    };

    if tasks.is_empty() {
        return Err(GenerationError::InvalidPlan(
            "schema declares no tables".to_string(),
        ));
    }

    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use seedwright_core::parse_schema;

    use super::*;

    const SCHEMA: &str = "CREATE TABLE b (id INT, a_id INT REFERENCES a(id));
                          CREATE TABLE a (id INT);";

    #[test]
    fn plans_in_insert_order() {
        let schema = parse_schema(SCHEMA);
        let tasks = plan_tables(
            &schema,
            &PlanOptions {
                rows: 7,
                only: None,
            },
        )
        .expect("plan");
        let tables: Vec<&str> = tasks.iter().map(|task| task.table.as_str()).collect();
        assert_eq!(tables, vec!["a", "b"]);
        assert!(tasks.iter().all(|task| task.rows == 7));
    }

    #[test]
    fn filters_to_one_table_case_insensitively() {
        let schema = parse_schema(SCHEMA);
        let tasks = plan_tables(
            &schema,
            &PlanOptions {
                rows: 3,
                only: Some("B".to_string()),
            },
        )
        .expect("plan");
        assert_eq!(
            tasks,
            vec![GenerationTask {
                table: "b".to_string(),
                rows: 3
            }]
        );
    }

    #[test]
    fn rejects_unknown_tables_and_empty_plans() {
        let schema = parse_schema(SCHEMA);
        let unknown = plan_tables(
            &schema,
            &PlanOptions {
                rows: 3,
                only: Some("ghost".to_string()),
            },
        );
        assert!(matches!(unknown, Err(GenerationError::InvalidPlan(_))));

        let empty = plan_tables(
            &parse_schema(""),
            &PlanOptions {
                rows: 3,
                only: None,
            },
        );
        assert!(matches!(empty, Err(GenerationError::InvalidPlan(_))));

        let zero = plan_tables(&schema, &PlanOptions::default());
        assert!(matches!(zero, Err(GenerationError::InvalidPlan(_))));
    }
}
