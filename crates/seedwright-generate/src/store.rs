use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use seedwright_core::ForeignKey;

use crate::errors::GenerationError;
use crate::model::{Record, RecordCollection, field};

/// Destination for generated records.
#[async_trait]
pub trait RecordStore: Send {
    /// Name recorded in run reports.
    fn name(&self) -> &str;

    /// Up to `limit` existing non-null values of the referenced column.
    async fn reference_values(
        &mut self,
        target: &ForeignKey,
        limit: usize,
    ) -> Result<Vec<Value>, GenerationError>;

    /// Insert every record, `batch_size` rows per statement. Returns the
    /// number of rows inserted.
    async fn insert(
        &mut self,
        collection: &RecordCollection,
        batch_size: usize,
    ) -> Result<u64, GenerationError>;
}

/// Store that keeps rows in memory, for dry runs.
///
/// Generated keys missing from a record get sequential values per table,
/// the way a serial column would, so dependent tables have reference values.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: BTreeMap<String, Vec<Record>>,
    next_key: BTreeMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows stored for `table`, including assigned keys.
    pub fn rows(&self, table: &str) -> &[Record] {
        self.rows
            .get(&table.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn total_rows(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    pub(crate) fn ingest(&mut self, collection: &RecordCollection) -> u64 {
        let table_key = collection.table.to_lowercase();
        let next_key = self.next_key.entry(table_key.clone()).or_insert(1);
        let stored = self.rows.entry(table_key).or_default();

        for record in &collection.records {
            let mut row = record.clone();
            for key in &collection.generated_keys {
                if field(&row, key).is_none_or(Value::is_null) {
                    row.insert(key.clone(), Value::from(*next_key));
                    *next_key += 1;
                }
            }
            stored.push(row);
        }

        collection.records.len() as u64
    }

    pub(crate) fn lookup(&self, target: &ForeignKey, limit: usize) -> Vec<Value> {
        self.rows(&target.table)
            .iter()
            .filter_map(|row| field(row, &target.column))
            .filter(|value| !value.is_null())
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn reference_values(
        &mut self,
        target: &ForeignKey,
        limit: usize,
    ) -> Result<Vec<Value>, GenerationError> {
        Ok(self.lookup(target, limit))
    }

    async fn insert(
        &mut self,
        collection: &RecordCollection,
        _batch_size: usize,
    ) -> Result<u64, GenerationError> {
        Ok(self.ingest(collection))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn collection(table: &str, records: Vec<Value>) -> RecordCollection {
        RecordCollection {
            table: table.to_string(),
            columns: vec!["name".to_string()],
            column_types: vec!["TEXT".to_string()],
            generated_keys: vec!["id".to_string()],
            records: records
                .into_iter()
                .filter_map(|value| value.as_object().cloned())
                .collect(),
        }
    }

    #[test]
    fn assigns_sequential_keys_across_inserts() {
        let mut store = MemoryStore::new();
        store.ingest(&collection("users", vec![json!({"name": "a"}), json!({"name": "b"})]));
        store.ingest(&collection("Users", vec![json!({"name": "c", "id": null})]));

        let ids: Vec<Value> = store
            .rows("users")
            .iter()
            .filter_map(|row| row.get("id").cloned())
            .collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(store.total_rows(), 3);
    }

    #[test]
    fn keeps_keys_the_model_provided() {
        let mut store = MemoryStore::new();
        store.ingest(&collection("users", vec![json!({"name": "a", "id": 40})]));
        assert_eq!(store.rows("users")[0].get("id"), Some(&json!(40)));
    }

    #[test]
    fn lookup_skips_nulls_and_respects_limit() {
        let mut store = MemoryStore::new();
        store.ingest(&collection(
            "users",
            vec![json!({"name": "a"}), json!({"name": null}), json!({"name": "c"}), json!({"name": "d"})],
        ));
        let target = ForeignKey::new("users", "name");
        assert_eq!(store.lookup(&target, 2), vec![json!("a"), json!("c")]);
        assert!(store.lookup(&ForeignKey::new("ghosts", "id"), 10).is_empty());
    }
}
