use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;

use seedwright_core::ForeignKey;
use seedwright_generate::{
    GenerationError, RecordCollection, RecordStore, insert_batches, quote_ident,
};

/// Store that inserts into PostgreSQL, one transaction per table.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn reference_values(
        &mut self,
        target: &ForeignKey,
        limit: usize,
    ) -> Result<Vec<Value>, GenerationError> {
        let column = quote_ident(&target.column);
        let sql = format!(
            "SELECT DISTINCT {column}::text FROM {} WHERE {column} IS NOT NULL LIMIT $1",
            quote_ident(&target.table)
        );
        let values = sqlx::query_scalar::<_, String>(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(values.into_iter().map(reference_value).collect())
    }

    async fn insert(
        &mut self,
        collection: &RecordCollection,
        batch_size: usize,
    ) -> Result<u64, GenerationError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let mut inserted = 0;

        for statement in insert_batches(collection, batch_size) {
            let mut query = sqlx::query(&statement.sql);
            for param in &statement.params {
                query = query.bind(param.as_deref());
            }
            let result = query.execute(&mut *tx).await.map_err(store_error)?;
            inserted += result.rows_affected();
            debug!(
                event = "postgres.batch_inserted",
                table = %collection.table,
                rows = statement.rows,
                "batch inserted"
            );
        }

        tx.commit().await.map_err(store_error)?;
        Ok(inserted)
    }
}

fn store_error(err: sqlx::Error) -> GenerationError {
    GenerationError::Store(err.to_string())
}

/// Integer keys go back to the model as numbers, everything else as text.
fn reference_value(text: String) -> Value {
    match text.parse::<i64>() {
        Ok(number) => Value::from(number),
        Err(_) => Value::String(text),
    }
}
