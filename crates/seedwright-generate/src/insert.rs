use crate::model::{Record, RecordCollection, field, scalar_text};

/// One parameterized multi-row insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub sql: String,
    /// Text parameters in placeholder order; `None` binds SQL `NULL`.
    pub params: Vec<Option<String>>,
    pub rows: usize,
}

/// Build `INSERT INTO "t" ("a", "b") VALUES ($1::type, $2::type), ...`.
///
/// Placeholders are numbered across rows and cast to the declared column
/// type so text parameters are coerced by the server.
pub fn build_insert(collection: &RecordCollection, rows: &[Record]) -> InsertStatement {
    let columns = collection
        .columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    let casts: Vec<String> = collection
        .column_types
        .iter()
        .map(|raw| placeholder_cast(raw))
        .collect();

    let mut sql = format!(
        "INSERT INTO {} ({columns}) VALUES ",
        quote_ident(&collection.table)
    );
    let mut params = Vec::with_capacity(rows.len() * collection.columns.len());

    for (row_idx, record) in rows.iter().enumerate() {
        if row_idx > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (col_idx, column) in collection.columns.iter().enumerate() {
            if col_idx > 0 {
                sql.push_str(", ");
            }
            params.push(field(record, column).and_then(scalar_text));
            sql.push_str(&format!("${}", params.len()));
            if let Some(cast) = casts.get(col_idx) {
                sql.push_str(&format!("::{cast}"));
            }
        }
        sql.push(')');
    }

    InsertStatement {
        sql,
        params,
        rows: rows.len(),
    }
}

/// Split a collection into statements of at most `batch_size` rows.
pub fn insert_batches(collection: &RecordCollection, batch_size: usize) -> Vec<InsertStatement> {
    collection
        .records
        .chunks(batch_size.max(1))
        .map(|chunk| build_insert(collection, chunk))
        .collect()
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Cast target for a declared type. Serial pseudo-types map to their
/// integer storage types and inline enumerations to text.
fn placeholder_cast(raw_type: &str) -> String {
    let lower = raw_type.trim().to_ascii_lowercase();
    let base = lower
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    match base {
        "serial" | "serial4" => "integer".to_string(),
        "bigserial" | "serial8" => "bigint".to_string(),
        "smallserial" | "serial2" => "smallint".to_string(),
        "enum" | "set" | "" => "text".to_string(),
        _ => raw_type.trim().to_string(),
    }
}
