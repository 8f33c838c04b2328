use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use seedwright_core::ForeignKey;

use crate::errors::GenerationError;
use crate::model::{Record, RecordCollection, field, scalar_text};
use crate::store::{MemoryStore, RecordStore};

/// Store that writes one `<table>.csv` per seeded table.
///
/// Rows are kept in memory as well, so generated keys and reference values
/// behave as they do for [`MemoryStore`].
#[derive(Debug)]
pub struct CsvStore {
    dir: PathBuf,
    memory: MemoryStore,
    bytes_written: u64,
}

impl CsvStore {
    /// Create the output directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, GenerationError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            memory: MemoryStore::new(),
            bytes_written: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// File for `table` inside the output directory. Path separators and
    /// control characters in the name are replaced with `_`.
    pub fn table_path(&self, table: &str) -> PathBuf {
        let stem: String = table
            .chars()
            .map(|c| {
                if matches!(c, '/' | '\\') || c.is_control() {
                    '_'
                } else {
                    c
                }
            })
            .collect();
        self.dir.join(format!("{stem}.csv"))
    }
}

#[async_trait]
impl RecordStore for CsvStore {
    fn name(&self) -> &str {
        "csv"
    }

    async fn reference_values(
        &mut self,
        target: &ForeignKey,
        limit: usize,
    ) -> Result<Vec<Value>, GenerationError> {
        Ok(self.memory.lookup(target, limit))
    }

    async fn insert(
        &mut self,
        collection: &RecordCollection,
        _batch_size: usize,
    ) -> Result<u64, GenerationError> {
        let inserted = self.memory.ingest(collection);
        let header: Vec<String> = collection
            .generated_keys
            .iter()
            .chain(&collection.columns)
            .cloned()
            .collect();
        let path = self.table_path(&collection.table);
        let bytes = write_table_csv(&path, &header, self.memory.rows(&collection.table))?;
        self.bytes_written = self.bytes_written.saturating_add(bytes);
        debug!(
            event = "csv.table_written",
            table = %collection.table,
            path = %path.display(),
            bytes,
            "table written"
        );
        Ok(inserted)
    }
}

/// Write rows with the given header; `null` and absent fields are empty.
pub fn write_table_csv(path: &Path, header: &[String], rows: &[Record]) -> Result<u64, csv::Error> {
    let writer = BufWriter::new(File::create(path).map_err(csv::Error::from)?);
    let counting = CountingWriter::new(writer);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(counting);

    writer.write_record(header)?;
    for row in rows {
        let record: Vec<String> = header
            .iter()
            .map(|column| field(row, column).and_then(scalar_text).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }

    writer.flush()?;
    let counting = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(counting.bytes_written())
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
