//! CSV Result Sink
//!
//! Append-only: every row is written and flushed before the sweep moves on,
//! and nothing already in the file is ever rewritten. A sweep interrupted at
//! any point leaves only complete rows behind and can be resumed from them.

use crate::schema::RowSchema;
use csv::{ReaderBuilder, Writer, WriterBuilder};
use qsweep_core::{ResultRow, RowKey};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures of the result sink. Fatal for the sweep; rows already flushed stay valid.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("{path} has header {found:?}, expected {expected:?}")]
    HeaderMismatch {
        path: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("{path}: malformed row at line {line}: {message}")]
    MalformedRow {
        path: String,
        line: u64,
        message: String,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SinkError + '_ {
    move |source| SinkError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> SinkError + '_ {
    move |source| SinkError::Csv {
        path: path.display().to_string(),
        source,
    }
}

/// Single writer of the CSV sink
pub struct ResultWriter {
    writer: Writer<File>,
    schema: RowSchema,
    path: PathBuf,
    rows_written: usize,
}

impl ResultWriter {
    /// Create (or truncate) the sink and write the header
    pub fn create(path: impl AsRef<Path>, schema: RowSchema) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        ensure_parent(&path)?;
        let file = File::create(&path).map_err(io_error(&path))?;

        let mut sink = Self::from_file(file, schema, path);
        sink.write_header()?;
        Ok(sink)
    }

    /// Open the sink for appending, keeping existing rows.
    ///
    /// A missing or empty file gets a header; an existing header must match
    /// `schema` exactly.
    pub fn append(path: impl AsRef<Path>, schema: RowSchema) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let is_new = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(io_error(&path)(e)),
        };
        if !is_new {
            check_header(&path, schema)?;
        }

        ensure_parent(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_error(&path))?;

        let mut sink = Self::from_file(file, schema, path);
        if is_new {
            sink.write_header()?;
        }
        Ok(sink)
    }

    fn from_file(file: File, schema: RowSchema, path: PathBuf) -> Self {
        let writer = WriterBuilder::new().has_headers(false).from_writer(file);
        Self {
            writer,
            schema,
            path,
            rows_written: 0,
        }
    }

    fn write_header(&mut self) -> Result<(), SinkError> {
        self.writer
            .write_record(self.schema.header())
            .map_err(csv_error(&self.path))?;
        self.writer.flush().map_err(io_error(&self.path))
    }

    /// Append one row and flush it. The row is consumed.
    pub fn write_row(&mut self, row: ResultRow) -> Result<(), SinkError> {
        let record = self.schema.record(&row);
        self.writer
            .write_record(&record)
            .map_err(csv_error(&self.path))?;
        self.writer.flush().map_err(io_error(&self.path))?;
        self.rows_written += 1;

        tracing::debug!(
            path = %self.path.display(),
            configuration = %row.configuration,
            "row written"
        );
        Ok(())
    }

    /// Rows written through this writer (not counting pre-existing ones)
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

fn ensure_parent(path: &Path) -> Result<(), SinkError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(io_error(path))
        }
        _ => Ok(()),
    }
}

fn check_header(path: &Path, schema: RowSchema) -> Result<(), SinkError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error(path))?;
    let found: Vec<String> = reader
        .headers()
        .map_err(csv_error(path))?
        .iter()
        .map(str::to_string)
        .collect();

    let expected: Vec<String> = schema.header().iter().map(|s| s.to_string()).collect();
    if found != expected {
        return Err(SinkError::HeaderMismatch {
            path: path.display().to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Keys of every row already present in the sink at `path`.
///
/// A missing or empty file has no completed rows.
pub fn read_completed(
    path: impl AsRef<Path>,
    schema: RowSchema,
) -> Result<BTreeSet<RowKey>, SinkError> {
    let path = path.as_ref();
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => return Ok(BTreeSet::new()),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(io_error(path)(e)),
    }

    check_header(path, schema)?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error(path))?;

    let mut keys = BTreeSet::new();
    for record in reader.records() {
        let record = record.map_err(csv_error(path))?;
        let fields: Vec<&str> = record.iter().collect();
        let key = schema
            .parse_key(&fields)
            .map_err(|message| SinkError::MalformedRow {
                path: path.display().to_string(),
                line: record.position().map(|p| p.line()).unwrap_or(0),
                message,
            })?;
        keys.insert(key);
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qsweep_core::{Configuration, ThreadPair};
    use tempfile::TempDir;

    fn row(queue: &str, delay_ns: u64, score: f64) -> ResultRow {
        ResultRow {
            configuration: Configuration {
                queue: queue.to_string(),
                threads: ThreadPair::new(1, 1),
                capacity: 64,
                ops: 1_000,
                delay_ns,
            },
            score,
            score_error: 0.5,
            runs: 3,
        }
    }

    #[test]
    fn test_rows_visible_immediately() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut sink = ResultWriter::create(&path, RowSchema::WithDelay).unwrap();
        sink.write_row(row("A", 1_000, 10.0)).unwrap();

        // Still open: the row must already be on disk.
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Queue,Producers,Consumers,Size,Items,Runs,Delay,Score,Score Error\n\
             A,1,1,64,1000,3,1000,10,0.5\n"
        );
        assert_eq!(sink.rows_written(), 1);
    }

    #[test]
    fn test_header_without_delay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/out.csv");

        let mut sink = ResultWriter::create(&path, RowSchema::WithoutDelay).unwrap();
        sink.write_row(row("B", 0, 2.5)).unwrap();
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("Queue,Producers,Consumers,Size,Items,Runs,Score,Score Error")
        );
        assert_eq!(lines.next(), Some("B,1,1,64,1000,3,2.5,0.5"));
    }

    #[test]
    fn test_append_keeps_existing_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut sink = ResultWriter::create(&path, RowSchema::WithDelay).unwrap();
        sink.write_row(row("A", 1_000, 10.0)).unwrap();
        drop(sink);

        let mut sink = ResultWriter::append(&path, RowSchema::WithDelay).unwrap();
        sink.write_row(row("B", 1_000, 20.0)).unwrap();
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert_eq!(content.matches("Queue,").count(), 1);
    }

    #[test]
    fn test_append_to_missing_file_writes_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fresh.csv");

        let sink = ResultWriter::append(&path, RowSchema::WithoutDelay).unwrap();
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Queue,Producers"));
    }

    #[test]
    fn test_append_rejects_foreign_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.csv");
        std::fs::write(&path, "VM,RSS,Step\n1,2,3\n").unwrap();

        let err = ResultWriter::append(&path, RowSchema::WithDelay)
            .err()
            .unwrap();
        assert!(matches!(err, SinkError::HeaderMismatch { .. }));
    }

    #[test]
    fn test_read_completed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        assert!(read_completed(&path, RowSchema::WithDelay).unwrap().is_empty());

        let mut sink = ResultWriter::create(&path, RowSchema::WithDelay).unwrap();
        sink.write_row(row("A", 1_000, 10.0)).unwrap();
        sink.write_row(row("B", 2_000, 11.0)).unwrap();
        drop(sink);

        let keys = read_completed(&path, RowSchema::WithDelay).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&row("A", 1_000, 0.0).key()));
        assert!(keys.contains(&row("B", 2_000, 0.0).key()));
        assert!(!keys.contains(&row("A", 2_000, 0.0).key()));
    }

    #[test]
    fn test_read_completed_reports_malformed_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(
            &path,
            "Queue,Producers,Consumers,Size,Items,Runs,Score,Score Error\nA,1,1,64\n",
        )
        .unwrap();

        let err = read_completed(&path, RowSchema::WithoutDelay).unwrap_err();
        match err {
            SinkError::MalformedRow { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
