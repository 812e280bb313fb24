//! Input-ordered output over append-only sinks.
//!
//! Contacts finish in any order, but output must appear in `row_id` order.
//! [`OrderedWriter`] buffers out-of-order rows in a pending map and, after
//! every submission, appends the contiguous run that starts at its cursor.
//! The sink therefore only ever sees rows in order and only appends.
//!
//! # Example
//!
//! ```
//! use enricher_core::snapshot::{MemorySink, OrderedWriter, OutputRow, Submitted};
//!
//! let mut writer = OrderedWriter::new(MemorySink::default(), 2);
//! let second = OutputRow::new(1, vec![], "", "valid", "");
//! let first = OutputRow::new(0, vec![], "", "error", "");
//!
//! assert_eq!(writer.submit(second).unwrap(), Submitted::Buffered);
//! assert_eq!(writer.submit(first).unwrap(), Submitted::Flushed(2));
//! assert_eq!(writer.materialize().len(), 2);
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Output columns appended after the input columns.
pub const RESULT_COLUMNS: [&str; 3] = ["bestEmail", "status", "messageSummary"];

/// Errors raised while writing output rows.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Writing to the output file failed.
    #[error("IO error writing snapshot to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row id outside the expected range was submitted.
    #[error("row {row_id} is out of range for a snapshot of {expected} rows")]
    OutOfRange { row_id: usize, expected: usize },
}

/// One output row: the input columns plus the enrichment result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    pub row_id: usize,
    pub columns: Vec<(String, String)>,
    pub best_email: String,
    pub status: String,
    pub message_summary: String,
}

impl OutputRow {
    #[must_use]
    pub fn new(
        row_id: usize,
        columns: Vec<(String, String)>,
        best_email: impl Into<String>,
        status: impl Into<String>,
        message_summary: impl Into<String>,
    ) -> Self {
        Self {
            row_id,
            columns,
            best_email: best_email.into(),
            status: status.into(),
            message_summary: message_summary.into(),
        }
    }

    /// Value for `column`. Result columns shadow input columns of the same
    /// name; unknown columns are empty.
    #[must_use]
    pub fn cell(&self, column: &str) -> &str {
        match column {
            "bestEmail" => &self.best_email,
            "status" => &self.status,
            "messageSummary" => &self.message_summary,
            _ => self
                .columns
                .iter()
                .find(|(name, _)| name == column)
                .map_or("", |(_, value)| value.as_str()),
        }
    }
}

/// Destination that only ever receives rows in order.
pub trait AppendSink: Send {
    /// Appends `rows`, already in `row_id` order.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the rows could not be persisted.
    fn append(&mut self, rows: &[OutputRow]) -> Result<(), SnapshotError>;
}

/// Sink that keeps appended rows in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    rows: Vec<OutputRow>,
    appends: usize,
}

impl MemorySink {
    #[must_use]
    pub fn rows(&self) -> &[OutputRow] {
        &self.rows
    }

    /// Number of `append` calls received.
    #[must_use]
    pub fn append_calls(&self) -> usize {
        self.appends
    }
}

impl AppendSink for MemorySink {
    fn append(&mut self, rows: &[OutputRow]) -> Result<(), SnapshotError> {
        self.rows.extend_from_slice(rows);
        self.appends += 1;
        Ok(())
    }
}

/// Sink writing a CSV file: header once at creation, then one line per row.
///
/// The file is flushed after every append so a partially finished run
/// leaves a readable prefix on disk.
#[derive(Debug)]
pub struct CsvFileSink {
    path: PathBuf,
    columns: Vec<String>,
    writer: BufWriter<File>,
}

impl CsvFileSink {
    /// Creates (or truncates) `path` and writes the header line.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if the file cannot be created or written.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), columns = columns.len()))]
    pub fn create(path: impl AsRef<Path>, columns: Vec<String>) -> Result<Self, SnapshotError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| SnapshotError::Io {
            path: path.clone(),
            source,
        };

        let file = File::create(&path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", csv_line(columns.iter().map(String::as_str))).map_err(io_err)?;
        writer.flush().map_err(io_err)?;
        debug!("csv snapshot created");

        Ok(Self {
            path,
            columns,
            writer,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl AppendSink for CsvFileSink {
    fn append(&mut self, rows: &[OutputRow]) -> Result<(), SnapshotError> {
        let io_err = |source| SnapshotError::Io {
            path: self.path.clone(),
            source,
        };
        for row in rows {
            let line = csv_line(self.columns.iter().map(|column| row.cell(column)));
            writeln!(self.writer, "{line}").map_err(io_err)?;
        }
        self.writer.flush().map_err(io_err)
    }
}

fn csv_line<'a>(cells: impl Iterator<Item = &'a str>) -> String {
    cells.map(escape_csv_value).collect::<Vec<_>>().join(",")
}

/// Quotes a value when it contains a comma, quote or line break, doubling
/// embedded quotes.
#[must_use]
pub fn escape_csv_value(value: &str) -> String {
    if value.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Result of one [`OrderedWriter::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// Held until earlier rows arrive.
    Buffered,
    /// Appended to the sink together with this many rows in total.
    Flushed(usize),
    /// The row was already written; the submission was ignored.
    Stale,
}

/// What was left unwritten when a writer finished.
#[derive(Debug)]
pub struct FinishReport<S> {
    pub sink: S,
    /// Rows that never arrived.
    pub missing: Vec<usize>,
}

/// Orders rows by `row_id` over an append-only sink.
#[derive(Debug)]
pub struct OrderedWriter<S: AppendSink> {
    sink: S,
    expected: usize,
    next: usize,
    pending: BTreeMap<usize, OutputRow>,
    committed: Vec<OutputRow>,
}

impl<S: AppendSink> OrderedWriter<S> {
    /// Creates a writer expecting rows `0..expected`.
    #[must_use]
    pub fn new(sink: S, expected: usize) -> Self {
        Self {
            sink,
            expected,
            next: 0,
            pending: BTreeMap::new(),
            committed: Vec::with_capacity(expected),
        }
    }

    /// Submits one row.
    ///
    /// A row still pending is replaced (last write wins). A row that was
    /// already written is reported as [`Submitted::Stale`] and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::OutOfRange`] for a row id outside
    /// `0..expected`, or the sink's error if appending fails. On a sink
    /// error the rows stay pending and the cursor does not move.
    pub fn submit(&mut self, row: OutputRow) -> Result<Submitted, SnapshotError> {
        let row_id = row.row_id;
        if row_id >= self.expected {
            return Err(SnapshotError::OutOfRange {
                row_id,
                expected: self.expected,
            });
        }
        if row_id < self.next {
            warn!(row_id, "ignoring resubmission of an already written row");
            return Ok(Submitted::Stale);
        }

        if self.pending.insert(row_id, row).is_some() {
            debug!(row_id, "replaced pending row");
        }

        let flushed = self.flush_ready()?;
        Ok(if flushed == 0 {
            Submitted::Buffered
        } else {
            Submitted::Flushed(flushed)
        })
    }

    /// Appends the contiguous run starting at the cursor.
    fn flush_ready(&mut self) -> Result<usize, SnapshotError> {
        let mut end = self.next;
        while self.pending.contains_key(&end) {
            end += 1;
        }
        if end == self.next {
            return Ok(0);
        }

        let ready: Vec<OutputRow> = (self.next..end)
            .filter_map(|row_id| self.pending.get(&row_id).cloned())
            .collect();
        self.sink.append(&ready)?;

        for row_id in self.next..end {
            self.pending.remove(&row_id);
        }
        let count = ready.len();
        self.committed.extend(ready);
        self.next = end;
        debug!(next = self.next, count, "flushed ordered rows");
        Ok(count)
    }

    /// Rows written so far, in `row_id` order.
    #[must_use]
    pub fn materialize(&self) -> &[OutputRow] {
        &self.committed
    }

    /// Next row id the writer is waiting for.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.next
    }

    /// Number of rows buffered behind a gap.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Writes any rows still buffered behind gaps, in order, and reports the
    /// ids that never arrived.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the final append fails.
    pub fn finish(mut self) -> Result<FinishReport<S>, SnapshotError> {
        let missing: Vec<usize> = (self.next..self.expected)
            .filter(|row_id| !self.pending.contains_key(row_id))
            .collect();

        if !self.pending.is_empty() {
            let rest: Vec<OutputRow> = std::mem::take(&mut self.pending).into_values().collect();
            self.sink.append(&rest)?;
            self.committed.extend(rest);
        }
        if !missing.is_empty() {
            warn!(missing = missing.len(), "snapshot finished with missing rows");
        }

        Ok(FinishReport {
            sink: self.sink,
            missing,
        })
    }
}
