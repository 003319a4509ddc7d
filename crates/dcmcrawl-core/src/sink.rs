//! Record output
//!
//! Rows are buffered by [`BatchWriter`] and appended to the output file in
//! batches. With gzip enabled every batch becomes its own gzip member, so the
//! file stays a valid (multi-member) gzip stream across runs.

use crate::error::SinkError;
use crate::record::Finding;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default number of buffered rows before a flush
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default field delimiter
pub const DEFAULT_DELIMITER: u8 = b'|';

/// Destination for batches of rows
pub trait RecordSink {
    /// Append `rows` to the destination
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be written.
    fn write_batch(&mut self, rows: &[Finding]) -> Result<(), SinkError>;
}

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkOptions {
    /// Field delimiter
    pub delimiter: u8,
    /// Gzip-compress each batch
    pub gzip: bool,
    /// Write a header row when the file is new or empty
    pub header: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            gzip: true,
            header: false,
        }
    }
}

/// Append-only delimited file
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    options: SinkOptions,
}

impl CsvSink {
    /// Sink appending to `path`; the file is created on the first write
    pub fn new(path: impl Into<PathBuf>, options: SinkOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    /// Output file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the output once for appending, so an unwritable destination is
    /// reported before the crawl starts
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or opened for appending.
    pub fn check_writable(&self) -> Result<(), SinkError> {
        self.open().map(drop)
    }

    fn open(&self) -> Result<File, SinkError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn write_rows<W: Write>(&self, out: W, rows: &[Finding], header: bool) -> Result<W, SinkError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.options.delimiter)
            .has_headers(header)
            .from_writer(out);
        for row in rows {
            writer.serialize(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| self.io_error(e.into_error()))
    }
}

impl RecordSink for CsvSink {
    fn write_batch(&mut self, rows: &[Finding]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        let file = self.open()?;
        let is_empty = file
            .metadata()
            .map_err(|source| self.io_error(source))?
            .len()
            == 0;
        let header = self.options.header && is_empty;

        if self.options.gzip {
            let encoder = self.write_rows(GzEncoder::new(file, Compression::default()), rows, header)?;
            encoder.finish().map_err(|source| self.io_error(source))?;
        } else {
            let mut file = self.write_rows(file, rows, header)?;
            file.flush().map_err(|source| self.io_error(source))?;
        }

        debug!("Appended {} rows to {}", rows.len(), self.path.display());
        Ok(())
    }
}

/// Totals reported when a [`BatchWriter`] finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BatchStats {
    /// Rows written
    pub rows: usize,
    /// Batches written
    pub flushes: usize,
}

/// In-memory batch in front of a [`RecordSink`]
///
/// The batch is flushed when it grows beyond the threshold and once more when
/// the writer finishes. Rows still buffered when the process dies are lost.
#[derive(Debug)]
pub struct BatchWriter<S> {
    sink: S,
    batch: Vec<Finding>,
    threshold: usize,
    stats: BatchStats,
}

impl<S: RecordSink> BatchWriter<S> {
    /// Writer flushing once more than `threshold` rows are buffered
    pub fn new(sink: S, threshold: usize) -> Self {
        Self {
            sink,
            batch: Vec::new(),
            threshold,
            stats: BatchStats::default(),
        }
    }

    /// Buffer one row, flushing if the batch exceeds the threshold
    ///
    /// # Errors
    ///
    /// Returns an error if a triggered flush fails.
    pub fn push(&mut self, finding: Finding) -> Result<(), SinkError> {
        self.batch.push(finding);
        if self.batch.len() > self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the buffered rows, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails; the rows stay buffered.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        self.sink.write_batch(&self.batch)?;
        self.stats.rows += self.batch.len();
        self.stats.flushes += 1;
        self.batch.clear();
        Ok(())
    }

    /// Number of rows currently buffered
    #[must_use]
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Rows and batches written so far
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Flush the remainder and return the sink with the final totals
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn finish(mut self) -> Result<(S, BatchStats), SinkError> {
        self.flush()?;
        Ok((self.sink, self.stats))
    }
}
