//! Crawl run loop
//!
//! A [`Crawler`] owns everything that lives for one run: the identity cache,
//! the batch writer, and the running totals. Files and archives are handed to
//! it one at a time; decode failures and archive errors are logged and
//! counted, only output failures abort the run.

use crate::error::{CrawlError, Result, SinkError};
use crate::identity::{IdentityCache, IdentityResolver};
use crate::paths::{project_id_from_path, session_id_from_path};
use crate::record::Provenance;
use crate::sink::{BatchWriter, RecordSink};
use dcmcrawl_archive::{
    creation_time, list_tar_archives, stream_tar_entries, ArchiveEntry, ArchiveError,
    ExtensionFilter, TimeWindow,
};
use dcmcrawl_medical::{extract_series_context, read_header, resolve_indicators, Header};
use log::{debug, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Running totals of a crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CrawlSummary {
    /// Image files and archive entries examined
    pub images: usize,
    /// Images whose header could not be decoded
    pub decode_failures: usize,
    /// Archives opened
    pub archives: usize,
    /// Archives abandoned because of read errors
    pub archive_failures: usize,
    /// Archive entries skipped because they could not be extracted
    pub entry_failures: usize,
    /// Rows recorded
    pub rows: usize,
    /// Rows carrying the unresolved marker
    pub unresolved: usize,
    /// External identity lookups
    pub identity_lookups: usize,
    /// External identity lookups that failed
    pub identity_failures: usize,
    /// Batches written to the sink
    pub batches: usize,
}

/// TAR archives of a directory, split by creation time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSelection {
    /// Archives created inside the window, sorted by path
    pub selected: Vec<PathBuf>,
    /// Archives outside the window or without a readable creation time
    pub skipped: Vec<PathBuf>,
}

/// List the TAR archives directly inside `dir` created within `window`
///
/// # Errors
///
/// Returns an error if `dir` cannot be listed.
pub fn select_archives(
    dir: &Path,
    window: TimeWindow,
) -> std::result::Result<ArchiveSelection, ArchiveError> {
    let mut selection = ArchiveSelection::default();

    for archive in list_tar_archives(dir)? {
        match creation_time(&archive) {
            Ok(created) if window.contains_timestamp(created) => selection.selected.push(archive),
            Ok(created) => {
                debug!(
                    "Skipping {} (created {})",
                    archive.display(),
                    created.format("%Y-%m-%d")
                );
                selection.skipped.push(archive);
            }
            Err(e) => {
                warn!("Cannot read creation time of {}: {e}", archive.display());
                selection.skipped.push(archive);
            }
        }
    }

    Ok(selection)
}

/// State of one crawl run
pub struct Crawler<R, S> {
    identity: IdentityCache<R>,
    writer: BatchWriter<S>,
    tmp_dir: PathBuf,
    summary: CrawlSummary,
}

impl<R: IdentityResolver, S: RecordSink> Crawler<R, S> {
    /// New run resolving subjects through `resolver` and writing through `writer`
    ///
    /// Archive entries are extracted to the system temporary directory unless
    /// [`Crawler::with_tmp_dir`] is used.
    pub fn new(resolver: R, writer: BatchWriter<S>) -> Self {
        Self {
            identity: IdentityCache::new(resolver),
            writer,
            tmp_dir: std::env::temp_dir(),
            summary: CrawlSummary::default(),
        }
    }

    /// Extract archive entries to `dir`
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` is not an existing directory.
    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        match std::fs::metadata(&dir) {
            Ok(metadata) if metadata.is_dir() => {
                self.tmp_dir = dir;
                Ok(self)
            }
            Ok(_) => Err(CrawlError::TempDir {
                path: dir,
                source: std::io::Error::other("not a directory"),
            }),
            Err(source) => Err(CrawlError::TempDir { path: dir, source }),
        }
    }

    /// Totals so far
    #[must_use]
    pub fn summary(&self) -> CrawlSummary {
        self.current_summary()
    }

    /// Record the findings of one image file
    ///
    /// Returns the number of rows recorded.
    ///
    /// # Errors
    ///
    /// Returns an error only if a batch cannot be written.
    pub fn process_file(&mut self, path: &Path) -> Result<usize> {
        let provenance = self.provenance(
            path,
            None,
            path.parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_name(path),
        );

        let header = match read_header(path) {
            Ok(header) => Some(header),
            Err(e) => {
                warn!("Failed to decode {}: {e}", path.display());
                None
            }
        };

        Ok(self.record(&provenance, header.as_ref())?)
    }

    /// Record the findings of every allow-listed image inside a TAR archive
    ///
    /// Read errors abandon the archive (rows already recorded are kept);
    /// entries that cannot be extracted are skipped.
    ///
    /// Returns the number of rows recorded.
    ///
    /// # Errors
    ///
    /// Returns an error only if a batch cannot be written.
    pub fn process_archive(&mut self, archive: &Path, filter: &ExtensionFilter) -> Result<usize> {
        info!("Crawling archive {}", archive.display());
        self.summary.archives += 1;

        let archive_name = archive.to_string_lossy().into_owned();
        let mut rows = 0;
        let mut sink_error: Option<SinkError> = None;

        let streamed = stream_tar_entries(archive, filter, |entry| {
            let provenance = self.provenance(
                &entry.path,
                Some(archive_name.clone()),
                entry.directory(),
                entry.file_name(),
            );

            let header = match self.decode_entry(&entry) {
                Ok(header) => header,
                Err(e) => {
                    warn!("Failed to extract {} from {archive_name}: {e}", entry.name);
                    self.summary.entry_failures += 1;
                    return Ok(());
                }
            };

            match self.record(&provenance, header.as_ref()) {
                Ok(n) => {
                    rows += n;
                    Ok(())
                }
                Err(e) => {
                    sink_error = Some(e);
                    Err("output failure".into())
                }
            }
        });

        if let Some(e) = sink_error {
            return Err(e.into());
        }
        match streamed {
            Ok(entries) => debug!("{entries} image entries in {archive_name}"),
            Err(e) => {
                warn!("Failed to read archive {archive_name}: {e}");
                self.summary.archive_failures += 1;
            }
        }

        Ok(rows)
    }

    /// Flush the remaining rows and return the final totals
    ///
    /// # Errors
    ///
    /// Returns an error if the last batch cannot be written.
    pub fn finish(self) -> Result<CrawlSummary> {
        let mut summary = self.current_summary();
        let (_, stats) = self.writer.finish()?;
        summary.batches = stats.flushes;
        Ok(summary)
    }

    fn current_summary(&self) -> CrawlSummary {
        CrawlSummary {
            identity_lookups: self.identity.lookups(),
            identity_failures: self.identity.failures(),
            batches: self.writer.stats().flushes,
            ..self.summary
        }
    }

    fn provenance(
        &mut self,
        path: &Path,
        archive: Option<String>,
        directory: String,
        filename: String,
    ) -> Provenance {
        let project_id = project_id_from_path(path);
        let session_id = session_id_from_path(path);
        let subject_id = self
            .identity
            .resolve(project_id.as_deref(), session_id.as_deref());

        Provenance {
            project_id,
            session_id,
            subject_id,
            archive,
            directory,
            filename,
        }
    }

    /// Write an archive entry to a temporary file and decode it
    ///
    /// `Ok(None)` means the entry was extracted but is not decodable.
    fn decode_entry(&self, entry: &ArchiveEntry) -> std::io::Result<Option<Header>> {
        let suffix = entry
            .path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let mut extracted = tempfile::Builder::new()
            .prefix("dcmcrawl-")
            .suffix(&suffix)
            .tempfile_in(&self.tmp_dir)?;
        extracted.write_all(&entry.contents)?;
        extracted.flush()?;

        match read_header(extracted.path()) {
            Ok(header) => Ok(Some(header)),
            Err(e) => {
                warn!("Failed to decode {}: {e}", entry.name);
                Ok(None)
            }
        }
    }

    /// Turn one decoded (or undecodable) image into rows
    fn record(
        &mut self,
        provenance: &Provenance,
        header: Option<&Header>,
    ) -> std::result::Result<usize, SinkError> {
        self.summary.images += 1;

        let Some(header) = header else {
            self.summary.decode_failures += 1;
            self.push(provenance.blank_finding())?;
            return Ok(1);
        };

        let context = extract_series_context(header);
        let indicators = resolve_indicators(header);
        let count = indicators.len();
        for indicator in indicators {
            if indicator.is_unresolved() {
                self.summary.unresolved += 1;
            }
            self.push(provenance.finding(&context, indicator))?;
        }
        Ok(count)
    }

    fn push(&mut self, finding: crate::record::Finding) -> std::result::Result<(), SinkError> {
        self.summary.rows += 1;
        self.writer.push(finding)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
