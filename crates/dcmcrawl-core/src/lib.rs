//! Crawl engine for dcmcrawl
//!
//! Ties the pieces of a coil-element audit together:
//!
//! - [`paths`] - project and session ids from XNAT archive paths
//! - [`identity`] - subject lookup with a per-run cache, backed by
//!   [`postgres::PostgresResolver`] or [`xnat::XnatResolver`]
//! - [`record`] / [`sink`] - output rows and the batched delimited writer
//! - [`crawl`] - the run loop over image files and TAR archives
//!
//! # Example
//!
//! ```rust,no_run
//! use dcmcrawl_archive::{ExtensionFilter, TreeScanner};
//! use dcmcrawl_core::{BatchWriter, Crawler, CsvSink, NoIdentity, SinkOptions};
//! use std::path::Path;
//!
//! let sink = CsvSink::new("/tmp/crawl_results.psv.gz", SinkOptions::default());
//! let mut crawler = Crawler::new(NoIdentity, BatchWriter::new(sink, 10_000));
//!
//! for file in TreeScanner::new(ExtensionFilter::default()).scan(Path::new("/data/xnat/archive"))? {
//!     crawler.process_file(&file)?;
//! }
//! let summary = crawler.finish()?;
//! println!("{} rows", summary.rows);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod crawl;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod paths;
pub mod postgres;
pub mod record;
pub mod sink;
pub mod xnat;

pub use crawl::{select_archives, ArchiveSelection, CrawlSummary, Crawler};
pub use credentials::{Credentials, DatabaseCredentials, XnatCredentials};
pub use error::{CrawlError, CredentialsError, IdentityError, Result, SinkError};
pub use identity::{IdentityCache, IdentityResolver, NoIdentity};
pub use paths::{project_id_from_path, session_id_from_path};
pub use postgres::PostgresResolver;
pub use record::{Finding, Provenance, COLUMNS};
pub use sink::{
    BatchStats, BatchWriter, CsvSink, RecordSink, SinkOptions, DEFAULT_BATCH_SIZE,
    DEFAULT_DELIMITER,
};
pub use xnat::XnatResolver;
