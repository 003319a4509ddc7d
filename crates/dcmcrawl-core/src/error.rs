//! Error types for crawl runs

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by identity lookups
#[derive(Error, Debug)]
pub enum IdentityError {
    /// HTTP request to the XNAT REST API failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// XNAT answered with an unexpected status
    #[error("XNAT returned HTTP {status} for {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Response body was not valid JSON
    #[error("Invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),

    /// Base URL cannot be used to build REST paths
    #[error("Invalid XNAT URL: {0}")]
    InvalidUrl(String),

    /// Database query or connection failed
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Async runtime for the database client could not be started
    #[error("Failed to start database runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Errors raised by the record sink
#[derive(Error, Debug)]
pub enum SinkError {
    /// Output file could not be opened or written
    #[error("IO error on {path}: {source}")]
    Io {
        /// Output file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Row serialization failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors raised while loading the credentials file
#[derive(Error, Debug)]
pub enum CredentialsError {
    /// No home directory to resolve the default location against
    #[error("Could not determine home directory")]
    NoHomeDir,

    /// Credentials file does not exist
    #[error("Credentials file not found: {0}")]
    NotFound(PathBuf),

    /// Credentials file could not be read
    #[error("Failed to read credentials file {path}: {source}")]
    Read {
        /// Credentials file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Credentials file is not valid TOML or misses required keys
    #[error("Failed to parse credentials file {path}: {source}")]
    Parse {
        /// Credentials file
        path: PathBuf,
        /// Parser error
        #[source]
        source: toml::de::Error,
    },

    /// A required section is missing
    #[error("Credentials file {path} has no [{section}] section")]
    MissingSection {
        /// Credentials file
        path: PathBuf,
        /// Missing section name
        section: &'static str,
    },
}

/// Errors that abort a crawl run
#[derive(Error, Debug)]
pub enum CrawlError {
    /// Root directory or archive listing failed
    #[error(transparent)]
    Archive(#[from] dcmcrawl_archive::ArchiveError),

    /// Output could not be written
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Temporary extraction directory could not be used
    #[error("Temporary directory {path} is not usable: {source}")]
    TempDir {
        /// Temporary directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Result type for crawl runs
pub type Result<T> = std::result::Result<T, CrawlError>;
