//! Error types for enumeration operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while enumerating image files
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// IO error while reading a directory or archive
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Root of a crawl does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Root of a crawl exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// File is not a recognised TAR archive
    #[error("Not a TAR archive: {0}")]
    NotAnArchive(PathBuf),

    /// Entry processor reported an error
    #[error("Failed to process entry '{name}': {message}")]
    Processor {
        /// Entry name within the archive
        name: String,
        /// Error reported by the processor
        message: String,
    },
}
