//! Image file enumeration for dcmcrawl
//!
//! This crate finds the imaging files a crawl has to look at:
//!
//! - **Directory trees**: recursive walk below an archive root with pruned
//!   subtrees and an optional modification-time window ([`walk`])
//! - **TAR archives**: `.tar`, `.tar.gz`/`.tgz` and `.tar.bz2` archives, streamed
//!   one entry at a time ([`tar`])
//! - **Time windows**: date ranges for archive creation and file modification
//!   times ([`window`])
//!
//! # Usage
//!
//! ```no_run
//! use dcmcrawl_archive::{ExtensionFilter, TreeScanner};
//! use std::path::Path;
//!
//! let scanner = TreeScanner::new(ExtensionFilter::new(["dcm"]))
//!     .exclude("/data/xnat/archive/qa");
//! let files = scanner.scan(Path::new("/data/xnat/archive")).unwrap();
//! println!("{} files found", files.len());
//! ```
//!
//! ```no_run
//! use dcmcrawl_archive::{list_tar_archives, stream_tar_entries, ExtensionFilter};
//! use std::path::Path;
//!
//! for archive in list_tar_archives(Path::new("/archives")).unwrap() {
//!     stream_tar_entries(&archive, &ExtensionFilter::archive_default(), |entry| {
//!         println!("{}: {} bytes", entry.name, entry.contents.len());
//!         Ok(())
//!     })
//!     .unwrap();
//! }
//! ```

pub mod error;
pub mod tar;
pub mod walk;
pub mod window;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum size for a single file within an archive (100 MB).
///
/// Larger entries are skipped with a warning.
pub const MAX_FILE_SIZE: u64 = 100_000_000;

/// Image extensions accepted in directory trees by default
pub const DEFAULT_TREE_EXTENSIONS: [&str; 1] = ["dcm"];

/// Image extensions accepted inside TAR archives by default
pub const DEFAULT_ARCHIVE_EXTENSIONS: [&str; 4] = ["dcm", "dc3", "dic", "ima"];

pub use error::ArchiveError;
pub use tar::{list_tar_archives, stream_tar_entries, ArchiveEntry, TarCompression};
pub use walk::TreeScanner;
pub use window::{creation_time, modified_time, today, TimeWindow};

/// Case-insensitive allow-list of file extensions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    /// Filter accepting the given extensions (leading dots are ignored)
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Extensions accepted inside TAR archives (`dcm`, `dc3`, `dic`, `ima`)
    #[must_use]
    pub fn archive_default() -> Self {
        Self::new(DEFAULT_ARCHIVE_EXTENSIONS)
    }

    /// Accepted extensions, lower-cased
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Whether the extension of `path` is in the allow-list
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_TREE_EXTENSIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_filter() {
        let filter = ExtensionFilter::new([".DCM", "ima", ""]);
        assert_eq!(filter.extensions(), &["dcm".to_string(), "ima".to_string()]);
        assert!(filter.matches(Path::new("a/b/img.dcm")));
        assert!(filter.matches(Path::new("img.Dcm")));
        assert!(filter.matches(Path::new("MR.1.2.3.IMA")));
        assert!(!filter.matches(Path::new("img.dc3")));
        assert!(!filter.matches(Path::new("DICOMDIR")));
    }

    #[test]
    fn test_default_filters() {
        assert!(ExtensionFilter::default().matches(Path::new("x.dcm")));
        assert!(!ExtensionFilter::default().matches(Path::new("x.dic")));
        assert!(ExtensionFilter::archive_default().matches(Path::new("x.dic")));
        assert!(ExtensionFilter::archive_default().matches(Path::new("x.dc3")));
    }
}
