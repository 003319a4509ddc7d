//! Directory tree enumeration
//!
//! Recursive discovery of image files below an archive root, with excluded
//! subtrees pruned before they are entered.

use crate::error::ArchiveError;
use crate::window::{modified_time, TimeWindow};
use crate::ExtensionFilter;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Image file scanner for directory trees
#[derive(Debug, Clone, Default)]
pub struct TreeScanner {
    filter: ExtensionFilter,
    excluded: Vec<PathBuf>,
    modified_within: Option<TimeWindow>,
}

impl TreeScanner {
    /// Scanner accepting files that match `filter`
    #[must_use]
    pub fn new(filter: ExtensionFilter) -> Self {
        Self {
            filter,
            excluded: Vec::new(),
            modified_within: None,
        }
    }

    /// Prune the subtree rooted at `path`
    #[must_use]
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    /// Only accept files last modified inside `window`
    #[must_use]
    pub fn modified_within(mut self, window: TimeWindow) -> Self {
        self.modified_within = Some(window);
        self
    }

    /// Find all matching files below `root`, sorted by path
    ///
    /// Unreadable entries below the root are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` does not exist or is not a directory.
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
        if !root.exists() {
            return Err(ArchiveError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ArchiveError::NotADirectory(root.to_path_buf()));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.accepts(&entry) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => warn!("Error accessing entry: {e}"),
            }
        }

        debug!("Found {} image files below {}", files.len(), root.display());
        Ok(files)
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir() && self.excluded.iter().any(|p| entry.path() == p)
    }

    fn accepts(&self, entry: &DirEntry) -> bool {
        if !self.filter.matches(entry.path()) {
            return false;
        }

        let Some(window) = self.modified_within else {
            return true;
        };

        match entry.metadata().map_err(std::io::Error::from).and_then(|m| modified_time(&m)) {
            Ok(modified) => window.contains_timestamp(modified),
            Err(e) => {
                warn!("Cannot read modification time of {}: {e}", entry.path().display());
                false
            }
        }
    }
}
