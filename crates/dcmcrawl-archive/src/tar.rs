//! TAR archive streaming
//!
//! Image files inside TAR archives (uncompressed, gzip, or bzip2) are yielded
//! one at a time so that only a single entry is held in memory.

use crate::error::ArchiveError;
use crate::{ExtensionFilter, MAX_FILE_SIZE};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use log::{debug, warn};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use tar::Archive;

/// Sanitize a path to prevent path traversal attacks (e.g., ../../../etc/passwd)
///
/// Only normal components are kept; parent references, current-directory
/// references, roots, and drive prefixes are dropped.
///
/// Returns None if the path is entirely invalid (e.g., just "..")
#[inline]
fn sanitize_path(path: &Path) -> Option<PathBuf> {
    let mut sanitized = PathBuf::new();

    for component in path.components() {
        if let Component::Normal(part) = component {
            sanitized.push(part);
        }
    }

    if sanitized.as_os_str().is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Gzip magic bytes (RFC 1952)
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Bzip2 magic bytes ('B' 'Z')
const BZIP2_MAGIC: [u8; 2] = [0x42, 0x5a];

/// Compression type of a TAR archive
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum TarCompression {
    /// Uncompressed TAR
    #[default]
    None,
    /// Gzip compressed (.tar.gz, .tgz)
    Gzip,
    /// Bzip2 compressed (.tar.bz2, .tbz2)
    Bzip2,
}

impl TarCompression {
    /// Detect a TAR archive and its compression from the file name
    ///
    /// Returns `None` when the name does not look like a TAR archive.
    #[must_use = "returns the detected compression type"]
    pub fn from_file_name(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_lowercase();

        if name.ends_with(".tar") {
            Some(Self::None)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::Gzip)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz")
        {
            Some(Self::Bzip2)
        } else {
            None
        }
    }

    /// Detect compression from file magic bytes
    #[inline]
    #[must_use = "returns the detected compression type"]
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.len() < 4 {
            return Self::None;
        }

        if bytes[..2] == GZIP_MAGIC {
            return Self::Gzip;
        }

        if bytes[..2] == BZIP2_MAGIC {
            return Self::Bzip2;
        }

        Self::None
    }
}

impl std::fmt::Display for TarCompression {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
        };
        write!(f, "{s}")
    }
}

/// Image file read from a TAR archive
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ArchiveEntry {
    /// Sanitized entry name within the archive
    pub name: String,
    /// Sanitized entry path within the archive
    pub path: PathBuf,
    /// Entry contents
    pub contents: Vec<u8>,
}

impl ArchiveEntry {
    /// Directory of the entry within the archive ("" for top-level entries)
    #[must_use]
    pub fn directory(&self) -> String {
        self.path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name of the entry
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// List the TAR archives directly inside `dir` (not recursive), sorted by path
///
/// # Errors
///
/// Returns an error if `dir` does not exist, is not a directory, or cannot be read.
pub fn list_tar_archives(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    if !dir.exists() {
        return Err(ArchiveError::PathNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ArchiveError::NotADirectory(dir.to_path_buf()));
    }

    let mut archives = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && TarCompression::from_file_name(&path).is_some() {
            archives.push(path);
        }
    }
    archives.sort();

    Ok(archives)
}

/// Stream the allow-listed image entries of a TAR archive
///
/// Compression is sniffed from the magic bytes, falling back to the file name.
/// Entries are handed to `processor` one at a time; directories, special
/// files, macOS resource forks (`._name`), oversized files, and names outside
/// `filter` are skipped.
///
/// Returns the number of entries handed to `processor`.
///
/// # Errors
///
/// Returns `ArchiveError` if the archive cannot be opened or read, or
/// propagates the first error reported by `processor`.
pub fn stream_tar_entries<F>(
    path: &Path,
    filter: &ExtensionFilter,
    mut processor: F,
) -> Result<usize, ArchiveError>
where
    F: FnMut(ArchiveEntry) -> Result<(), Box<dyn std::error::Error>>,
{
    let named = TarCompression::from_file_name(path)
        .ok_or_else(|| ArchiveError::NotAnArchive(path.to_path_buf()))?;

    let mut file = File::open(path)?;
    let mut magic = [0u8; 4];
    let read = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    let compression = match TarCompression::from_magic_bytes(&magic[..read]) {
        TarCompression::None => named,
        sniffed => sniffed,
    };
    debug!("Streaming {} ({compression})", path.display());

    let reader = BufReader::new(file);
    match compression {
        TarCompression::None => stream_entries(&mut Archive::new(reader), filter, &mut processor),
        TarCompression::Gzip => {
            stream_entries(&mut Archive::new(GzDecoder::new(reader)), filter, &mut processor)
        }
        TarCompression::Bzip2 => {
            stream_entries(&mut Archive::new(BzDecoder::new(reader)), filter, &mut processor)
        }
    }
}

fn stream_entries<R: Read, F>(
    archive: &mut Archive<R>,
    filter: &ExtensionFilter,
    processor: &mut F,
) -> Result<usize, ArchiveError>
where
    F: FnMut(ArchiveEntry) -> Result<(), Box<dyn std::error::Error>>,
{
    let mut yielded = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let raw_path = entry.path()?.to_path_buf();
        let size = entry.header().size()?;

        let Some(sanitized_path) = sanitize_path(&raw_path) else {
            let raw_name = raw_path.to_string_lossy();
            warn!("Skipping invalid path: {raw_name} (path traversal attempt or empty)");
            continue;
        };
        let name = sanitized_path.to_string_lossy().to_string();

        if sanitized_path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("._"))
        {
            continue;
        }

        if !filter.matches(&sanitized_path) {
            continue;
        }

        if size > MAX_FILE_SIZE {
            warn!("Skipping large file: {name} ({size} bytes exceeds {MAX_FILE_SIZE} bytes limit)");
            continue;
        }

        // size <= MAX_FILE_SIZE, so the capacity hint fits in usize
        let mut contents = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
        entry.read_to_end(&mut contents)?;

        processor(ArchiveEntry {
            name: name.clone(),
            path: sanitized_path,
            contents,
        })
        .map_err(|e| ArchiveError::Processor {
            name,
            message: e.to_string(),
        })?;
        yielded += 1;
    }

    Ok(yielded)
}
