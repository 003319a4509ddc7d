//! XNAT archive path conventions
//!
//! XNAT stores session files as
//! `<root>/archive/<project>/arc001/<session>/SCANS/<scan>/DICOM/<file>`.
//! Project and session identifiers are read from fixed positions relative to
//! the `archive` and `arc001` segments.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Directory that holds the project directories
pub const ARCHIVE_SEGMENT: &str = "archive";

/// XNAT archive partition below each project
pub const PARTITION_SEGMENT: &str = "arc001";

/// Directory that holds the scans of a session
pub const SCANS_SEGMENT: &str = "SCANS";

/// Lexically normalise a path: drop `.` and resolve `..` against the preceding
/// segment, without touching the filesystem
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(component),
            },
            other => normalized.push(other),
        }
    }
    normalized
}

/// Project id: the segment after the first `archive` segment, when the segment
/// two after `archive` is `arc001`
///
/// ```
/// use dcmcrawl_core::paths::project_id_from_path;
/// use std::path::Path;
///
/// let path = Path::new("/data/xnat/archive/PROJ1/arc001/S1/SCANS/2/DICOM/a.dcm");
/// assert_eq!(project_id_from_path(path).as_deref(), Some("PROJ1"));
/// assert_eq!(project_id_from_path(Path::new("/tmp/a.dcm")), None);
/// ```
#[must_use]
pub fn project_id_from_path(path: &Path) -> Option<String> {
    segment_after(path, ARCHIVE_SEGMENT, PARTITION_SEGMENT)
}

/// Session id: the segment after the first `arc001` segment, when the segment
/// two after `arc001` is `SCANS`
#[must_use]
pub fn session_id_from_path(path: &Path) -> Option<String> {
    segment_after(path, PARTITION_SEGMENT, SCANS_SEGMENT)
}

fn segment_after(path: &Path, marker: &str, grandchild: &str) -> Option<String> {
    let normalized = normalize(path);
    // Every segment keeps its position, including non-UTF-8 ones
    let segments: Vec<&OsStr> = normalized
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();

    let idx = segments.iter().position(|s| *s == OsStr::new(marker))?;
    if segments.get(idx + 2).copied() == Some(OsStr::new(grandchild)) {
        segments
            .get(idx + 1)
            .map(|s| s.to_string_lossy().into_owned())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XNAT_FILE: &str = "/data/xnat/archive/PROJ1/arc001/SESS_MR_1/SCANS/3/DICOM/img.dcm";

    #[test]
    fn test_project_and_session() {
        let path = Path::new(XNAT_FILE);
        assert_eq!(project_id_from_path(path).as_deref(), Some("PROJ1"));
        assert_eq!(session_id_from_path(path).as_deref(), Some("SESS_MR_1"));
    }

    #[test]
    fn test_missing_markers() {
        let path = Path::new("/scratch/PROJ1/SESS/img.dcm");
        assert_eq!(project_id_from_path(path), None);
        assert_eq!(session_id_from_path(path), None);
    }

    #[test]
    fn test_wrong_grandchild() {
        // `archive` present but not followed by <project>/arc001
        let path = Path::new("/data/archive/PROJ1/prearchive/SESS/SCANS/img.dcm");
        assert_eq!(project_id_from_path(path), None);

        let path = Path::new("/data/archive/P/arc001/SESS/RESOURCES/img.dcm");
        assert_eq!(project_id_from_path(path).as_deref(), Some("P"));
        assert_eq!(session_id_from_path(path), None);
    }

    #[test]
    fn test_only_first_marker_counts() {
        let path = Path::new("/archive/x/y/archive/P/arc001/S/SCANS/img.dcm");
        assert_eq!(project_id_from_path(path), None);
        assert_eq!(session_id_from_path(path).as_deref(), Some("S"));
    }

    #[test]
    fn test_marker_at_end() {
        assert_eq!(project_id_from_path(Path::new("/data/archive")), None);
        assert_eq!(project_id_from_path(Path::new("/data/archive/P")), None);
        assert_eq!(session_id_from_path(Path::new("/a/arc001/S")), None);
    }

    #[test]
    fn test_normalized_before_derivation() {
        let path = Path::new("/data/xnat/archive/PROJ1/arc001/./SESS/tmp/../SCANS/1/img.dcm");
        assert_eq!(session_id_from_path(path).as_deref(), Some("SESS"));

        let path = Path::new("/data/xnat/archive/OLD/../PROJ2/arc001/S/SCANS/img.dcm");
        assert_eq!(project_id_from_path(path).as_deref(), Some("PROJ2"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize(Path::new("../a")), PathBuf::from("../a"));
        assert_eq!(normalize(Path::new("../../a")), PathBuf::from("../../a"));
        assert_eq!(normalize(Path::new("/a/b/..")), PathBuf::from("/a"));
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_segments_keep_positions() {
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(
            b"/data/archive/PROJ1/bad\xff/arc001/S/SCANS/1/a.dcm",
        ));
        assert_eq!(project_id_from_path(path), None);
        assert_eq!(session_id_from_path(path).as_deref(), Some("S"));

        let path = Path::new(OsStr::from_bytes(
            b"/data/archive/PR\xffJ/arc001/S\xfe/SCANS/1/a.dcm",
        ));
        assert_eq!(project_id_from_path(path).as_deref(), Some("PR\u{FFFD}J"));
        assert_eq!(session_id_from_path(path).as_deref(), Some("S\u{FFFD}"));
    }

    #[test]
    fn test_relative_paths() {
        let path = Path::new("archive/P/arc001/S/SCANS/1/DICOM/x.dcm");
        assert_eq!(project_id_from_path(path).as_deref(), Some("P"));
        assert_eq!(session_id_from_path(path).as_deref(), Some("S"));
    }
}
