//! Time windows for filtering files and archives by age

use chrono::{DateTime, Days, Local, Months, NaiveDate};
use std::fs::Metadata;
use std::io;
use std::path::Path;

/// Inclusive range of calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    /// First date in the window
    pub start: NaiveDate,
    /// Last date in the window
    pub end: NaiveDate,
}

impl TimeWindow {
    /// Window from `start` to `end`, both inclusive
    #[must_use]
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The last `months` calendar months up to and including `today`
    #[must_use]
    pub fn last_months(today: NaiveDate, months: u32) -> Self {
        let start = today
            .checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN);
        Self::new(start, today)
    }

    /// The last `days` days up to and including `today`
    #[must_use]
    pub fn last_days(today: NaiveDate, days: u64) -> Self {
        let start = today
            .checked_sub_days(Days::new(days))
            .unwrap_or(NaiveDate::MIN);
        Self::new(start, today)
    }

    /// Whether `date` falls inside the window
    #[inline]
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Whether `timestamp`, taken in local time, falls inside the window
    #[must_use]
    pub fn contains_timestamp(&self, timestamp: DateTime<Local>) -> bool {
        self.contains(timestamp.date_naive())
    }
}

/// Today's date in local time
#[must_use]
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Creation time of a file as recorded by the filesystem
///
/// On Unix this is the inode change time (`st_ctime`), which archive tooling
/// sets when an archive is written; elsewhere the platform creation time is used.
///
/// # Errors
///
/// Returns an error if the metadata cannot be read or carries no usable timestamp.
pub fn creation_time(path: &Path) -> io::Result<DateTime<Local>> {
    let metadata = std::fs::metadata(path)?;
    platform_creation_time(&metadata)
}

#[cfg(unix)]
fn platform_creation_time(metadata: &Metadata) -> io::Result<DateTime<Local>> {
    use std::os::unix::fs::MetadataExt;

    let nanos = u32::try_from(metadata.ctime_nsec()).unwrap_or(0);
    DateTime::from_timestamp(metadata.ctime(), nanos)
        .map(|utc| utc.with_timezone(&Local))
        .ok_or_else(|| io::Error::other("ctime out of range"))
}

#[cfg(not(unix))]
fn platform_creation_time(metadata: &Metadata) -> io::Result<DateTime<Local>> {
    metadata.created().map(DateTime::<Local>::from)
}

/// Last modification time of a file
///
/// # Errors
///
/// Returns an error if the metadata cannot be read.
pub fn modified_time(metadata: &Metadata) -> io::Result<DateTime<Local>> {
    metadata.modified().map(DateTime::<Local>::from)
}
