//! Output rows

use dcmcrawl_medical::{Indicator, SeriesContext};
use serde::Serialize;

/// Output column names, in order
pub const COLUMNS: [&str; 13] = [
    "project_id",
    "session_id",
    "subject_id",
    "filename",
    "sequence_index",
    "keyfield",
    "value",
    "study_description",
    "session_date",
    "series_number",
    "series_description",
    "archive",
    "directory",
];

/// Where an image came from and who it belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Provenance {
    /// Project id from the path, if the path follows the XNAT layout
    pub project_id: Option<String>,
    /// Session id from the path, if the path follows the XNAT layout
    pub session_id: Option<String>,
    /// Subject label from the identity service
    pub subject_id: Option<String>,
    /// Containing TAR archive, for images read from archives
    pub archive: Option<String>,
    /// Directory holding the image (inside the archive for archive entries)
    pub directory: String,
    /// Image file name
    pub filename: String,
}

impl Provenance {
    /// Row for one indicator of this image
    #[must_use]
    pub fn finding(&self, context: &SeriesContext, indicator: Indicator) -> Finding {
        Finding {
            project_id: self.project_id.clone(),
            session_id: self.session_id.clone(),
            subject_id: self.subject_id.clone(),
            filename: self.filename.clone(),
            sequence_index: indicator.sequence_index,
            keyfield: indicator.keyfield_label(),
            value: indicator.value,
            study_description: context.study_description.clone(),
            session_date: context.study_date.clone(),
            series_number: context.series_number.clone(),
            series_description: context.series_description.clone(),
            archive: self.archive.clone(),
            directory: self.directory.clone(),
        }
    }

    /// Row recorded for an image whose header could not be decoded
    #[must_use]
    pub fn blank_finding(&self) -> Finding {
        self.finding(&SeriesContext::default(), Indicator::blank())
    }
}

/// One output row
///
/// Field order is the output column order; see [`COLUMNS`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Finding {
    pub project_id: Option<String>,
    pub session_id: Option<String>,
    pub subject_id: Option<String>,
    pub filename: String,
    /// 0 unless the value came from the volume sequence
    pub sequence_index: usize,
    /// Matched tag as `(GGGG,EEEE)`, empty when nothing matched
    pub keyfield: String,
    pub value: String,
    pub study_description: Option<String>,
    /// Study date as MM-DD-YYYY
    pub session_date: Option<String>,
    pub series_number: Option<String>,
    pub series_description: Option<String>,
    pub archive: Option<String>,
    pub directory: String,
}
