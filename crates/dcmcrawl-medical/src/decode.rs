//! DICOM header decoder
//!
//! Reads a DICOM file up to (but excluding) the pixel data and converts the data
//! set into a [`Header`]. Nested sequences are converted recursively so that
//! private per-volume records stay reachable.
//!
//! Also extracts the series context written next to each finding (study
//! description, study date, series number and description).

use crate::header::{Header, HeaderValue};
use chrono::NaiveDate;
use dicom::core::value::Value as DicomValue;
use dicom::core::PrimitiveValue;
use dicom_dictionary_std::tags;
use dicom_object::{InMemDicomObject, OpenFileOptions};
use std::path::Path;
use thiserror::Error;

/// DICOM decoding error
#[derive(Error, Debug)]
pub enum DicomError {
    /// File could not be opened or is not a valid DICOM file
    #[error("DICOM read error: {0}")]
    ReadError(String),
}

impl From<dicom_object::ReadError> for DicomError {
    #[inline]
    fn from(err: dicom_object::ReadError) -> Self {
        Self::ReadError(format!("{err}"))
    }
}

/// Series-level context of one image
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SeriesContext {
    /// Study description (0008,1030); XNAT sites often store the project here
    pub study_description: Option<String>,
    /// Study date (0008,0020) formatted as MM-DD-YYYY
    pub study_date: Option<String>,
    /// Series number (0020,0011)
    pub series_number: Option<String>,
    /// Series description (0008,103E)
    pub series_description: Option<String>,
}

/// Read the header of a DICOM file, stopping before the pixel data
///
/// # Errors
///
/// Returns an error if the file cannot be opened or is not a DICOM file.
#[must_use = "this function returns the decoded header that should be processed"]
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Header, DicomError> {
    let obj = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path.as_ref())?;

    Ok(header_from_object(&obj))
}

/// Convert an in-memory data set into a [`Header`]
#[must_use]
pub fn header_from_object(obj: &InMemDicomObject) -> Header {
    obj.into_iter()
        .map(|elem| (elem.header().tag, convert_value(elem.value())))
        .collect()
}

fn convert_value<P>(value: &DicomValue<InMemDicomObject, P>) -> HeaderValue {
    match value {
        DicomValue::Primitive(PrimitiveValue::Empty) => HeaderValue::Empty,
        DicomValue::Primitive(PrimitiveValue::U8(bytes)) => HeaderValue::Bytes(bytes.to_vec()),
        DicomValue::Primitive(primitive) => HeaderValue::Text(normalize_text(&primitive.to_str())),
        DicomValue::Sequence(sequence) => HeaderValue::Sequence(
            sequence.items().iter().map(header_from_object).collect(),
        ),
        // Encapsulated pixel data is never read (see `read_until`)
        DicomValue::PixelSequence(_) => HeaderValue::Empty,
    }
}

/// Trim DICOM padding from each value of a backslash-separated multi-value
fn normalize_text(raw: &str) -> String {
    raw.split('\\')
        .map(|part| part.trim_matches(|c: char| c == ' ' || c == '\0'))
        .collect::<Vec<&str>>()
        .join("\\")
}

/// Extract the series context from a decoded header
#[must_use]
pub fn extract_series_context(header: &Header) -> SeriesContext {
    SeriesContext {
        study_description: header.text(tags::STUDY_DESCRIPTION),
        study_date: header
            .text(tags::STUDY_DATE)
            .and_then(|date| format_study_date(&date)),
        series_number: header.text(tags::SERIES_NUMBER),
        series_description: header.text(tags::SERIES_DESCRIPTION),
    }
}

/// Format a DICOM date (YYYYMMDD) as MM-DD-YYYY
///
/// Returns `None` for anything that is not a valid calendar date.
#[inline]
#[must_use = "formats DICOM date for the audit log"]
pub fn format_study_date(date_str: &str) -> Option<String> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y%m%d")
        .ok()
        .map(|date| date.format("%m-%d-%Y").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{COIL_ELEMENT, SDI_COIL_ELEMENT, SDI_SEQUENCE, VOLUME_SEQUENCE};
    use crate::resolver::resolve_indicators;
    use dicom::core::value::DataSetSequence;
    use dicom::core::{DataElement, VR};
    use dicom_object::{FileMetaTableBuilder, Tag};

    fn volume_item(coil: &str) -> InMemDicomObject {
        let mut inner = InMemDicomObject::new_empty();
        inner.put(DataElement::new(
            SDI_COIL_ELEMENT,
            VR::LO,
            PrimitiveValue::from(coil),
        ));

        let mut volume = InMemDicomObject::new_empty();
        volume.put(DataElement::new(
            SDI_SEQUENCE,
            VR::SQ,
            DicomValue::Sequence(DataSetSequence::from(vec![inner])),
        ));
        volume
    }

    #[test]
    fn test_format_study_date() {
        assert_eq!(format_study_date("20231107").as_deref(), Some("11-07-2023"));
        assert_eq!(format_study_date(" 20240229 ").as_deref(), Some("02-29-2024"));
        assert_eq!(format_study_date("20230229"), None);
        assert_eq!(format_study_date("invalid"), None);
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("HEA;HEP "), "HEA;HEP");
        assert_eq!(normalize_text("ORIGINAL \\PRIMARY\0"), "ORIGINAL\\PRIMARY");
    }

    #[test]
    fn test_header_from_object_nested() {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(
            tags::SERIES_DESCRIPTION,
            VR::LO,
            PrimitiveValue::from("ep2d_bold "),
        ));
        obj.put(DataElement::new(
            VOLUME_SEQUENCE,
            VR::SQ,
            DicomValue::Sequence(DataSetSequence::from(vec![
                volume_item("HC1-7"),
                volume_item("HC1-6"),
            ])),
        ));

        let header = header_from_object(&obj);
        assert_eq!(header.text(tags::SERIES_DESCRIPTION).as_deref(), Some("ep2d_bold"));

        let volumes = header
            .get(VOLUME_SEQUENCE)
            .and_then(HeaderValue::items)
            .expect("volume sequence");
        assert_eq!(volumes.len(), 2);

        let values: Vec<String> = resolve_indicators(&header)
            .into_iter()
            .map(|i| i.value)
            .collect();
        assert_eq!(values, vec!["HC1-7", "HC1-6"]);
    }

    #[test]
    fn test_read_header_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("image.dcm");

        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(COIL_ELEMENT, VR::LO, PrimitiveValue::from("12")));
        obj.put(DataElement::new(
            tags::STUDY_DATE,
            VR::DA,
            PrimitiveValue::from("20240115"),
        ));
        obj.put(DataElement::new(
            tags::SERIES_NUMBER,
            VR::IS,
            PrimitiveValue::from("7"),
        ));
        let file = obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax("1.2.840.10008.1.2.1")
                    .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.4")
                    .media_storage_sop_instance_uid("2.25.1234"),
            )
            .expect("file meta");
        file.write_to_file(&path).expect("write DICOM");

        let header = read_header(&path).expect("read header");
        assert_eq!(header.text(COIL_ELEMENT).as_deref(), Some("12"));

        let context = extract_series_context(&header);
        assert_eq!(context.study_date.as_deref(), Some("01-15-2024"));
        assert_eq!(context.series_number.as_deref(), Some("7"));
        assert_eq!(context.series_description, None);
        assert!(header.contains(Tag(0x0051, 0x100F)));
    }

    #[test]
    fn test_read_header_not_dicom() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.dcm");
        std::fs::write(&path, b"definitely not a DICOM file").expect("write");

        let err = read_header(&path).unwrap_err();
        assert!(matches!(err, DicomError::ReadError(_)));
        assert!(err.to_string().starts_with("DICOM read error: "));
    }
}
