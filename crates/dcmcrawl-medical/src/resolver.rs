//! Coil-element field resolution
//!
//! Locates the coil-element indicator in a decoded [`Header`]. Scanners store it
//! in one of several places depending on software version, so resolution is a
//! priority-ordered chain:
//!
//! 1. `(0051,100F)` at the top level: one indicator, index 0.
//! 2. otherwise `(5200,9230)`: one indicator per volume item, each resolved
//!    through [`NESTED_PATHS`] in order (first success wins).
//! 3. otherwise a single blank indicator, so that every scanned file still
//!    produces a row.
//!
//! Resolution never fails. A volume item where every nested path fails is
//! recorded with the [`UNRESOLVED`] marker.

use crate::header::{
    tag_label, Header, HeaderValue, COIL_ELEMENT, SDI_COIL_ELEMENT, SDI_SEQUENCE,
    SDS_COIL_ELEMENT, SDS_SEQUENCE, VOLUME_SEQUENCE,
};
use dicom_object::Tag;
use log::debug;
use thiserror::Error;

/// Value recorded when no nested path yields a coil element
pub const UNRESOLVED: &str = "<unresolved>";

/// Two-level lookup: first item of `container`, then `element` within it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NestedPath {
    /// Sequence tag inside the volume item
    pub container: Tag,
    /// Tag looked up in the first item of `container`
    pub element: Tag,
}

/// Nested paths tried for each volume item, in priority order
pub const NESTED_PATHS: [NestedPath; 2] = [
    NestedPath {
        container: SDI_SEQUENCE,
        element: SDI_COIL_ELEMENT,
    },
    NestedPath {
        container: SDS_SEQUENCE,
        element: SDS_COIL_ELEMENT,
    },
];

/// Why a nested path did not yield a value
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedLookupError {
    /// Container tag absent from the volume item
    #[error("{} is absent", tag_label(*.0))]
    MissingContainer(Tag),
    /// Container present but not a sequence
    #[error("{} is not a sequence", tag_label(*.0))]
    NotASequence(Tag),
    /// Container is a sequence with no items
    #[error("{} has no items", tag_label(*.0))]
    EmptySequence(Tag),
    /// First item lacks the element tag
    #[error("{} is absent from the first item", tag_label(*.0))]
    MissingElement(Tag),
}

/// One resolved (or unresolved) indicator value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Indicator {
    /// 0 for top-level matches, otherwise the position in the volume sequence
    pub sequence_index: usize,
    /// Tag that matched, `None` when neither tag is present
    pub keyfield: Option<Tag>,
    /// Plain-text value
    pub value: String,
}

impl Indicator {
    /// Indicator for a file holding neither tag
    #[must_use]
    pub const fn blank() -> Self {
        Self {
            sequence_index: 0,
            keyfield: None,
            value: String::new(),
        }
    }

    /// Matched tag rendered as `(GGGG,EEEE)`, or empty when nothing matched
    #[must_use]
    pub fn keyfield_label(&self) -> String {
        self.keyfield.map(tag_label).unwrap_or_default()
    }

    /// Whether this indicator carries the [`UNRESOLVED`] marker
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.value == UNRESOLVED
    }
}

/// Resolve the coil-element indicators of one header
///
/// Always returns at least one indicator, except for a present but empty
/// `(5200,9230)` sequence, which contributes one indicator per item (none).
#[must_use]
pub fn resolve_indicators(header: &Header) -> Vec<Indicator> {
    if let Some(value) = header.get(COIL_ELEMENT) {
        return vec![Indicator {
            sequence_index: 0,
            keyfield: Some(COIL_ELEMENT),
            value: value.to_text(),
        }];
    }

    match header.get(VOLUME_SEQUENCE) {
        Some(HeaderValue::Sequence(volumes)) => volumes
            .iter()
            .enumerate()
            .map(|(index, volume)| Indicator {
                sequence_index: index,
                keyfield: Some(VOLUME_SEQUENCE),
                value: resolve_volume(index, volume),
            })
            .collect(),
        Some(_) => {
            debug!("{} is present but not a sequence", tag_label(VOLUME_SEQUENCE));
            vec![Indicator {
                sequence_index: 0,
                keyfield: Some(VOLUME_SEQUENCE),
                value: UNRESOLVED.to_string(),
            }]
        }
        None => vec![Indicator::blank()],
    }
}

/// Resolve a single volume item through [`NESTED_PATHS`]
fn resolve_volume(index: usize, volume: &Header) -> String {
    for path in NESTED_PATHS {
        match lookup_nested(volume, path) {
            Ok(value) => return value,
            Err(err) => debug!("Volume {index}: {err}"),
        }
    }
    UNRESOLVED.to_string()
}

/// Follow one nested path inside a volume item
///
/// # Errors
///
/// Returns the first step of the path that could not be followed.
pub fn lookup_nested(volume: &Header, path: NestedPath) -> Result<String, NestedLookupError> {
    let items = match volume.get(path.container) {
        None => return Err(NestedLookupError::MissingContainer(path.container)),
        Some(HeaderValue::Sequence(items)) => items,
        Some(_) => return Err(NestedLookupError::NotASequence(path.container)),
    };

    let first = items
        .first()
        .ok_or(NestedLookupError::EmptySequence(path.container))?;

    first
        .get(path.element)
        .map(HeaderValue::to_text)
        .ok_or(NestedLookupError::MissingElement(path.element))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sdi_volume(value: &str) -> Header {
        Header::new().with(
            SDI_SEQUENCE,
            vec![Header::new().with(SDI_COIL_ELEMENT, value)],
        )
    }

    fn sds_volume(value: &str) -> Header {
        Header::new().with(
            SDS_SEQUENCE,
            vec![Header::new().with(SDS_COIL_ELEMENT, value)],
        )
    }

    #[test]
    fn test_primary_tag() {
        let header = Header::new().with(COIL_ELEMENT, "HEA;HEP");
        let indicators = resolve_indicators(&header);

        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].sequence_index, 0);
        assert_eq!(indicators[0].keyfield, Some(COIL_ELEMENT));
        assert_eq!(indicators[0].keyfield_label(), "(0051,100F)");
        assert_eq!(indicators[0].value, "HEA;HEP");
    }

    #[test]
    fn test_primary_tag_wins_over_sequence() {
        let header = Header::new()
            .with(COIL_ELEMENT, "12")
            .with(VOLUME_SEQUENCE, vec![sdi_volume("A"), sdi_volume("B")]);
        let indicators = resolve_indicators(&header);

        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].keyfield, Some(COIL_ELEMENT));
        assert_eq!(indicators[0].value, "12");
    }

    #[test]
    fn test_volume_sequence_in_order() {
        let header = Header::new().with(
            VOLUME_SEQUENCE,
            vec![sdi_volume("HC1-7"), sds_volume("HC1-6"), sdi_volume("HC1-5")],
        );
        let indicators = resolve_indicators(&header);

        let indices: Vec<usize> = indicators.iter().map(|i| i.sequence_index).collect();
        let values: Vec<&str> = indicators.iter().map(|i| i.value.as_str()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(values, vec!["HC1-7", "HC1-6", "HC1-5"]);
        assert!(indicators
            .iter()
            .all(|i| i.keyfield_label() == "(5200,9230)"));
    }

    #[test]
    fn test_fallback_on_empty_preferred_sequence() {
        let volume = Header::new()
            .with(SDI_SEQUENCE, Vec::<Header>::new())
            .with(
                SDS_SEQUENCE,
                vec![Header::new().with(SDS_COIL_ELEMENT, "BO1,2")],
            );
        assert_eq!(
            lookup_nested(&volume, NESTED_PATHS[0]),
            Err(NestedLookupError::EmptySequence(SDI_SEQUENCE))
        );

        let header = Header::new().with(VOLUME_SEQUENCE, vec![volume]);
        assert_eq!(resolve_indicators(&header)[0].value, "BO1,2");
    }

    #[test]
    fn test_fallback_on_missing_inner_element() {
        let volume = Header::new()
            .with(SDI_SEQUENCE, vec![Header::new().with(Tag(0x0021, 0x1100), "x")])
            .with(
                SDS_SEQUENCE,
                vec![Header::new().with(SDS_COIL_ELEMENT, "HEA")],
            );
        assert_eq!(
            lookup_nested(&volume, NESTED_PATHS[0]),
            Err(NestedLookupError::MissingElement(SDI_COIL_ELEMENT))
        );

        let header = Header::new().with(VOLUME_SEQUENCE, vec![volume]);
        assert_eq!(resolve_indicators(&header)[0].value, "HEA");
    }

    #[test]
    fn test_fallback_on_wrong_shape() {
        let volume = Header::new()
            .with(SDI_SEQUENCE, "not a sequence")
            .with(
                SDS_SEQUENCE,
                vec![Header::new().with(SDS_COIL_ELEMENT, "HEP")],
            );
        assert_eq!(
            lookup_nested(&volume, NESTED_PATHS[0]),
            Err(NestedLookupError::NotASequence(SDI_SEQUENCE))
        );
        let header = Header::new().with(VOLUME_SEQUENCE, vec![volume]);
        assert_eq!(resolve_indicators(&header)[0].value, "HEP");
    }

    #[test]
    fn test_lookup_error_messages() {
        assert_eq!(
            NestedLookupError::EmptySequence(SDI_SEQUENCE).to_string(),
            "(0021,11FE) has no items"
        );
        assert_eq!(
            NestedLookupError::MissingElement(SDS_COIL_ELEMENT).to_string(),
            "(0021,104F) is absent from the first item"
        );
    }

    #[test]
    fn test_both_paths_fail() {
        let header = Header::new().with(
            VOLUME_SEQUENCE,
            vec![sdi_volume("A"), Header::new(), sds_volume("C")],
        );
        let indicators = resolve_indicators(&header);

        assert_eq!(indicators.len(), 3);
        assert_eq!(indicators[0].value, "A");
        assert!(indicators[1].is_unresolved());
        assert_eq!(indicators[1].sequence_index, 1);
        assert_eq!(indicators[2].value, "C");
    }

    #[test]
    fn test_volume_tag_not_a_sequence() {
        let header = Header::new().with(VOLUME_SEQUENCE, "garbage");
        let indicators = resolve_indicators(&header);

        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].keyfield, Some(VOLUME_SEQUENCE));
        assert!(indicators[0].is_unresolved());
    }

    #[test]
    fn test_empty_volume_sequence() {
        let header = Header::new().with(VOLUME_SEQUENCE, Vec::<Header>::new());
        assert!(resolve_indicators(&header).is_empty());
    }

    #[test]
    fn test_neither_tag() {
        let header = Header::new().with(Tag(0x0008, 0x103E), "localizer");
        let indicators = resolve_indicators(&header);

        assert_eq!(indicators, vec![Indicator::blank()]);
        assert_eq!(indicators[0].keyfield_label(), "");
        assert_eq!(indicators[0].value, "");
    }

    #[test]
    fn test_stringification_is_branch_independent() {
        let bytes = HeaderValue::Bytes(b"HEA;HEP ".to_vec());
        let top = Header::new().with(COIL_ELEMENT, bytes.clone());
        let nested = Header::new().with(
            VOLUME_SEQUENCE,
            vec![Header::new().with(
                SDI_SEQUENCE,
                vec![Header::new().with(SDI_COIL_ELEMENT, bytes)],
            )],
        );

        assert_eq!(resolve_indicators(&top)[0].value, "HEA;HEP");
        assert_eq!(resolve_indicators(&nested)[0].value, "HEA;HEP");
    }

    proptest! {
        #[test]
        fn prop_one_indicator_per_volume(values in proptest::collection::vec("[A-Z0-9;,-]{0,12}", 0..20)) {
            let volumes: Vec<Header> = values.iter().map(|v| sdi_volume(v)).collect();
            let header = Header::new().with(VOLUME_SEQUENCE, volumes);
            let indicators = resolve_indicators(&header);

            prop_assert_eq!(indicators.len(), values.len());
            for (position, (indicator, value)) in indicators.iter().zip(&values).enumerate() {
                prop_assert_eq!(indicator.sequence_index, position);
                prop_assert_eq!(&indicator.value, value);
            }
        }

        #[test]
        fn prop_primary_tag_always_single(value in "[ -~]{0,32}", volumes in 0usize..5) {
            let header = Header::new()
                .with(COIL_ELEMENT, value.as_str())
                .with(VOLUME_SEQUENCE, vec![sdi_volume("X"); volumes]);
            let indicators = resolve_indicators(&header);

            prop_assert_eq!(indicators.len(), 1);
            prop_assert_eq!(indicators[0].sequence_index, 0);
            prop_assert_eq!(indicators[0].keyfield, Some(COIL_ELEMENT));
        }
    }
}

