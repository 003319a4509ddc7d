//! Decoded DICOM header model
//!
//! A [`Header`] is a read-only mapping from a tag to a [`HeaderValue`]. Values are
//! either scalars (text or opaque bytes) or sequences of nested headers, which is
//! how per-volume and per-frame sub-records show up in enhanced MR objects.

use dicom_object::Tag;
use std::collections::HashMap;
use std::fmt;

/// Primary coil-element tag (0051,100F)
pub const COIL_ELEMENT: Tag = Tag(0x0051, 0x100F);

/// Per-volume sequence container (5200,9230)
pub const VOLUME_SEQUENCE: Tag = Tag(0x5200, 0x9230);

/// Preferred nested sequence inside a volume item (0021,11FE)
pub const SDI_SEQUENCE: Tag = Tag(0x0021, 0x11FE);

/// Coil element inside [`SDI_SEQUENCE`] (0021,114F)
pub const SDI_COIL_ELEMENT: Tag = Tag(0x0021, 0x114F);

/// Alternate nested sequence inside a volume item (0021,10FE)
pub const SDS_SEQUENCE: Tag = Tag(0x0021, 0x10FE);

/// Coil element inside [`SDS_SEQUENCE`] (0021,104F)
pub const SDS_COIL_ELEMENT: Tag = Tag(0x0021, 0x104F);

/// Render a tag as `(GGGG,EEEE)` with upper-case hex digits
#[inline]
#[must_use]
pub fn tag_label(tag: Tag) -> String {
    format!("({:04X},{:04X})", tag.0, tag.1)
}

/// Value of a single header element
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HeaderValue {
    /// Element present with no value
    #[default]
    Empty,
    /// Textual or numeric value; multiple values are joined with `\`
    Text(String),
    /// Opaque binary value (OB, UN, ...)
    Bytes(Vec<u8>),
    /// Nested items (SQ)
    Sequence(Vec<Header>),
}

impl HeaderValue {
    /// Build a text value
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Nested items, if this value is a sequence
    #[must_use]
    pub fn items(&self) -> Option<&[Header]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Plain-text rendering of the value
    ///
    /// The rendering depends only on the value itself, never on where the value
    /// was found:
    /// - empty values render as an empty string
    /// - text renders as-is
    /// - binary values render as text when they are printable ASCII (after
    ///   trailing NUL/space padding is removed), otherwise as lower-case hex
    /// - sequences render as `<sequence of N items>`
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(text) => text.clone(),
            Self::Bytes(bytes) => bytes_to_text(bytes),
            Self::Sequence(items) => format!("<sequence of {} items>", items.len()),
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<Header>> for HeaderValue {
    fn from(items: Vec<Header>) -> Self {
        Self::Sequence(items)
    }
}

fn bytes_to_text(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .rposition(|b| *b != 0 && *b != b' ')
        .map_or(0, |pos| pos + 1);
    let trimmed = &bytes[..end];

    if trimmed
        .iter()
        .all(|b| b.is_ascii_graphic() || *b == b' ')
    {
        // Printable ASCII is valid UTF-8
        String::from_utf8_lossy(trimmed).into_owned()
    } else {
        trimmed.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Decoded metadata for one imaging file
///
/// Headers are assembled once (by the decoder or the [`Header::with`] builder)
/// and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    elements: HashMap<Tag, HeaderValue>,
}

impl Header {
    /// Create an empty header
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: return this header with `tag` set to `value`
    #[must_use]
    pub fn with(mut self, tag: Tag, value: impl Into<HeaderValue>) -> Self {
        self.elements.insert(tag, value.into());
        self
    }

    /// Whether the header holds `tag` (with or without a value)
    #[inline]
    #[must_use]
    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    /// Value stored under `tag`
    #[inline]
    #[must_use]
    pub fn get(&self, tag: Tag) -> Option<&HeaderValue> {
        self.elements.get(&tag)
    }

    /// Non-empty plain-text value stored under `tag`
    #[must_use]
    pub fn text(&self, tag: Tag) -> Option<String> {
        self.get(tag)
            .map(HeaderValue::to_text)
            .filter(|text| !text.is_empty())
    }

    /// Number of top-level elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the header holds no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterate over top-level elements in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (Tag, &HeaderValue)> {
        self.elements.iter().map(|(tag, value)| (*tag, value))
    }
}

impl FromIterator<(Tag, HeaderValue)> for Header {
    fn from_iter<I: IntoIterator<Item = (Tag, HeaderValue)>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}
