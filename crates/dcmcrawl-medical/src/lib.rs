//! DICOM header model and coil-element resolution for dcmcrawl
//!
//! This crate turns one DICOM file into a read-only [`Header`] and locates the
//! coil-element indicator in it:
//!
//! - **Header model** ([`header`]) - tag → value mapping with nested sequences
//! - **Decoder** ([`decode`]) - reads a file up to the pixel data
//! - **Resolver** ([`resolver`]) - priority-ordered lookup of the indicator
//!
//! # Examples
//!
//! ```rust,no_run
//! use dcmcrawl_medical::{read_header, resolve_indicators};
//!
//! let header = read_header("scan.dcm")?;
//! for indicator in resolve_indicators(&header) {
//!     println!(
//!         "{} {} {}",
//!         indicator.sequence_index,
//!         indicator.keyfield_label(),
//!         indicator.value
//!     );
//! }
//! # Ok::<(), dcmcrawl_medical::DicomError>(())
//! ```

/// DICOM file decoding
pub mod decode;
/// Decoded header model
pub mod header;
/// Coil-element indicator resolution
pub mod resolver;

pub use crate::decode::{
    extract_series_context, format_study_date, header_from_object, read_header, DicomError,
    SeriesContext,
};
pub use dicom_object::Tag;
pub use header::{tag_label, Header, HeaderValue, COIL_ELEMENT, VOLUME_SEQUENCE};
pub use resolver::{
    lookup_nested, resolve_indicators, Indicator, NestedLookupError, NestedPath, NESTED_PATHS,
    UNRESOLVED,
};
