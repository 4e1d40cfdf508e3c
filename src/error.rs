use std::fmt;
use thiserror::Error;

use crate::codec::Format;

/// The metadata schema a parse failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Iptc,
    Xmp,
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Iptc => f.write_str("IPTC"),
            Schema::Xmp => f.write_str("XMP"),
        }
    }
}

/// Errors produced while reading or rewriting image metadata.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The byte stream is not a valid segmented image (missing SOI, truncated marker, ...).
    /// Aborts the whole read.
    #[error("invalid container: {0}")]
    Container(String),

    /// A metadata block is present but cannot be decoded.
    #[error("malformed {schema} metadata: {detail}")]
    MetadataParse { schema: Schema, detail: String },

    /// Metadata write requested for a container kind with no metadata path.
    #[error("{0} images have no metadata storage")]
    UnsupportedFormat(Format),

    /// A re-encoded metadata payload does not fit in a single JPEG segment.
    #[error("segment payload of {0} bytes exceeds the 65533 byte JPEG limit")]
    SegmentTooLarge(usize),

    /// The pixel codec failed to decode or encode the raster.
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn container(detail: impl Into<String>) -> Self {
        Error::Container(detail.into())
    }

    pub(crate) fn iptc(detail: impl Into<String>) -> Self {
        Error::MetadataParse {
            schema: Schema::Iptc,
            detail: detail.into(),
        }
    }

    pub(crate) fn xmp(detail: impl Into<String>) -> Self {
        Error::MetadataParse {
            schema: Schema::Xmp,
            detail: detail.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
