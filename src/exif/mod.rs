//! Read-only EXIF collaborator.
//!
//! EXIF is parsed with `nom-exif` to populate [`Location`] and a few camera fields.
//! It is never re-serialized: the rewriter passes EXIF segments through untouched and
//! raster mutations drop them.

mod location;
mod reader;

use serde::Serialize;

pub use location::{Dms, Location, Rational};
pub use reader::{ExifData, read_exif};

/// Coarse orientation of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
    Unknown,
}

impl Orientation {
    /// From an EXIF orientation code. Codes 1 to 4 keep the stored axes, 5 to 8 swap
    /// them; mirrored codes follow their rotation.
    pub fn from_exif(code: u16) -> Option<Self> {
        match code {
            1..=4 => Some(Orientation::Landscape),
            5..=8 => Some(Orientation::Portrait),
            _ => None,
        }
    }

    /// From an IPTC ImageOrientation (2:131) value.
    pub fn from_iptc(value: &str) -> Option<Self> {
        match value.trim() {
            "L" | "l" => Some(Orientation::Landscape),
            "P" | "p" => Some(Orientation::Portrait),
            "S" | "s" => Some(Orientation::Square),
            _ => None,
        }
    }

    /// From pixel dimensions.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            Orientation::Unknown
        } else if width > height {
            Orientation::Landscape
        } else if width < height {
            Orientation::Portrait
        } else {
            Orientation::Square
        }
    }

    /// The IPTC 2:131 code, if any.
    pub fn iptc_code(self) -> Option<&'static str> {
        match self {
            Orientation::Landscape => Some("L"),
            Orientation::Portrait => Some("P"),
            Orientation::Square => Some("S"),
            Orientation::Unknown => None,
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
            Orientation::Square => "square",
            Orientation::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
