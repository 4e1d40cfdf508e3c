use nom_exif::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Cursor;

use super::location::{Dms, Location, Rational};

/// The EXIF values this crate consumes. EXIF is never written back.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExifData {
    pub make: Option<String>,
    pub model: Option<String>,
    /// Raw orientation code, 1 to 8.
    pub orientation: Option<u16>,
    pub date_time_original: Option<String>,
    pub create_date: Option<String>,
    pub modify_date: Option<String>,
    pub location: Option<Location>,
    /// Every readable entry as text, keyed by tag name (`0x....` for unnamed tags).
    pub tags: BTreeMap<String, String>,
}

impl ExifData {
    pub fn is_empty(&self) -> bool {
        *self == ExifData::default()
    }
}

/// Read EXIF from an encoded image. Images without readable EXIF yield empty data.
pub fn read_exif(data: &[u8]) -> ExifData {
    let mut parser = MediaParser::new();
    let ms = match MediaSource::seekable(Cursor::new(data.to_vec())) {
        Ok(ms) => ms,
        Err(e) => {
            log::debug!("Unrecognised media for EXIF: {e}");
            return ExifData::default();
        }
    };

    let iter: ExifIter = match parser.parse(ms) {
        Ok(iter) => iter,
        Err(_) => {
            log::debug!("No EXIF data found");
            return ExifData::default();
        }
    };

    let tags = collect_tags(&iter);
    // Parse GPS info before converting to Exif (consumes the iterator)
    let gps_info = iter.parse_gps_info().ok().flatten();
    let exif: Exif = iter.into();

    let text = |tag: ExifTag| exif.get(tag).and_then(entry_to_string);

    let data = ExifData {
        make: text(ExifTag::Make),
        model: text(ExifTag::Model),
        orientation: text(ExifTag::Orientation).and_then(|v| v.parse().ok()),
        date_time_original: text(ExifTag::DateTimeOriginal),
        create_date: text(ExifTag::CreateDate),
        modify_date: text(ExifTag::ModifyDate),
        location: gps_info.map(|gps| Location {
            latitude_ref: gps.latitude_ref,
            latitude: latlng_to_dms(&gps.latitude),
            longitude_ref: gps.longitude_ref,
            longitude: latlng_to_dms(&gps.longitude),
        }),
        tags,
    };
    log::debug!(
        "EXIF: make={:?} model={:?} orientation={:?} gps={} ({} tags)",
        data.make,
        data.model,
        data.orientation,
        data.location.is_some(),
        data.tags.len()
    );
    data
}

/// The first occurrence of a tag wins, so IFD0 values shadow the thumbnail IFD.
fn collect_tags(iter: &ExifIter) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    for entry in iter.clone_and_rewind() {
        let Some(value) = entry.get_value().and_then(entry_to_string) else {
            continue;
        };
        let name = match entry.tag() {
            Some(tag) => tag.to_string(),
            None => format!("0x{:04X}", entry.tag_code()),
        };
        tags.entry(name).or_insert(value);
    }
    tags
}

/// Convert an EntryValue to an Option<String>.
fn entry_to_string(val: &EntryValue) -> Option<String> {
    let s = val.to_string();
    let s = s.trim().trim_matches('"').to_string();
    if s.is_empty() { None } else { Some(s) }
}

/// Keep the three URationals of a nom-exif LatLng exact.
fn latlng_to_dms(latlng: &LatLng) -> Dms {
    Dms {
        degrees: Rational::new(latlng.0.0, latlng.0.1),
        minutes: Rational::new(latlng.1.0, latlng.1.1),
        seconds: Rational::new(latlng.2.0, latlng.2.1),
    }
}
