use crate::error::{Error, Result};

pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const APP0: u8 = 0xE0;
pub const APP1: u8 = 0xE1;
pub const APP13: u8 = 0xED;
pub const APP15: u8 = 0xEF;
const TEM: u8 = 0x01;

/// Largest payload a length-prefixed segment can carry (the u16 length counts itself).
pub const MAX_PAYLOAD: usize = 0xFFFF - 2;

pub const EXIF_SIGNATURE: &[u8] = b"Exif\0\0";
pub const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
pub const PHOTOSHOP_SIGNATURE: &[u8] = b"Photoshop 3.0\0";

/// What an APPn segment carries, decided from its marker and payload signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppKind {
    Exif,
    Xmp,
    PhotoshopIptc,
    Other,
}

impl AppKind {
    pub fn classify(marker: u8, payload: &[u8]) -> Self {
        match marker {
            APP1 if payload.starts_with(EXIF_SIGNATURE) => AppKind::Exif,
            APP1 if payload.starts_with(XMP_SIGNATURE) => AppKind::Xmp,
            APP13 if payload.starts_with(PHOTOSHOP_SIGNATURE) => AppKind::PhotoshopIptc,
            _ => AppKind::Other,
        }
    }
}

/// One piece of a JPEG byte stream.
///
/// Concatenating the serialized pieces of a parsed stream reproduces the input
/// byte for byte, including fill bytes and anything after EOI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Marker without a length field: SOI, EOI, RSTn, TEM.
    Standalone(u8),
    /// Length-prefixed segment the rewriter does not interpret (tables, SOF, SOS header, COM, ...).
    Opaque { marker: u8, payload: Vec<u8> },
    /// APPn segment, classified by its payload signature.
    App {
        marker: u8,
        kind: AppKind,
        payload: Vec<u8>,
    },
    /// Entropy-coded scan data following an SOS header, stuffed bytes and RST markers included.
    EntropyCoded(Vec<u8>),
    /// Bytes not owned by any marker: 0xFF fill before a marker, trailing data after EOI.
    Raw(Vec<u8>),
}

impl Segment {
    /// Build an APPn segment, rejecting payloads that cannot be length-prefixed.
    pub fn app(marker: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::SegmentTooLarge(payload.len()));
        }
        let kind = AppKind::classify(marker, &payload);
        Ok(Segment::App {
            marker,
            kind,
            payload,
        })
    }

    pub fn marker(&self) -> Option<u8> {
        match self {
            Segment::Standalone(m) => Some(*m),
            Segment::Opaque { marker, .. } | Segment::App { marker, .. } => Some(*marker),
            Segment::EntropyCoded(_) | Segment::Raw(_) => None,
        }
    }

    pub fn app_kind(&self) -> Option<AppKind> {
        match self {
            Segment::App { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Segment::Opaque { payload, .. } | Segment::App { payload, .. } => payload,
            Segment::EntropyCoded(bytes) | Segment::Raw(bytes) => bytes,
            Segment::Standalone(_) => &[],
        }
    }

    pub fn is_app(&self) -> bool {
        matches!(self, Segment::App { .. })
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Segment::Standalone(marker) => out.extend_from_slice(&[0xFF, *marker]),
            Segment::Opaque { marker, payload } | Segment::App { marker, payload, .. } => {
                debug_assert!(payload.len() <= MAX_PAYLOAD);
                let length = (payload.len() + 2) as u16;
                out.extend_from_slice(&[0xFF, *marker]);
                out.extend_from_slice(&length.to_be_bytes());
                out.extend_from_slice(payload);
            }
            Segment::EntropyCoded(bytes) | Segment::Raw(bytes) => out.extend_from_slice(bytes),
        }
    }
}

fn is_standalone(marker: u8) -> bool {
    matches!(marker, SOI | EOI | TEM | 0xD0..=0xD7)
}

/// Split a JPEG byte stream into segments.
pub fn parse(data: &[u8]) -> Result<Vec<Segment>> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != SOI {
        return Err(Error::container("missing SOI marker"));
    }

    let mut segments = vec![Segment::Standalone(SOI)];
    let mut pos = 2;

    while pos < data.len() {
        if data[pos] != 0xFF {
            return Err(Error::container(format!(
                "expected marker at offset {pos}, found 0x{:02X}",
                data[pos]
            )));
        }

        // Any number of 0xFF fill bytes may precede a marker
        let fill_start = pos;
        while pos + 1 < data.len() && data[pos + 1] == 0xFF {
            pos += 1;
        }
        if pos > fill_start {
            segments.push(Segment::Raw(data[fill_start..pos].to_vec()));
        }
        if pos + 1 >= data.len() {
            return Err(Error::container(format!("truncated marker at offset {pos}")));
        }

        let marker = data[pos + 1];
        let offset = pos;
        pos += 2;

        if marker == 0x00 {
            return Err(Error::container(format!(
                "stuffed byte outside scan data at offset {offset}"
            )));
        }

        if is_standalone(marker) {
            segments.push(Segment::Standalone(marker));
            if marker == EOI {
                if pos < data.len() {
                    segments.push(Segment::Raw(data[pos..].to_vec()));
                }
                break;
            }
            continue;
        }

        if pos + 2 > data.len() {
            return Err(Error::container(format!(
                "truncated length for marker 0x{marker:02X} at offset {offset}"
            )));
        }
        let length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        if length < 2 || pos + length > data.len() {
            return Err(Error::container(format!(
                "invalid length {length} for marker 0x{marker:02X} at offset {offset}"
            )));
        }
        let payload = data[pos + 2..pos + length].to_vec();
        pos += length;

        if (APP0..=APP15).contains(&marker) {
            let kind = AppKind::classify(marker, &payload);
            segments.push(Segment::App {
                marker,
                kind,
                payload,
            });
        } else {
            segments.push(Segment::Opaque { marker, payload });
        }

        if marker == SOS {
            let end = entropy_coded_end(data, pos);
            if end > pos {
                segments.push(Segment::EntropyCoded(data[pos..end].to_vec()));
            }
            pos = end;
        }
    }

    Ok(segments)
}

/// Offset of the first marker that ends the scan starting at `start`.
/// Stuffed zero bytes and RST markers belong to the scan.
fn entropy_coded_end(data: &[u8], start: usize) -> usize {
    let mut i = start;
    while i + 1 < data.len() {
        if data[i] == 0xFF {
            let next = data[i + 1];
            if next == 0x00 || (0xD0..=0xD7).contains(&next) {
                i += 2;
                continue;
            }
            return i;
        }
        i += 1;
    }
    data.len()
}

/// Concatenate segments back into a byte stream.
pub fn serialize(segments: &[Segment]) -> Vec<u8> {
    let capacity = segments.iter().map(|s| s.payload().len() + 4).sum();
    let mut out = Vec::with_capacity(capacity);
    for segment in segments {
        segment.write_to(&mut out);
    }
    out
}
