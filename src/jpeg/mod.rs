//! JPEG marker stream model.
//!
//! A [`JpegStream`] is the ordered list of [`Segment`]s of one JPEG file. Parsing and
//! serializing are exact inverses, so a stream that is never modified is written back
//! byte for byte. The two mutation primitives used by the rewriter both return a new
//! stream and leave the relative order of untouched segments alone.

mod segment;

pub use segment::{
    AppKind, Segment, APP0, APP1, APP13, EOI, EXIF_SIGNATURE, MAX_PAYLOAD, PHOTOSHOP_SIGNATURE,
    SOI, SOS, XMP_SIGNATURE,
};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegStream {
    segments: Vec<Segment>,
}

impl JpegStream {
    /// Parse a complete JPEG byte stream. Fails with [`Error::Container`](crate::error::Error::Container)
    /// when SOI is missing or a marker/segment is truncated.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let segments = segment::parse(data)?;
        log::debug!("Parsed JPEG stream: {} segments", segments.len());
        Ok(Self { segments })
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        segment::serialize(&self.segments)
    }

    /// Payloads of every APPn segment of the given kind, in stream order.
    pub fn app_payloads(&self, kind: AppKind) -> impl Iterator<Item = &[u8]> {
        self.segments
            .iter()
            .filter(move |s| s.app_kind() == Some(kind))
            .map(Segment::payload)
    }

    pub fn contains(&self, kind: AppKind) -> bool {
        self.segments.iter().any(|s| s.app_kind() == Some(kind))
    }

    /// A copy of this stream without any APPn segment of the given kind.
    pub fn without(&self, kind: AppKind) -> Self {
        let segments = self
            .segments
            .iter()
            .filter(|s| s.app_kind() != Some(kind))
            .cloned()
            .collect();
        Self { segments }
    }

    /// Index just past the last APPn segment of the run that directly follows SOI.
    /// Fill bytes inside the run do not end it.
    pub fn leading_app_run_end(&self) -> usize {
        let start = usize::from(self.segments.first() == Some(&Segment::Standalone(SOI)));
        let mut end = start;
        for (i, segment) in self.segments.iter().enumerate().skip(start) {
            match segment {
                Segment::App { .. } => end = i + 1,
                Segment::Raw(_) => {}
                _ => break,
            }
        }
        end
    }

    /// A copy of this stream with `new_segments` inserted after the leading APPn run,
    /// ahead of tables, frame header and scan data.
    pub fn insert_after_leading_app_run(&self, new_segments: Vec<Segment>) -> Self {
        let at = self.leading_app_run_end();
        let mut segments = Vec::with_capacity(self.segments.len() + new_segments.len());
        segments.extend_from_slice(&self.segments[..at]);
        segments.extend(new_segments);
        segments.extend_from_slice(&self.segments[at..]);
        Self { segments }
    }
}
