//! Read, edit and re-embed the metadata of one JPEG.
//!
//! A [`JpegRewriter`] starts in [`Phase::Loaded`] holding only the parsed segment list.
//! The first call to [`JpegRewriter::metadata`] decodes the IPTC and XMP segments and
//! merges them ([`Phase::Resolved`]); any edit through
//! [`JpegRewriter::metadata_mut`] makes it [`Phase::Mutated`]. Writing a stream that is
//! not mutated emits the original bytes unchanged.

use std::io::Write;

use crate::error::Result;
use crate::iptc::{self, IptcStore};
use crate::jpeg::{AppKind, JpegStream, Segment, APP1, APP13, PHOTOSHOP_SIGNATURE};
use crate::metadata::{self, ExtendedMetadata};
use crate::xmp::XmpDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Segments parsed, metadata not decoded yet.
    Loaded,
    /// Metadata decoded and cached, no edits.
    Resolved,
    /// Metadata edited since it was resolved or last written.
    Mutated,
}

#[derive(Debug, Clone)]
struct Resolved {
    iptc: IptcStore,
    /// False when the Photoshop resource blocks could not be walked. The APP13
    /// segments are then never replaced.
    iptc_writable: bool,
    xmp: XmpDocument,
    metadata: ExtendedMetadata,
}

impl Resolved {
    fn decode(stream: &JpegStream) -> Result<Self> {
        let (iptc, iptc_writable) = match read_iptc(stream) {
            Some(store) => (store, true),
            None => (IptcStore::new(), false),
        };
        let xmp = XmpDocument::from_app1_payloads(stream.app_payloads(AppKind::Xmp))?;
        let metadata = metadata::merge(&iptc, xmp.as_ref());
        Ok(Self {
            iptc,
            iptc_writable,
            xmp: xmp.unwrap_or_default(),
            metadata,
        })
    }
}

#[derive(Debug, Clone)]
pub struct JpegRewriter {
    stream: JpegStream,
    /// `None` until metadata is first requested, and again after a write.
    resolved: Option<Box<Resolved>>,
}

impl JpegRewriter {
    /// Parse the segments of a JPEG. Metadata is decoded on first use.
    pub fn load(data: &[u8]) -> Result<Self> {
        Ok(Self::from_stream(JpegStream::parse(data)?))
    }

    pub fn from_stream(stream: JpegStream) -> Self {
        Self {
            stream,
            resolved: None,
        }
    }

    pub fn stream(&self) -> &JpegStream {
        &self.stream
    }

    pub fn phase(&self) -> Phase {
        match &self.resolved {
            None => Phase::Loaded,
            Some(r) if r.metadata.is_dirty() => Phase::Mutated,
            Some(_) => Phase::Resolved,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.phase() == Phase::Mutated
    }

    pub fn metadata(&mut self) -> Result<&ExtendedMetadata> {
        Ok(&self.resolve()?.metadata)
    }

    pub fn metadata_mut(&mut self) -> Result<&mut ExtendedMetadata> {
        Ok(&mut self.resolve()?.metadata)
    }

    /// The decoded IPTC store and XMP document, as read from the stream.
    pub fn schemas(&mut self) -> Result<(&IptcStore, &XmpDocument)> {
        let resolved = self.resolve()?;
        Ok((&resolved.iptc, &resolved.xmp))
    }

    fn resolve(&mut self) -> Result<&mut Resolved> {
        let resolved = match self.resolved.take() {
            Some(resolved) => resolved,
            None => Box::new(Resolved::decode(&self.stream)?),
        };
        Ok(self.resolved.insert(resolved))
    }

    /// The stream as it would be written: the original one when nothing changed,
    /// otherwise one with the changed schema segments replaced.
    pub fn rendered_stream(&self) -> Result<JpegStream> {
        let resolved = match &self.resolved {
            Some(r) if r.metadata.is_dirty() => r,
            _ => return Ok(self.stream.clone()),
        };

        let (iptc, xmp) = metadata::split(&resolved.metadata, &resolved.iptc, &resolved.xmp)?;
        let mut stream = self.stream.clone();
        let mut replacements = Vec::new();

        if iptc.is_dirty() && !resolved.iptc_writable {
            log::warn!("Photoshop block is unreadable; IPTC edits are not written");
        } else if iptc.is_dirty() {
            stream = stream.without(AppKind::PhotoshopIptc);
            if let Some(payload) = iptc::encode(&iptc)? {
                replacements.push(Segment::app(APP13, payload)?);
            }
        }
        if xmp != resolved.xmp {
            stream = stream.without(AppKind::Xmp);
            for payload in xmp.to_app1_payloads() {
                replacements.push(Segment::app(APP1, payload)?);
            }
        }

        log::debug!(
            "Rewriting JPEG metadata: {} replacement segment(s)",
            replacements.len()
        );
        Ok(stream.insert_after_leading_app_run(replacements))
    }

    /// The IPTC and XMP segments of the rendered stream, pending edits included.
    pub fn metadata_segments(&self) -> Result<Vec<Segment>> {
        Ok(self
            .rendered_stream()?
            .into_segments()
            .into_iter()
            .filter(|s| matches!(s.app_kind(), Some(AppKind::PhotoshopIptc | AppKind::Xmp)))
            .collect())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.rendered_stream()?.to_bytes())
    }

    /// Write the image to `sink`.
    ///
    /// The whole output is assembled before anything reaches the sink, so a failed
    /// re-encode writes nothing. After a write of edited metadata the rewriter holds
    /// the written stream and decodes its metadata again on next use.
    pub fn write<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        let dirty = self.is_dirty();
        let stream = self.rendered_stream()?;
        sink.write_all(&stream.to_bytes())?;
        if dirty {
            self.stream = stream;
            self.resolved = None;
        }
        Ok(())
    }
}

/// Decode the Photoshop APP13 segments. Every Photoshop segment of the stream is
/// joined in stream order, the signature of each one after the first stripped, since
/// a resource block may be split across segments.
///
/// A broken IIM stream reads as empty records next to the intact resource blocks.
/// `None` means the resource blocks themselves are unreadable.
fn read_iptc(stream: &JpegStream) -> Option<IptcStore> {
    let mut payload: Option<Vec<u8>> = None;
    for segment in stream.app_payloads(AppKind::PhotoshopIptc) {
        match payload.as_mut() {
            None => payload = Some(segment.to_vec()),
            Some(joined) => {
                joined.extend_from_slice(&segment[PHOTOSHOP_SIGNATURE.len()..]);
            }
        }
    }

    let Some(payload) = payload else {
        return Some(IptcStore::new());
    };
    match iptc::decode_lossy(&payload) {
        Ok(store) => Some(store),
        Err(e) => {
            log::warn!("Ignoring unreadable Photoshop block: {e}");
            None
        }
    }
}
