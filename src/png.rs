//! XMP-only metadata path for PNG.
//!
//! PNG has no IPTC carrier, so the merged view is computed from the XMP packet alone.
//! The packet lives in an uncompressed `iTXt` chunk with the keyword
//! `XML:com.adobe.xmp`; chunk handling is done with `img-parts`.

use std::io::Write;

use img_parts::png::{Png, PngChunk};
use img_parts::Bytes;

use crate::error::{Error, Result};
use crate::iptc::IptcStore;
use crate::metadata::{self, ExtendedMetadata, Field};
use crate::rewriter::Phase;
use crate::xmp::XmpDocument;

const ITXT: [u8; 4] = *b"iTXt";
const XMP_KEYWORD: &[u8] = b"XML:com.adobe.xmp";

/// Contents of an uncompressed `iTXt` chunk carrying `packet`.
pub fn xmp_chunk_contents(packet: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(XMP_KEYWORD.len() + 5 + packet.len());
    out.extend_from_slice(XMP_KEYWORD);
    // NUL, compression flag, compression method, empty language tag, empty translated keyword
    out.extend_from_slice(&[0, 0, 0, 0, 0]);
    out.extend_from_slice(packet.as_bytes());
    out
}

fn is_xmp_chunk(chunk: &PngChunk) -> bool {
    chunk.kind() == ITXT
        && chunk.contents().starts_with(XMP_KEYWORD)
        && chunk.contents().get(XMP_KEYWORD.len()) == Some(&0)
}

/// The packet text of an XMP `iTXt` chunk, `None` when it is compressed.
fn chunk_packet(contents: &[u8]) -> Option<&[u8]> {
    let rest = &contents[XMP_KEYWORD.len() + 1..];
    let (&compressed, rest) = rest.split_first()?;
    if compressed != 0 {
        return None;
    }
    // compression method, then two NUL terminated strings
    let rest = rest.get(1..)?;
    let lang_end = rest.iter().position(|&b| b == 0)?;
    let rest = &rest[lang_end + 1..];
    let keyword_end = rest.iter().position(|&b| b == 0)?;
    Some(&rest[keyword_end + 1..])
}

fn read_xmp(png: &Png) -> Result<Option<XmpDocument>> {
    for chunk in png.chunks().iter().filter(|c| is_xmp_chunk(c)) {
        match chunk_packet(chunk.contents()) {
            Some(packet) => return XmpDocument::from_bytes(packet).map(Some),
            None => log::warn!("Skipping compressed or truncated XMP iTXt chunk"),
        }
    }
    Ok(None)
}

/// Insert or replace the XMP packet of an encoded PNG.
pub fn embed_xmp(data: &[u8], packet: &str) -> Result<Vec<u8>> {
    let mut png = parse_png(data)?;
    replace_xmp_chunk(&mut png, Some(packet));
    Ok(png.encoder().bytes().to_vec())
}

fn parse_png(data: &[u8]) -> Result<Png> {
    Png::from_bytes(Bytes::copy_from_slice(data))
        .map_err(|e| Error::container(format!("invalid PNG: {e}")))
}

fn replace_xmp_chunk(png: &mut Png, packet: Option<&str>) {
    let chunks = png.chunks_mut();
    chunks.retain(|c| !is_xmp_chunk(c));
    if let Some(packet) = packet {
        let chunk = PngChunk::new(ITXT, Bytes::from(xmp_chunk_contents(packet)));
        // Right after IHDR
        let at = chunks.len().min(1);
        chunks.insert(at, chunk);
    }
}

#[derive(Debug, Clone)]
struct Resolved {
    xmp: XmpDocument,
    metadata: ExtendedMetadata,
}

/// Metadata access for one PNG, mirroring [`JpegRewriter`](crate::rewriter::JpegRewriter).
#[derive(Debug, Clone)]
pub struct PngRewriter {
    original: Vec<u8>,
    resolved: Option<Box<Resolved>>,
}

impl PngRewriter {
    /// Check the chunk structure. Metadata is decoded on first use.
    pub fn load(data: &[u8]) -> Result<Self> {
        parse_png(data)?;
        Ok(Self {
            original: data.to_vec(),
            resolved: None,
        })
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

    fn resolve(&mut self) -> Result<&mut Resolved> {
        let resolved = match self.resolved.take() {
            Some(resolved) => resolved,
            None => {
                let xmp = read_xmp(&parse_png(&self.original)?)?;
                let metadata = metadata::merge(&IptcStore::new(), xmp.as_ref());
                Box::new(Resolved {
                    xmp: xmp.unwrap_or_default(),
                    metadata,
                })
            }
        };
        Ok(self.resolved.insert(resolved))
    }

    /// The XMP packet as it would be written, pending edits included.
    pub fn current_packet(&mut self) -> Result<Option<String>> {
        let dirty = self.is_dirty();
        let resolved = self.resolve()?;
        if !dirty {
            return Ok(resolved.xmp.packet().map(str::to_string));
        }
        let (_, xmp) = metadata::split(&resolved.metadata, &IptcStore::new(), &resolved.xmp)?;
        Ok(xmp.packet().map(str::to_string))
    }

    /// Put this image's XMP into a freshly encoded PNG. A packet that cannot be
    /// parsed is carried over as the original chunk.
    pub fn carry_xmp(&self, encoded: &[u8]) -> Result<Vec<u8>> {
        let mut rewriter = self.clone();
        match rewriter.current_packet() {
            Ok(Some(packet)) => embed_xmp(encoded, &packet),
            Ok(None) => Ok(encoded.to_vec()),
            Err(e) if !self.is_dirty() => {
                log::warn!("Carrying unreadable XMP chunk unchanged: {e}");
                let original = parse_png(&self.original)?;
                let mut png = parse_png(encoded)?;
                let chunks = png.chunks_mut();
                chunks.retain(|c| !is_xmp_chunk(c));
                let at = chunks.len().min(1);
                chunks.splice(
                    at..at,
                    original.chunks().iter().filter(|c| is_xmp_chunk(c)).cloned(),
                );
                Ok(png.encoder().bytes().to_vec())
            }
            Err(e) => Err(e),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let resolved = match &self.resolved {
            Some(r) if r.metadata.is_dirty() => r,
            _ => return Ok(self.original.clone()),
        };

        let skipped: Vec<&str> = resolved
            .metadata
            .changed_fields()
            .filter(|f| f.xmp_property().is_none())
            .map(Field::name)
            .collect();
        if !skipped.is_empty() {
            log::debug!("PNG has no IPTC block; not writing {}", skipped.join(", "));
        }

        let (_, xmp) = metadata::split(&resolved.metadata, &IptcStore::new(), &resolved.xmp)?;
        let mut png = parse_png(&self.original)?;
        replace_xmp_chunk(&mut png, xmp.packet());
        Ok(png.encoder().bytes().to_vec())
    }

    /// Write the image to `sink`, assembling the whole output first.
    pub fn write<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        let dirty = self.is_dirty();
        let bytes = self.to_bytes()?;
        sink.write_all(&bytes)?;
        if dirty {
            *self = Self::load(&bytes)?;
        }
        Ok(())
    }
}
