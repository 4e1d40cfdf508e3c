//! One image instance: format dispatch, cached metadata and EXIF, raster mutation.

use std::io::{Cursor, Write};
use std::path::Path;

use crate::codec::{Format, ImageCodec, RasterOp, StandardCodec};
use crate::error::{Error, Result};
use crate::exif::{self, ExifData, Location, Orientation};
use crate::info::{self, ImageInfo};
use crate::iptc::dataset;
use crate::jpeg::{AppKind, JpegStream, Segment};
use crate::metadata::{ExtendedMetadata, Field};
use crate::png::PngRewriter;
use crate::rewriter::{JpegRewriter, Phase};

#[derive(Debug, Clone)]
enum Container {
    Jpeg(JpegRewriter),
    Png(PngRewriter),
    /// No metadata carrier. Edits are kept in memory but cannot be written.
    Plain(ExtendedMetadata),
}

impl Container {
    fn load(format: Format, data: &[u8]) -> Result<Self> {
        Ok(match format {
            Format::Jpeg => Container::Jpeg(JpegRewriter::load(data)?),
            Format::Png => Container::Png(PngRewriter::load(data)?),
            Format::Gif | Format::Bmp => Container::Plain(ExtendedMetadata::new()),
        })
    }
}

/// An encoded image with lazily decoded metadata.
///
/// Metadata edits go through [`Image::metadata_mut`] and are only encoded when the image
/// is written. Raster mutations ([`Image::apply`]) decode and re-encode the pixels
/// through the image's [`ImageCodec`], carry the IPTC and XMP over (pending edits
/// included) and drop EXIF.
#[derive(Debug, Clone)]
pub struct Image<C: ImageCodec = StandardCodec> {
    format: Format,
    data: Vec<u8>,
    container: Container,
    exif: Option<ExifData>,
    codec: C,
}

impl Image<StandardCodec> {
    pub fn load(data: Vec<u8>) -> Result<Self> {
        Self::with_codec(data, StandardCodec::default())
    }

    /// Read a file. The format comes from the magic bytes, falling back to the extension.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_codec(path, StandardCodec::default())
    }
}

impl<C: ImageCodec> Image<C> {
    pub fn with_codec(data: Vec<u8>, codec: C) -> Result<Self> {
        let format = Format::detect(&data)
            .ok_or_else(|| Error::container("unrecognised image format"))?;
        Self::with_format(data, format, codec)
    }

    pub fn open_with_codec(path: &Path, codec: C) -> Result<Self> {
        let data = std::fs::read(path)?;
        let format = Format::detect(&data)
            .or_else(|| Format::from_extension(path))
            .ok_or_else(|| Error::container(format!("unrecognised image format: {}", path.display())))?;
        Self::with_format(data, format, codec)
    }

    fn with_format(data: Vec<u8>, format: Format, codec: C) -> Result<Self> {
        let container = Container::load(format, &data)?;
        log::debug!("Loaded {format} image ({} bytes)", data.len());
        Ok(Self {
            format,
            data,
            container,
            exif: None,
            codec,
        })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The encoded bytes as last loaded or written. Pending edits are not included.
    pub fn original_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn phase(&self) -> Phase {
        match &self.container {
            Container::Jpeg(r) => r.phase(),
            Container::Png(r) => r.phase(),
            Container::Plain(m) if m.is_dirty() => Phase::Mutated,
            Container::Plain(_) => Phase::Resolved,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.phase() == Phase::Mutated
    }

    pub fn metadata(&mut self) -> Result<&ExtendedMetadata> {
        match &mut self.container {
            Container::Jpeg(r) => r.metadata(),
            Container::Png(r) => r.metadata(),
            Container::Plain(m) => Ok(&*m),
        }
    }

    pub fn metadata_mut(&mut self) -> Result<&mut ExtendedMetadata> {
        match &mut self.container {
            Container::Jpeg(r) => r.metadata_mut(),
            Container::Png(r) => r.metadata_mut(),
            Container::Plain(m) => Ok(m),
        }
    }

    /// EXIF of the current pixels, read on first use.
    pub fn exif(&mut self) -> &ExifData {
        let data = &self.data;
        self.exif.get_or_insert_with(|| exif::read_exif(data))
    }

    pub fn location(&mut self) -> Option<Location> {
        self.exif().location
    }

    pub fn dimensions(&self) -> Result<(u32, u32)> {
        let reader = image::ImageReader::with_format(Cursor::new(&self.data), self.format.image_format());
        Ok(reader.into_dimensions()?)
    }

    /// Format details, pixel layout, resolution and frame count of the current pixels.
    pub fn info(&self) -> Result<ImageInfo> {
        info::inspect(&self.data, self.format)
    }

    /// Orientation from the EXIF orientation code, else the IPTC ImageOrientation
    /// dataset, else the pixel aspect ratio.
    pub fn orientation(&mut self) -> Result<Orientation> {
        if let Some(orientation) = self.exif().orientation.and_then(Orientation::from_exif) {
            return Ok(orientation);
        }
        if let Container::Jpeg(rewriter) = &mut self.container {
            match rewriter.schemas() {
                Ok((iptc, _)) => {
                    if let Some(orientation) = iptc
                        .get(dataset::IMAGE_ORIENTATION)
                        .and_then(Orientation::from_iptc)
                    {
                        return Ok(orientation);
                    }
                }
                Err(e) => log::debug!("No IPTC orientation: {e}"),
            }
        }
        let (width, height) = self.dimensions()?;
        Ok(Orientation::from_dimensions(width, height))
    }

    /// The bytes [`Image::write`] would emit.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match &self.container {
            Container::Jpeg(r) => r.to_bytes(),
            Container::Png(r) => r.to_bytes(),
            Container::Plain(m) if m.is_dirty() => Err(Error::UnsupportedFormat(self.format)),
            Container::Plain(_) => Ok(self.data.clone()),
        }
    }

    /// Write the image. Nothing reaches `sink` if encoding fails.
    pub fn write<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        let dirty = self.is_dirty();
        let bytes = self.to_bytes()?;
        sink.write_all(&bytes)?;
        if dirty {
            self.replace_data(bytes)?;
        }
        Ok(())
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes)?;
        if self.is_dirty() {
            self.replace_data(bytes)?;
        }
        Ok(())
    }

    /// Change the pixels. Pending metadata edits are flushed into the new stream; the
    /// metadata cache goes back to unresolved and EXIF is dropped.
    pub fn apply(&mut self, op: RasterOp) -> Result<()> {
        let raster = self.codec.decode(&self.data, self.format)?;
        let raster = self.codec.apply(raster, op)?;
        let encoded = self.codec.encode(&raster, self.format)?;

        let bytes = match &self.container {
            Container::Jpeg(rewriter) => carry_jpeg_metadata(&encoded, rewriter.metadata_segments()?)?,
            Container::Png(rewriter) => rewriter.carry_xmp(&encoded)?,
            Container::Plain(_) => encoded,
        };
        log::debug!("Applied {op:?} to {} image", self.format);

        if let Container::Plain(_) = self.container {
            // In-memory edits survive; there is nothing to reload
            self.data = bytes;
            self.exif = None;
            return Ok(());
        }
        self.replace_data(bytes)
    }

    /// Encode the pixels as `target`. The merged metadata, pending edits included, is
    /// written into the new container when it has a carrier; EXIF is dropped. This image
    /// is left as it was.
    pub fn to_format(&mut self, target: Format) -> Result<Vec<u8>> {
        if target == self.format {
            return self.to_bytes();
        }
        let raster = self.codec.decode(&self.data, self.format)?;
        let encoded = self.codec.encode(&raster, target)?;
        let mut converted = Container::load(target, &encoded)?;

        let source = match self.metadata() {
            Ok(meta) => meta.clone(),
            Err(e) => {
                log::warn!("Converting to {target} without metadata: {e}");
                return Ok(encoded);
            }
        };
        let meta = match &mut converted {
            Container::Jpeg(r) => r.metadata_mut()?,
            Container::Png(r) => r.metadata_mut()?,
            Container::Plain(_) => return Ok(encoded),
        };
        copy_metadata(&source, meta);
        log::debug!("Converted {} image to {target}", self.format);

        match &converted {
            Container::Jpeg(r) => r.to_bytes(),
            Container::Png(r) => r.to_bytes(),
            Container::Plain(_) => Ok(encoded),
        }
    }

    pub fn scale(&mut self, ratio: f64) -> Result<()> {
        self.apply(RasterOp::Scale(ratio))
    }

    pub fn rotate(&mut self, quarter_turns: i32) -> Result<()> {
        self.apply(RasterOp::Rotate(quarter_turns))
    }

    pub fn flip(&mut self) -> Result<()> {
        self.apply(RasterOp::FlipHorizontal)
    }

    fn replace_data(&mut self, data: Vec<u8>) -> Result<()> {
        self.container = Container::load(self.format, &data)?;
        self.data = data;
        self.exif = None;
        Ok(())
    }
}

fn copy_metadata(source: &ExtendedMetadata, target: &mut ExtendedMetadata) {
    for field in Field::ALL {
        if let Some(value) = source.get(field) {
            target.set(field, value);
        }
    }
    if !source.keywords().is_empty() {
        target.set_keywords(source.keywords());
    }
    target.set_marked(source.is_marked());
}

/// Put `carried` IPTC and XMP segments into a freshly encoded JPEG, replacing any the
/// encoder produced.
fn carry_jpeg_metadata(encoded: &[u8], carried: Vec<Segment>) -> Result<Vec<u8>> {
    let stream = JpegStream::parse(encoded)?
        .without(AppKind::Exif)
        .without(AppKind::Xmp)
        .without(AppKind::PhotoshopIptc);
    Ok(stream.insert_after_leading_app_run(carried).to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::ColorModel;
    use crate::jpeg::{APP1, APP13};
    use crate::test_helpers::{
        encoded_image, exif_payload, iim_dataset, photoshop_payload, resource_block,
    };
    use image::ImageFormat;

    /// A real 16x8 JPEG with `extra` spliced in after the encoder's own APPn run.
    fn jpeg_with(extra: Vec<Segment>) -> Vec<u8> {
        let base = encoded_image(ImageFormat::Jpeg, 16, 8);
        JpegStream::parse(&base)
            .unwrap()
            .insert_after_leading_app_run(extra)
            .to_bytes()
    }

    fn iptc_segment(iim: &[u8]) -> Segment {
        let payload =
            photoshop_payload(&[resource_block(crate::iptc::IPTC_RESOURCE_ID, b"", iim)]);
        Segment::app(APP13, payload).unwrap()
    }

    // ── dispatch ──

    #[test]
    fn dispatches_on_magic_bytes() {
        let img = Image::load(encoded_image(ImageFormat::Png, 2, 2)).unwrap();
        assert_eq!(img.format(), Format::Png);
        let img = Image::load(encoded_image(ImageFormat::Jpeg, 2, 2)).unwrap();
        assert_eq!(img.format(), Format::Jpeg);
        assert!(matches!(
            Image::load(b"plain text".to_vec()).unwrap_err(),
            Error::Container(_)
        ));
    }

    #[test]
    fn gif_has_empty_metadata_and_refuses_dirty_writes() {
        let mut img = Image::load(encoded_image(ImageFormat::Gif, 3, 3)).unwrap();
        assert!(img.metadata().unwrap().is_empty());

        let mut out = Vec::new();
        img.write(&mut out).unwrap();
        assert_eq!(out, img.original_bytes());

        img.metadata_mut().unwrap().set_title("t");
        let mut out = Vec::new();
        assert!(matches!(
            img.write(&mut out),
            Err(Error::UnsupportedFormat(Format::Gif))
        ));
        assert!(out.is_empty());
    }

    // ── orientation ──

    #[test]
    fn orientation_falls_back_to_iptc_then_dimensions() {
        let mut img = Image::load(jpeg_with(vec![])).unwrap();
        assert_eq!(img.orientation().unwrap(), Orientation::Landscape);

        let mut img = Image::load(jpeg_with(vec![iptc_segment(&iim_dataset(
            2,
            dataset::IMAGE_ORIENTATION,
            b"P",
        ))]))
        .unwrap();
        assert_eq!(img.orientation().unwrap(), Orientation::Portrait);
    }

    #[test]
    fn exif_orientation_wins_over_iptc_and_pixels() {
        // 16x8 pixels would read as landscape
        let mut img = Image::load(jpeg_with(vec![
            Segment::app(APP1, exif_payload(6)).unwrap(),
        ]))
        .unwrap();
        assert_eq!(img.orientation().unwrap(), Orientation::Portrait);
        let location = img.location().unwrap();
        assert_eq!(location.latitude_ref, 'N');

        let mut img = Image::load(jpeg_with(vec![
            Segment::app(APP1, exif_payload(6)).unwrap(),
            iptc_segment(&iim_dataset(2, dataset::IMAGE_ORIENTATION, b"L")),
        ]))
        .unwrap();
        assert_eq!(img.orientation().unwrap(), Orientation::Portrait);

        // Out-of-range code falls through to IPTC
        let mut img = Image::load(jpeg_with(vec![
            Segment::app(APP1, exif_payload(0)).unwrap(),
            iptc_segment(&iim_dataset(2, dataset::IMAGE_ORIENTATION, b"S")),
        ]))
        .unwrap();
        assert_eq!(img.orientation().unwrap(), Orientation::Square);
    }

    // ── info and conversion ──

    #[test]
    fn info_describes_current_pixels() {
        let mut img = Image::load(jpeg_with(vec![])).unwrap();
        let info = img.info().unwrap();
        assert_eq!((info.width, info.height), (16, 8));
        assert_eq!(info.color_model, ColorModel::Rgb);

        img.rotate(1).unwrap();
        let info = img.info().unwrap();
        assert_eq!((info.width, info.height), (8, 16));
    }

    #[test]
    fn converting_jpeg_to_png_carries_xmp_fields() {
        let mut img = Image::load(jpeg_with(vec![iptc_segment(&iim_dataset(
            2,
            dataset::CITY,
            b"Bren",
        ))]))
        .unwrap();
        img.metadata_mut().unwrap().set_title("Pending");
        img.metadata_mut().unwrap().set_contact("bren@example.com");
        let png = img.to_format(Format::Png).unwrap();

        let mut converted = Image::load(png).unwrap();
        assert_eq!(converted.format(), Format::Png);
        assert_eq!(converted.dimensions().unwrap(), (16, 8));
        let meta = converted.metadata().unwrap();
        assert_eq!(meta.city(), Some("Bren"));
        assert_eq!(meta.title(), Some("Pending"));
        // PNG has no IPTC carrier
        assert_eq!(meta.contact(), None);
        // The source keeps its pending edit
        assert!(img.is_dirty());
    }

    #[test]
    fn converting_png_to_jpeg_writes_both_schemas() {
        let mut img = Image::load(encoded_image(ImageFormat::Png, 4, 4)).unwrap();
        img.metadata_mut().unwrap().set_keywords(["a", "b"]);
        let jpeg = img.to_format(Format::Jpeg).unwrap();

        let stream = JpegStream::parse(&jpeg).unwrap();
        assert!(stream.contains(AppKind::PhotoshopIptc));
        assert!(stream.contains(AppKind::Xmp));
        let mut converted = Image::load(jpeg).unwrap();
        assert_eq!(converted.metadata().unwrap().keywords(), ["a", "b"]);

        // Same format: the regular write output
        assert_eq!(img.to_format(Format::Png).unwrap(), img.to_bytes().unwrap());
    }

    #[test]
    fn converting_to_gif_drops_metadata() {
        let mut img = Image::load(jpeg_with(vec![])).unwrap();
        img.metadata_mut().unwrap().set_title("t");
        let gif = img.to_format(Format::Gif).unwrap();
        assert_eq!(Format::detect(&gif), Some(Format::Gif));
    }

    // ── raster mutation ──

    #[test]
    fn scaling_carries_metadata_and_drops_exif() {
        let jpeg = jpeg_with(vec![
            Segment::app(APP1, b"Exif\0\0MM\0*\0\0\0\x08\0\0".to_vec()).unwrap(),
            iptc_segment(&iim_dataset(2, dataset::CITY, b"Bren")),
        ]);
        let mut img = Image::load(jpeg).unwrap();
        img.metadata_mut().unwrap().set_title("Pending");
        img.scale(0.5).unwrap();

        assert_eq!(img.phase(), Phase::Loaded);
        assert_eq!(img.dimensions().unwrap(), (8, 4));
        let stream = JpegStream::parse(img.original_bytes()).unwrap();
        assert!(!stream.contains(AppKind::Exif));
        assert!(stream.contains(AppKind::PhotoshopIptc));

        let meta = img.metadata().unwrap();
        assert_eq!(meta.city(), Some("Bren"));
        assert_eq!(meta.get(Field::Title), Some("Pending"));
        assert!(!img.is_dirty());
    }

    #[test]
    fn rotating_png_keeps_its_xmp() {
        let mut img = Image::load(encoded_image(ImageFormat::Png, 6, 2)).unwrap();
        img.metadata_mut().unwrap().set_keywords(["a", "b"]);
        img.rotate(1).unwrap();

        assert_eq!(img.dimensions().unwrap(), (2, 6));
        assert_eq!(img.metadata().unwrap().keywords(), ["a", "b"]);
        assert_eq!(img.orientation().unwrap(), Orientation::Portrait);
    }

    #[test]
    fn unreadable_xmp_does_not_block_raster_ops() {
        let png =
            crate::png::embed_xmp(&encoded_image(ImageFormat::Png, 6, 2), "<a><b></a>").unwrap();
        let mut img = Image::load(png).unwrap();
        img.rotate(1).unwrap();
        assert_eq!(img.dimensions().unwrap(), (2, 6));
        assert!(img.metadata().is_err());

        let jpeg = jpeg_with(vec![
            Segment::app(APP1, b"http://ns.adobe.com/xap/1.0/\0<a><b></a>".to_vec()).unwrap(),
        ]);
        let mut img = Image::load(jpeg).unwrap();
        assert_eq!(img.orientation().unwrap(), Orientation::Landscape);
        img.scale(0.5).unwrap();
        assert_eq!(img.dimensions().unwrap(), (8, 4));
    }

    #[test]
    fn write_reloads_the_written_stream() {
        let mut img = Image::load(jpeg_with(vec![])).unwrap();
        img.metadata_mut().unwrap().set_author("Ann");
        let mut out = Vec::new();
        img.write(&mut out).unwrap();

        assert_eq!(img.original_bytes(), out.as_slice());
        assert_eq!(img.phase(), Phase::Loaded);
        assert_eq!(img.metadata().unwrap().author(), Some("Ann"));
    }
}
