//! Technical description of an encoded image: geometry, pixel layout, resolution and
//! frame count.
//!
//! Everything is read from container headers (JPEG frame header and JFIF segment, PNG
//! `IHDR`/`pHYs`/`tRNS`/`acTL`, BMP info header). GIF is the exception: transparency and
//! frame count need the frames, which are decoded with `image`.

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageDecoder, ImageReader};
use img_parts::png::Png;
use img_parts::Bytes;
use serde::Serialize;

use crate::codec::Format;
use crate::error::{Error, Result};
use crate::jpeg::{JpegStream, Segment, APP0};

/// Colour model of the stored pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorModel {
    BlackWhite,
    Grayscale,
    Rgb,
    Cmyk,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInfo {
    pub format: Format,
    /// Format plus variant, e.g. `JPEG (progressive)` or `PNG (interlaced)`.
    pub format_details: String,
    pub width: u32,
    pub height: u32,
    pub color_model: ColorModel,
    pub bits_per_pixel: u16,
    /// Horizontal and vertical resolution in dots per inch, when the file records one.
    pub dpi: Option<(u32, u32)>,
    pub progressive: bool,
    pub transparent: bool,
    pub uses_palette: bool,
    pub number_of_images: usize,
}

/// Describe an encoded image of a known format.
pub fn inspect(data: &[u8], format: Format) -> Result<ImageInfo> {
    let info = match format {
        Format::Jpeg => inspect_jpeg(data)?,
        Format::Png => inspect_png(data)?,
        Format::Gif => inspect_gif(data)?,
        Format::Bmp => inspect_bmp(data)?,
    };
    log::debug!(
        "{}: {}x{}, {} bpp",
        info.format_details,
        info.width,
        info.height,
        info.bits_per_pixel
    );
    Ok(info)
}

fn be_u16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

fn le_u16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

fn le_i32(bytes: &[u8], at: usize) -> Option<i32> {
    Some(i32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

fn per_metre_to_dpi(value: f64) -> u32 {
    (value * 0.0254).round() as u32
}

// ── JPEG ──

/// Start-of-frame markers: C0 to CF without DHT (C4), JPG (C8) and DAC (CC).
fn is_frame_header(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

fn inspect_jpeg(data: &[u8]) -> Result<ImageInfo> {
    let stream = JpegStream::parse(data)?;
    let (marker, frame) = stream
        .segments()
        .iter()
        .find_map(|s| match s {
            Segment::Opaque { marker, payload } if is_frame_header(*marker) => {
                Some((*marker, payload.as_slice()))
            }
            _ => None,
        })
        .ok_or_else(|| Error::container("JPEG has no frame header"))?;

    let truncated = || Error::container("truncated JPEG frame header");
    let precision = *frame.first().ok_or_else(truncated)?;
    let height = be_u16(frame, 1).ok_or_else(truncated)?;
    let width = be_u16(frame, 3).ok_or_else(truncated)?;
    let components = *frame.get(5).ok_or_else(truncated)?;
    let progressive = matches!(marker, 0xC2 | 0xC6 | 0xCA | 0xCE);

    let color_model = match components {
        1 => ColorModel::Grayscale,
        3 => ColorModel::Rgb,
        4 => ColorModel::Cmyk,
        _ => ColorModel::Other,
    };

    Ok(ImageInfo {
        format: Format::Jpeg,
        format_details: format!(
            "JPEG ({})",
            if progressive { "progressive" } else { "baseline" }
        ),
        width: u32::from(width),
        height: u32::from(height),
        color_model,
        bits_per_pixel: u16::from(precision) * u16::from(components),
        dpi: jfif_dpi(&stream),
        progressive,
        transparent: false,
        uses_palette: false,
        number_of_images: 1,
    })
}

/// Density of the JFIF APP0 segment. Unit 1 is dots per inch, 2 dots per centimetre.
fn jfif_dpi(stream: &JpegStream) -> Option<(u32, u32)> {
    let payload = stream.segments().iter().find_map(|s| match s {
        Segment::App { marker: APP0, payload, .. } if payload.starts_with(b"JFIF\0") => {
            Some(payload.as_slice())
        }
        _ => None,
    })?;
    let units = *payload.get(7)?;
    let x = u32::from(be_u16(payload, 8)?);
    let y = u32::from(be_u16(payload, 10)?);
    match units {
        1 => Some((x, y)),
        2 => Some((
            (f64::from(x) * 2.54).round() as u32,
            (f64::from(y) * 2.54).round() as u32,
        )),
        _ => None,
    }
}

// ── PNG ──

fn inspect_png(data: &[u8]) -> Result<ImageInfo> {
    let png = Png::from_bytes(Bytes::copy_from_slice(data))
        .map_err(|e| Error::container(format!("invalid PNG: {e}")))?;
    let chunk = |kind: &[u8; 4]| png.chunk_by_type(*kind).map(|c| c.contents().clone());

    let ihdr = chunk(b"IHDR").ok_or_else(|| Error::container("PNG has no IHDR chunk"))?;
    let truncated = || Error::container("truncated PNG IHDR chunk");
    let width = be_u32(&ihdr, 0).ok_or_else(truncated)?;
    let height = be_u32(&ihdr, 4).ok_or_else(truncated)?;
    let bit_depth = *ihdr.get(8).ok_or_else(truncated)?;
    let color_type = *ihdr.get(9).ok_or_else(truncated)?;
    let interlaced = ihdr.get(12) == Some(&1);

    let (channels, color_model) = match color_type {
        0 if bit_depth == 1 => (1, ColorModel::BlackWhite),
        0 => (1, ColorModel::Grayscale),
        2 => (3, ColorModel::Rgb),
        3 => (1, ColorModel::Rgb),
        4 => (2, ColorModel::Grayscale),
        6 => (4, ColorModel::Rgb),
        _ => (1, ColorModel::Other),
    };

    // pHYs: pixels per unit on both axes, unit 1 is the metre
    let dpi = chunk(b"pHYs").and_then(|phys| {
        let x = be_u32(&phys, 0)?;
        let y = be_u32(&phys, 4)?;
        (phys.get(8) == Some(&1))
            .then(|| (per_metre_to_dpi(f64::from(x)), per_metre_to_dpi(f64::from(y))))
    });
    let frames = chunk(b"acTL")
        .and_then(|actl| be_u32(&actl, 0))
        .map_or(1, |n| n as usize);

    Ok(ImageInfo {
        format: Format::Png,
        format_details: format!(
            "PNG ({})",
            if interlaced { "interlaced" } else { "non-interlaced" }
        ),
        width,
        height,
        color_model,
        bits_per_pixel: u16::from(bit_depth) * channels,
        dpi,
        progressive: interlaced,
        transparent: matches!(color_type, 4 | 6) || chunk(b"tRNS").is_some(),
        uses_palette: color_type == 3,
        number_of_images: frames,
    })
}

// ── GIF ──

fn inspect_gif(data: &[u8]) -> Result<ImageInfo> {
    let decoder = GifDecoder::new(Cursor::new(data))?;
    let (width, height) = decoder.dimensions();
    let frames = decoder.into_frames().collect_frames()?;
    let transparent = frames
        .iter()
        .any(|frame| frame.buffer().pixels().any(|p| p.0[3] < u8::MAX));
    // Logical screen descriptor: bits 0-2 of the packed byte give the palette depth
    let bits_per_pixel = data.get(10).map_or(8, |packed| u16::from(packed & 0x07) + 1);

    let version = data
        .get(3..6)
        .map_or_else(String::new, |v| String::from_utf8_lossy(v).into_owned());

    Ok(ImageInfo {
        format: Format::Gif,
        format_details: format!("GIF ({version})"),
        width,
        height,
        color_model: ColorModel::Rgb,
        bits_per_pixel,
        dpi: None,
        progressive: false,
        transparent,
        uses_palette: true,
        number_of_images: frames.len(),
    })
}

// ── BMP ──

fn inspect_bmp(data: &[u8]) -> Result<ImageInfo> {
    let decoder = ImageReader::with_format(Cursor::new(data), Format::Bmp.image_format())
        .into_decoder()?;
    let (width, height) = decoder.dimensions();
    let color = decoder.color_type();

    // BITMAPINFOHEADER after the 14 byte file header
    let bits_per_pixel = le_u16(data, 28).unwrap_or_else(|| color.bits_per_pixel());
    let header_size = le_i32(data, 14).unwrap_or(0);
    let dpi = if header_size >= 40 {
        match (le_i32(data, 38), le_i32(data, 42)) {
            (Some(x), Some(y)) if x > 0 && y > 0 => {
                Some((per_metre_to_dpi(f64::from(x)), per_metre_to_dpi(f64::from(y))))
            }
            _ => None,
        }
    } else {
        None
    };

    Ok(ImageInfo {
        format: Format::Bmp,
        format_details: format!("BMP ({bits_per_pixel} bit)"),
        width,
        height,
        color_model: match bits_per_pixel {
            1 => ColorModel::BlackWhite,
            _ if color.channel_count() <= 2 => ColorModel::Grayscale,
            _ => ColorModel::Rgb,
        },
        bits_per_pixel,
        dpi,
        progressive: false,
        transparent: color.has_alpha(),
        uses_palette: bits_per_pixel <= 8,
        number_of_images: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{encoded_image, minimal_jpeg};
    use image::{ImageFormat, Rgba, RgbaImage};

    // ── JPEG ──

    #[test]
    fn jpeg_frame_header_and_jfif_density() {
        let info = inspect(&minimal_jpeg(&[]), Format::Jpeg).unwrap();
        assert_eq!((info.width, info.height), (1, 1));
        assert_eq!(info.color_model, ColorModel::Grayscale);
        assert_eq!(info.bits_per_pixel, 8);
        assert!(!info.progressive);
        assert_eq!(info.format_details, "JPEG (baseline)");
        // minimal_jpeg declares no density unit
        assert_eq!(info.dpi, None);
    }

    #[test]
    fn encoded_jpeg_reports_rgb() {
        let info = inspect(&encoded_image(ImageFormat::Jpeg, 12, 5), Format::Jpeg).unwrap();
        assert_eq!((info.width, info.height), (12, 5));
        assert_eq!(info.color_model, ColorModel::Rgb);
        assert_eq!(info.bits_per_pixel, 24);
        assert_eq!(info.number_of_images, 1);
    }

    #[test]
    fn jfif_density_in_dots_per_centimetre() {
        let mut jpeg = minimal_jpeg(&[]);
        // APP0 payload starts at offset 6: JFIF\0, version, units, density
        jpeg[6 + 7] = 2;
        jpeg[6 + 8..6 + 12].copy_from_slice(&[0, 118, 0, 118]);
        let info = inspect(&jpeg, Format::Jpeg).unwrap();
        assert_eq!(info.dpi, Some((300, 300)));
    }

    // ── PNG ──

    #[test]
    fn png_header_fields() {
        let info = inspect(&encoded_image(ImageFormat::Png, 4, 3), Format::Png).unwrap();
        assert_eq!((info.width, info.height), (4, 3));
        assert_eq!(info.color_model, ColorModel::Rgb);
        assert_eq!(info.bits_per_pixel, 24);
        assert!(!info.transparent);
        assert!(!info.uses_palette);
        assert_eq!(info.number_of_images, 1);
    }

    #[test]
    fn png_with_alpha_is_transparent() {
        let raster = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 128]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(raster)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        let info = inspect(out.get_ref(), Format::Png).unwrap();
        assert!(info.transparent);
        assert_eq!(info.bits_per_pixel, 32);
    }

    // ── GIF / BMP ──

    #[test]
    fn gif_uses_a_palette() {
        let info = inspect(&encoded_image(ImageFormat::Gif, 3, 2), Format::Gif).unwrap();
        assert_eq!((info.width, info.height), (3, 2));
        assert!(info.uses_palette);
        assert_eq!(info.number_of_images, 1);
    }

    #[test]
    fn bmp_reads_bit_count() {
        let info = inspect(&encoded_image(ImageFormat::Bmp, 5, 4), Format::Bmp).unwrap();
        assert_eq!((info.width, info.height), (5, 4));
        assert_eq!(info.bits_per_pixel, 24);
        assert!(!info.uses_palette);
    }

    #[test]
    fn rejects_jpeg_without_frame_header() {
        assert!(matches!(
            inspect(&[0xFF, 0xD8, 0xFF, 0xD9], Format::Jpeg).unwrap_err(),
            Error::Container(_)
        ));
    }
}
