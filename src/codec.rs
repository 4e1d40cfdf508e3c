//! Image codec collaborator.
//!
//! Metadata rewriting never touches pixels. Raster mutations do, and they go through an
//! [`ImageCodec`] so callers can swap the pixel pipeline. [`StandardCodec`] is backed by
//! the `image` crate.

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::error::{ParameterError, ParameterErrorKind};
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Container formats this crate recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl Format {
    /// Detect the format from magic bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        match image::guess_format(data).ok()? {
            ImageFormat::Jpeg => Some(Format::Jpeg),
            ImageFormat::Png => Some(Format::Png),
            ImageFormat::Gif => Some(Format::Gif),
            ImageFormat::Bmp => Some(Format::Bmp),
            _ => None,
        }
    }

    /// Detect the format from a file extension (case-insensitive).
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "jpe" | "jfif" => Some(Format::Jpeg),
            "png" => Some(Format::Png),
            "gif" => Some(Format::Gif),
            "bmp" | "dib" => Some(Format::Bmp),
            _ => None,
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Format::Jpeg => ImageFormat::Jpeg,
            Format::Png => ImageFormat::Png,
            Format::Gif => ImageFormat::Gif,
            Format::Bmp => ImageFormat::Bmp,
        }
    }

    /// Whether the container has somewhere to store IPTC or XMP.
    pub fn has_metadata(self) -> bool {
        matches!(self, Format::Jpeg | Format::Png)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Jpeg => "JPEG",
            Format::Png => "PNG",
            Format::Gif => "GIF",
            Format::Bmp => "BMP",
        };
        f.write_str(name)
    }
}

/// Resampling filter used when scaling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// A pixel-level change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RasterOp {
    /// Multiply both dimensions by the ratio. Each side stays at least one pixel.
    Scale(f64),
    /// Rotate clockwise by quarter turns; negative values turn counter-clockwise.
    Rotate(i32),
    FlipHorizontal,
    FlipVertical,
}

/// Decode, transform and encode pixels.
pub trait ImageCodec {
    fn decode(&self, data: &[u8], format: Format) -> Result<DynamicImage>;

    fn encode(&self, image: &DynamicImage, format: Format) -> Result<Vec<u8>>;

    fn apply(&self, image: DynamicImage, op: RasterOp) -> Result<DynamicImage>;
}

/// [`ImageCodec`] over the `image` crate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardCodec {
    pub jpeg_quality: u8,
    pub filter: ResizeFilter,
}

impl Default for StandardCodec {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            filter: ResizeFilter::default(),
        }
    }
}

impl ImageCodec for StandardCodec {
    fn decode(&self, data: &[u8], format: Format) -> Result<DynamicImage> {
        Ok(image::load_from_memory_with_format(
            data,
            format.image_format(),
        )?)
    }

    fn encode(&self, image: &DynamicImage, format: Format) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        match format {
            Format::Jpeg => {
                let quality = self.jpeg_quality.clamp(1, 100);
                let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
                encoder.encode_image(&image.to_rgb8())?;
            }
            other => image.write_to(&mut out, other.image_format())?,
        }
        Ok(out.into_inner())
    }

    fn apply(&self, image: DynamicImage, op: RasterOp) -> Result<DynamicImage> {
        let out = match op {
            RasterOp::Scale(ratio) => {
                if !ratio.is_finite() || ratio <= 0.0 {
                    return Err(invalid_parameter(format!("invalid scale ratio {ratio}")));
                }
                let (width, height) = scaled_dimensions(image.width(), image.height(), ratio);
                image.resize_exact(width, height, self.filter.into())
            }
            RasterOp::Rotate(quarters) => match quarters.rem_euclid(4) {
                0 => image,
                1 => image.rotate90(),
                2 => image.rotate180(),
                _ => image.rotate270(),
            },
            RasterOp::FlipHorizontal => image.fliph(),
            RasterOp::FlipVertical => image.flipv(),
        };
        Ok(out)
    }
}

fn scaled_dimensions(width: u32, height: u32, ratio: f64) -> (u32, u32) {
    let scale = |side: u32| (f64::from(side) * ratio).round().clamp(1.0, f64::from(u32::MAX)) as u32;
    (scale(width), scale(height))
}

fn invalid_parameter(message: String) -> crate::error::Error {
    ImageError::Parameter(ParameterError::from_kind(ParameterErrorKind::Generic(message))).into()
}
