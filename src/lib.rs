//! # imgmeta
//!
//! Lossless rewriting of the descriptive metadata of JPEG images: the IPTC block in the
//! Photoshop APP13 segment and the XMP packet in APP1. PNG images get the XMP part
//! through an `iTXt` chunk. Pixels are never re-encoded for a metadata edit; every
//! segment the rewriter does not own is copied byte for byte.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgmeta::image::Image;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut image = Image::open(Path::new("photo.jpg"))?;
//!
//!     // Merged IPTC + XMP view, decoded on first use
//!     println!("Title: {:?}", image.metadata()?.title());
//!
//!     let meta = image.metadata_mut()?;
//!     meta.set_title("Harbour at dusk");
//!     meta.add_keyword("sea");
//!     meta.set_copyright("(c) 2024 A. Photographer");
//!
//!     image.save(Path::new("photo.jpg"))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Batch Usage
//!
//! ```rust,no_run
//! use imgmeta::config::Config;
//! use imgmeta::metadata::Field;
//! use imgmeta::pipeline::{collect_images, process_image, MetadataEdit};
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let mut edit = MetadataEdit::default();
//!     edit.fields.insert(Field::City, Some("Bren".into()));
//!
//!     for path in collect_images(&[PathBuf::from("./photos")]) {
//!         let result = process_image(&path, &edit, &config);
//!         if let Some(ref err) = result.error {
//!             eprintln!("Error processing {}: {err}", path.display());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Metadata |
//! |--------|----------|
//! | JPEG (`.jpg`, `.jpeg`) | IPTC (APP13) + XMP (APP1); EXIF read-only |
//! | PNG (`.png`) | XMP in `iTXt` chunk |
//! | GIF, BMP | none (pixels only) |
//!
//! ## Modules
//!
//! - [`jpeg`] — marker stream model
//! - [`iptc`] — IPTC store and Photoshop/IIM codec
//! - [`xmp`] — XMP document, reader and writer
//! - [`metadata`] — merged [`ExtendedMetadata`](metadata::ExtendedMetadata) and the merge engine
//! - [`rewriter`] — JPEG metadata rewriter
//! - [`png`] — PNG XMP path
//! - [`exif`] — read-only EXIF (camera, orientation, GPS)
//! - [`codec`] — pixel codec used by raster mutations
//! - [`image`](mod@image) — one image, any supported format, and format conversion
//! - [`info`] — format details, pixel layout, resolution, frame count
//! - [`config`], [`pipeline`] — configuration and batch processing

pub mod codec;
pub mod config;
pub mod error;
pub mod exif;
pub mod image;
pub mod info;
pub mod iptc;
pub mod jpeg;
pub mod metadata;
pub mod pipeline;
pub mod png;
pub mod rewriter;
pub mod xmp;

#[cfg(test)]
mod test_helpers;

pub use error::{Error, Result};
