use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::codec::{Format, RasterOp};
use crate::config::Config;
use crate::exif::ExifData;
use crate::info::ImageInfo;
use crate::image::Image;
use crate::metadata::{ExtendedMetadata, Field};

/// The metadata strategy for a given image file, determined by its format.
///
/// - **IptcXmp** (JPEG) stores every field, in both the IPTC block and the XMP packet.
/// - **Xmp** (PNG) stores the XMP packet only; IPTC-only fields are skipped.
/// - **NoMetadata** (GIF, BMP) can be read and re-encoded but holds no metadata.
///
/// # Example
///
/// ```rust
/// use imgmeta::pipeline::ImageKind;
/// use std::path::Path;
///
/// let kind = ImageKind::from_path(Path::new("photo.png"));
/// assert_eq!(kind, Some(ImageKind::Xmp));
///
/// let kind = ImageKind::from_path(Path::new("photo.jpg"));
/// assert_eq!(kind, Some(ImageKind::IptcXmp));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageKind {
    IptcXmp,
    Xmp,
    NoMetadata,
}

impl ImageKind {
    /// Determine the image kind from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        Format::from_extension(path).map(Self::from_format)
    }

    pub fn from_format(format: Format) -> Self {
        match format {
            Format::Jpeg => Self::IptcXmp,
            Format::Png => Self::Xmp,
            Format::Gif | Format::Bmp => Self::NoMetadata,
        }
    }

    /// Whether a value of `field` survives a write to this kind of image.
    pub fn stores(self, field: Field) -> bool {
        match self {
            Self::IptcXmp => true,
            Self::Xmp => field.xmp_property().is_some(),
            Self::NoMetadata => false,
        }
    }
}

/// A batch of edits to apply to every image.
///
/// Raster operations run first, in order; metadata edits are applied to the result.
///
/// # Example
///
/// ```rust
/// use imgmeta::metadata::Field;
/// use imgmeta::pipeline::MetadataEdit;
///
/// let mut edit = MetadataEdit::default();
/// edit.fields.insert(Field::Title, Some("Harbour at dusk".into()));
/// edit.add_keywords.push("sea".into());
/// assert!(!edit.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataEdit {
    /// `Some` sets the field, `None` removes it.
    pub fields: BTreeMap<Field, Option<String>>,
    /// Replace the keyword list.
    pub keywords: Option<Vec<String>>,
    pub add_keywords: Vec<String>,
    pub remove_keywords: Vec<String>,
    pub marked: Option<bool>,
    pub raster: Vec<RasterOp>,
}

impl MetadataEdit {
    pub fn is_empty(&self) -> bool {
        !self.touches_metadata() && self.raster.is_empty()
    }

    pub fn touches_metadata(&self) -> bool {
        !self.fields.is_empty()
            || self.keywords.is_some()
            || !self.add_keywords.is_empty()
            || !self.remove_keywords.is_empty()
            || self.marked.is_some()
    }

    /// Apply the metadata part of this edit.
    pub fn apply_to(&self, metadata: &mut ExtendedMetadata) {
        for (field, value) in &self.fields {
            match value {
                Some(value) => metadata.set(*field, value.clone()),
                None => metadata.clear(*field),
            }
        }
        if let Some(keywords) = &self.keywords {
            metadata.set_keywords(keywords.iter().cloned());
        }
        for keyword in &self.add_keywords {
            metadata.add_keyword(keyword.clone());
        }
        for keyword in &self.remove_keywords {
            metadata.remove_keyword(keyword);
        }
        // After the fields, so an explicit flag overrides the copyright side effect
        if let Some(marked) = self.marked {
            metadata.set_marked(marked);
        }
    }
}

/// The result of processing a single image.
///
/// `metadata` is the merged view after the edit (as written, or as it would be
/// written in a dry run).
#[derive(Debug, Serialize)]
pub struct ProcessResult {
    pub path: PathBuf,
    pub format: Option<Format>,
    pub image_kind: Option<ImageKind>,
    pub metadata: Option<ExtendedMetadata>,
    pub exif: ExifData,
    /// Technical description of the pixels as left by this run.
    pub info: Option<ImageInfo>,
    /// Edited fields this image kind cannot store.
    pub skipped_fields: Vec<String>,
    pub written: bool,
    pub backup_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks). Only files with supported image extensions
/// are included (see [`Format::from_extension`]).
///
/// # Example
///
/// ```rust,no_run
/// use imgmeta::pipeline::collect_images;
/// use std::path::PathBuf;
///
/// let images = collect_images(&[
///     PathBuf::from("photo.jpg"),       // single file
///     PathBuf::from("./photos/"),        // entire directory
/// ]);
/// println!("Found {} images", images.len());
/// ```
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_supported_image(p) {
                    images.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Check if a file has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    Format::from_extension(path).is_some()
}

/// Create a backup of the original file, once.
pub fn backup_file(path: &Path) -> Result<PathBuf> {
    let backup_path = path.with_extension(format!(
        "{}.bak",
        path.extension().unwrap_or_default().to_string_lossy()
    ));

    if !backup_path.exists() {
        std::fs::copy(path, &backup_path).context("Failed to create backup")?;
        log::debug!("Backup created: {}", backup_path.display());
    }

    Ok(backup_path)
}

/// Read an image, apply `edit` and write it back in place.
///
/// An empty edit only reads. Errors are reported in [`ProcessResult::error`] so a batch
/// keeps going.
///
/// # Example
///
/// ```rust,no_run
/// use imgmeta::config::Config;
/// use imgmeta::metadata::Field;
/// use imgmeta::pipeline::{process_image, MetadataEdit};
/// use std::path::Path;
///
/// let config = Config::default();
/// let mut edit = MetadataEdit::default();
/// edit.fields.insert(Field::City, Some("Bren".into()));
///
/// let result = process_image(Path::new("photo.jpg"), &edit, &config);
/// if let Some(ref meta) = result.metadata {
///     println!("City: {:?}", meta.city());
/// }
/// ```
pub fn process_image(path: &Path, edit: &MetadataEdit, config: &Config) -> ProcessResult {
    let mut result = ProcessResult {
        path: path.to_path_buf(),
        format: None,
        image_kind: None,
        metadata: None,
        exif: ExifData::default(),
        info: None,
        skipped_fields: Vec::new(),
        written: false,
        backup_path: None,
        error: None,
    };

    if let Err(e) = run(path, edit, config, &mut result) {
        log::warn!("{}: {e:#}", path.display());
        result.error = Some(format!("{e:#}"));
    }
    result
}

fn image_info(image: &Image) -> Option<ImageInfo> {
    image
        .info()
        .map_err(|e| log::debug!("No image info: {e}"))
        .ok()
}

fn run(path: &Path, edit: &MetadataEdit, config: &Config, result: &mut ProcessResult) -> Result<()> {
    let mut image = Image::open_with_codec(path, config.encoding.codec())
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let kind = ImageKind::from_format(image.format());
    result.format = Some(image.format());
    result.image_kind = Some(kind);
    result.exif = image.exif().clone();

    for op in &edit.raster {
        image.apply(*op).with_context(|| format!("Failed to apply {op:?}"))?;
    }

    if edit.touches_metadata() {
        result.skipped_fields = edit
            .fields
            .keys()
            .filter(|f| !kind.stores(**f))
            .map(|f| f.name().to_string())
            .collect();
        if !result.skipped_fields.is_empty() {
            log::info!(
                "  {} cannot store: {}",
                image.format(),
                result.skipped_fields.join(", ")
            );
        }
        edit.apply_to(image.metadata_mut().context("Failed to read metadata")?);
    }

    let changed = image.is_dirty() || !edit.raster.is_empty();
    if config.output.dry_run || !changed {
        result.info = image_info(&image);
        result.metadata = Some(image.metadata().context("Failed to read metadata")?.clone());
        return Ok(());
    }

    // Render before touching the file so an encode failure leaves it alone
    let bytes = image.to_bytes().context("Failed to encode image")?;

    if config.output.backup_originals {
        result.backup_path = Some(backup_file(path)?);
    }
    std::fs::write(path, &bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    result.written = true;
    log::info!("  Wrote {}", path.display());

    let mut written = Image::with_codec(bytes, config.encoding.codec())?;
    result.info = image_info(&written);
    result.metadata = Some(written.metadata()?.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::encoded_image;
    use image::ImageFormat;
    use std::fs;
    use tempfile::TempDir;

    fn write_image(dir: &TempDir, name: &str, format: ImageFormat) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, encoded_image(format, 12, 6)).unwrap();
        path
    }

    fn no_backup() -> Config {
        let mut config = Config::default();
        config.output.backup_originals = false;
        config
    }

    // ── ImageKind ────────────────────────────────────────────────────

    #[test]
    fn image_kind_from_path() {
        assert_eq!(ImageKind::from_path(Path::new("photo.jpg")), Some(ImageKind::IptcXmp));
        assert_eq!(ImageKind::from_path(Path::new("PHOTO.JPEG")), Some(ImageKind::IptcXmp));
        assert_eq!(ImageKind::from_path(Path::new("image.png")), Some(ImageKind::Xmp));
        assert_eq!(ImageKind::from_path(Path::new("anim.gif")), Some(ImageKind::NoMetadata));
        assert_eq!(ImageKind::from_path(Path::new("doc.pdf")), None);
        assert_eq!(ImageKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn image_kind_stores() {
        assert!(ImageKind::IptcXmp.stores(Field::Contact));
        assert!(!ImageKind::Xmp.stores(Field::Contact));
        assert!(ImageKind::Xmp.stores(Field::WebStatement));
        assert!(!ImageKind::NoMetadata.stores(Field::Title));
    }

    // ── MetadataEdit ─────────────────────────────────────────────────

    #[test]
    fn edit_applies_fields_then_keywords_then_mark() {
        let mut meta = ExtendedMetadata::new();
        meta.set_city("Lyon");
        meta.set_keywords(["a", "b"]);

        let mut edit = MetadataEdit::default();
        edit.fields.insert(Field::City, None);
        edit.fields.insert(Field::Copyright, Some("(c) me".into()));
        edit.add_keywords.push("c".into());
        edit.remove_keywords.push("a".into());
        edit.marked = Some(false);
        edit.apply_to(&mut meta);

        assert_eq!(meta.city(), None);
        assert_eq!(meta.copyright(), Some("(c) me"));
        assert_eq!(meta.keywords(), ["b", "c"]);
        assert!(!meta.is_marked());
    }

    #[test]
    fn empty_edit() {
        let edit = MetadataEdit::default();
        assert!(edit.is_empty());
        let edit = MetadataEdit {
            raster: vec![RasterOp::Rotate(1)],
            ..Default::default()
        };
        assert!(!edit.is_empty());
        assert!(!edit.touches_metadata());
    }

    // ── collect_images ───────────────────────────────────────────────

    #[test]
    fn collect_images_single_file() {
        let dir = TempDir::new().unwrap();
        let jpg = dir.path().join("test.jpg");
        fs::write(&jpg, b"fake").unwrap();

        let images = collect_images(&[jpg.clone()]);
        assert_eq!(images, vec![jpg]);
    }

    #[test]
    fn collect_images_skips_unsupported() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("readme.txt");
        fs::write(&txt, b"hello").unwrap();

        assert!(collect_images(&[txt]).is_empty());
    }

    #[test]
    fn collect_images_directory_recursive() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        fs::write(dir.path().join("a.jpg"), b"fake").unwrap();
        fs::write(sub.join("b.png"), b"fake").unwrap();
        fs::write(sub.join("c.txt"), b"fake").unwrap();

        let images = collect_images(&[dir.path().to_path_buf()]);
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn collect_images_nonexistent_path() {
        assert!(collect_images(&[PathBuf::from("/nonexistent/path")]).is_empty());
    }

    // ── backup_file ──────────────────────────────────────────────────

    #[test]
    fn backup_is_created_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        fs::write(&path, b"first").unwrap();

        let backup = backup_file(&path).unwrap();
        assert_eq!(backup, dir.path().join("photo.jpg.bak"));

        fs::write(&path, b"second").unwrap();
        backup_file(&path).unwrap();
        assert_eq!(fs::read(&backup).unwrap(), b"first");
    }

    // ── process_image ────────────────────────────────────────────────

    #[test]
    fn process_writes_jpeg_metadata_in_place() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "photo.jpg", ImageFormat::Jpeg);

        let mut edit = MetadataEdit::default();
        edit.fields.insert(Field::Title, Some("Quay".into()));
        edit.fields.insert(Field::Contact, Some("desk@example.org".into()));
        edit.keywords = Some(vec!["harbour".into(), "boats".into()]);

        let mut config = Config::default();
        let result = process_image(&path, &edit, &config);
        assert!(result.error.is_none(), "{:?}", result.error);
        assert!(result.written);
        assert!(result.skipped_fields.is_empty());
        assert_eq!(result.backup_path, Some(dir.path().join("photo.jpg.bak")));

        config.output.backup_originals = false;
        let reread = process_image(&path, &MetadataEdit::default(), &config);
        let meta = reread.metadata.unwrap();
        assert!(!reread.written);
        assert_eq!(meta.title(), Some("Quay"));
        assert_eq!(meta.contact(), Some("desk@example.org"));
        assert_eq!(meta.keywords(), ["harbour", "boats"]);
    }

    #[test]
    fn dry_run_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "photo.jpg", ImageFormat::Jpeg);
        let before = fs::read(&path).unwrap();

        let mut edit = MetadataEdit::default();
        edit.fields.insert(Field::City, Some("Bren".into()));
        edit.raster.push(RasterOp::Scale(0.5));

        let mut config = Config::default();
        config.output.dry_run = true;
        let result = process_image(&path, &edit, &config);

        assert!(result.error.is_none());
        assert!(!result.written);
        assert_eq!(result.metadata.unwrap().city(), Some("Bren"));
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!dir.path().join("photo.jpg.bak").exists());
    }

    #[test]
    fn png_skips_iptc_only_fields() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "image.png", ImageFormat::Png);

        let mut edit = MetadataEdit::default();
        edit.fields.insert(Field::Contact, Some("x".into()));
        edit.fields.insert(Field::Source, Some("scan".into()));

        let result = process_image(&path, &edit, &no_backup());
        assert!(result.error.is_none());
        assert_eq!(result.skipped_fields, vec!["contact".to_string()]);
        let meta = result.metadata.unwrap();
        assert_eq!(meta.source(), Some("scan"));
        assert_eq!(meta.contact(), None);
    }

    #[test]
    fn gif_metadata_edit_reports_error() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "anim.gif", ImageFormat::Gif);
        let before = fs::read(&path).unwrap();

        let mut edit = MetadataEdit::default();
        edit.fields.insert(Field::Title, Some("t".into()));
        let result = process_image(&path, &edit, &no_backup());

        assert!(!result.written);
        assert!(result.error.unwrap().contains("GIF images have no metadata storage"));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn raster_edit_rewrites_pixels() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "photo.jpg", ImageFormat::Jpeg);

        let edit = MetadataEdit {
            raster: vec![RasterOp::Rotate(1)],
            ..Default::default()
        };
        let result = process_image(&path, &edit, &no_backup());
        assert!(result.written);
        let info = result.info.unwrap();
        assert_eq!((info.width, info.height), (6, 12));

        let image = Image::open(&path).unwrap();
        assert_eq!(image.dimensions().unwrap(), (6, 12));
    }

    #[test]
    fn unreadable_file_reports_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, b"not an image").unwrap();

        let result = process_image(&path, &MetadataEdit::default(), &no_backup());
        assert!(result.error.unwrap().contains("Failed to read"));
    }
}
