use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use imgmeta::codec::RasterOp;
use imgmeta::metadata::{ExtendedMetadata, Field};
use imgmeta::pipeline::{self, MetadataEdit};
use imgmeta::config;

#[derive(Parser, Debug)]
#[command(
    name = "imgmeta",
    version,
    about = "Read and rewrite IPTC/XMP metadata of JPEG and PNG images without touching the pixels"
)]
struct Cli {
    /// Image files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Preview changes without writing to files
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Display the metadata of each image
    #[arg(long)]
    show: bool,

    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    extended_author: Option<String>,
    /// Copyright notice; a non-empty notice also marks the image as rights-managed
    #[arg(long)]
    copyright: Option<String>,
    #[arg(long)]
    usage: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    synopsis: Option<String>,
    #[arg(long)]
    editor: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    country: Option<String>,
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    creation_date: Option<String>,
    #[arg(long)]
    source: Option<String>,
    #[arg(long)]
    contact: Option<String>,
    #[arg(long)]
    web_statement: Option<String>,

    /// Remove a field (by name, e.g. `city` or `webStatement`)
    #[arg(long, value_name = "FIELD")]
    clear: Vec<Field>,

    /// Replace the keyword list (repeatable)
    #[arg(long = "keyword", value_name = "KEYWORD")]
    keywords: Vec<String>,

    /// Add a keyword (repeatable)
    #[arg(long = "add-keyword", value_name = "KEYWORD")]
    add_keywords: Vec<String>,

    /// Remove a keyword (repeatable)
    #[arg(long = "remove-keyword", value_name = "KEYWORD")]
    remove_keywords: Vec<String>,

    /// Set or unset the rights-managed flag
    #[arg(long, value_name = "BOOL")]
    marked: Option<bool>,

    /// Scale the pixels by a ratio (re-encodes the image)
    #[arg(long, value_name = "RATIO")]
    scale: Option<f64>,

    /// Rotate clockwise by quarter turns (re-encodes the image)
    #[arg(long, value_name = "TURNS", allow_hyphen_values = true)]
    rotate: Option<i32>,
}

impl Cli {
    fn edit(&self) -> MetadataEdit {
        let mut edit = MetadataEdit::default();
        let values = [
            (Field::Title, &self.title),
            (Field::Author, &self.author),
            (Field::ExtendedAuthor, &self.extended_author),
            (Field::Copyright, &self.copyright),
            (Field::Usage, &self.usage),
            (Field::Description, &self.description),
            (Field::Synopsis, &self.synopsis),
            (Field::Editor, &self.editor),
            (Field::City, &self.city),
            (Field::Country, &self.country),
            (Field::State, &self.state),
            (Field::CreationDate, &self.creation_date),
            (Field::Source, &self.source),
            (Field::Contact, &self.contact),
            (Field::WebStatement, &self.web_statement),
        ];
        for (field, value) in values {
            if let Some(value) = value {
                edit.fields.insert(field, Some(value.clone()));
            }
        }
        for field in &self.clear {
            edit.fields.insert(*field, None);
        }
        if !self.keywords.is_empty() {
            edit.keywords = Some(self.keywords.clone());
        }
        edit.add_keywords = self.add_keywords.clone();
        edit.remove_keywords = self.remove_keywords.clone();
        edit.marked = self.marked;
        if let Some(ratio) = self.scale {
            edit.raster.push(RasterOp::Scale(ratio));
        }
        if let Some(turns) = self.rotate {
            edit.raster.push(RasterOp::Rotate(turns));
        }
        edit
    }
}

fn init_logging(verbose: bool, log_file: Option<&str>) -> Result<()> {
    let log_level = if verbose { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level));
    builder.format_timestamp(None);
    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle --init
    if cli.init {
        init_logging(cli.verbose, None)?;
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    // Load config
    let mut config = config::Config::load(cli.config.as_deref())?;
    init_logging(cli.verbose, config.output.log_file.as_deref())?;

    // Override dry_run from CLI flag
    if cli.dry_run {
        config.output.dry_run = true;
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    let edit = cli.edit();
    let show = cli.show || edit.is_empty();

    // Collect images
    let images = pipeline::collect_images(&cli.paths);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }

    log::info!("Found {} image(s) to process", images.len());
    if config.output.dry_run && !edit.is_empty() {
        log::info!("DRY RUN — no files will be modified");
    }

    // Process each image
    let mut results = Vec::new();
    let total = images.len();

    for (i, image_path) in images.iter().enumerate() {
        log::info!(
            "[{}/{}] Processing: {}",
            i + 1,
            total,
            image_path.display()
        );

        let result = pipeline::process_image(image_path, &edit, &config);

        if let Some(ref err) = result.error {
            log::error!("  Error: {err}");
        } else if !cli.json && (show || config.output.dry_run) {
            print_metadata(&result, &edit);
        }

        results.push(result);
    }

    // JSON output
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    // Summary
    let success = results.iter().filter(|r| r.error.is_none()).count();
    let failed = total - success;
    let written = results.iter().filter(|r| r.written).count();
    log::info!("Done: {success} succeeded ({written} written), {failed} failed out of {total} images");

    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

/// Print the merged metadata and the EXIF summary of one image.
/// Values touched by `edit` are shown in green with a `*`.
fn print_metadata(result: &pipeline::ProcessResult, edit: &MetadataEdit) {
    println!();
    println!("{BOLD}File:{RESET} {}", result.path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    if let Some(info) = &result.info {
        println!("  {BOLD}Image{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        print_row("Format", &info.format_details);
        print_row("Size", &format!("{} x {}", info.width, info.height));
        print_row(
            "Pixels",
            &format!("{:?}, {} bits per pixel", info.color_model, info.bits_per_pixel),
        );
        if let Some((x, y)) = info.dpi {
            print_row("Resolution", &format!("{x} x {y} dpi"));
        }
        if info.number_of_images > 1 {
            print_row("Frames", &info.number_of_images.to_string());
        }
        println!();
    }

    let exif = &result.exif;
    let mut exif_rows: Vec<(&str, String)> = [
        ("Make", exif.make.clone()),
        ("Model", exif.model.clone()),
        ("DateTimeOriginal", exif.date_time_original.clone()),
        ("CreateDate", exif.create_date.clone()),
        ("ModifyDate", exif.modify_date.clone()),
        ("Orientation", exif.orientation.map(|o| o.to_string())),
    ]
    .into_iter()
    .filter_map(|(tag, val)| val.map(|v| (tag, v)))
    .collect();
    if let Some(location) = &exif.location {
        exif_rows.push(("Location", location.to_string()));
    }
    if !exif_rows.is_empty() {
        println!("  {BOLD}EXIF{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        for (tag, val) in &exif_rows {
            print_row(tag, val);
        }
        println!();
    }

    let Some(meta) = &result.metadata else {
        return;
    };
    println!("  {BOLD}Descriptive Metadata{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    print_fields(meta, edit);
    for field in &result.skipped_fields {
        print_skipped(field, "(not stored in this format)");
    }
    println!();
}

fn print_fields(meta: &ExtendedMetadata, edit: &MetadataEdit) {
    let mut any = false;
    for (field, value) in meta.fields() {
        any = true;
        if edit.fields.contains_key(&field) {
            print_new(field.name(), value);
        } else {
            print_row(field.name(), value);
        }
    }
    if !meta.keywords().is_empty() {
        any = true;
        let keywords = meta.keywords().join("; ");
        let touched = edit.keywords.is_some()
            || !edit.add_keywords.is_empty()
            || !edit.remove_keywords.is_empty();
        if touched {
            print_new("keywords", &keywords);
        } else {
            print_row("keywords", &keywords);
        }
    }
    if meta.is_marked() {
        any = true;
        print_row("marked", "true");
    }
    if !any {
        println!("  {DIM}(no IPTC/XMP metadata found){RESET}");
    }
}

/// Print a new value row (green with *).
fn print_new(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            if lines.len() == 1 {
                println!("  {GREEN}{tag_col} : {line} *{RESET}");
            } else {
                println!("  {GREEN}{tag_col} : {line}{RESET}");
            }
        } else if i == lines.len() - 1 {
            println!("  {GREEN}{INDENT}{line} *{RESET}");
        } else {
            println!("  {GREEN}{INDENT}{line}{RESET}");
        }
    }
}

/// Print a skipped field row (dimmed).
fn print_skipped(tag: &str, reason: &str) {
    let tag_col = format!("{:<22}", tag);
    println!("  {DIM}{tag_col} : {reason}{RESET}");
}

/// Print a single row in the display table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_build_an_edit() {
        let cli = Cli::parse_from([
            "imgmeta",
            "a.jpg",
            "--title",
            "Quay",
            "--clear",
            "city",
            "--keyword",
            "x",
            "--keyword",
            "y",
            "--marked",
            "false",
            "--rotate",
            "-1",
        ]);
        let edit = cli.edit();
        assert_eq!(edit.fields.get(&Field::Title), Some(&Some("Quay".to_string())));
        assert_eq!(edit.fields.get(&Field::City), Some(&None));
        assert_eq!(edit.keywords, Some(vec!["x".to_string(), "y".to_string()]));
        assert_eq!(edit.marked, Some(false));
        assert_eq!(edit.raster, vec![RasterOp::Rotate(-1)]);
    }

    #[test]
    fn no_flags_is_a_read() {
        let cli = Cli::parse_from(["imgmeta", "dir"]);
        assert!(cli.edit().is_empty());
    }

    #[test]
    fn wrap_text_breaks_on_words() {
        assert_eq!(wrap_text("a b c", 3), vec!["a b", "c"]);
        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }
}
