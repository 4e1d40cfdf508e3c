use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codec::{ResizeFilter, StandardCodec};

/// Top-level configuration for the imgmeta tools.
///
/// Controls how pixels are re-encoded after a raster change and how output files are
/// written (dry run, backups).
///
/// # Loading
///
/// ```rust,no_run
/// use imgmeta::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.encoding.jpeg_quality = 95;
/// config.output.dry_run = true;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pixel re-encoding settings, used only by raster mutations.
    pub encoding: EncodingConfig,
    /// Output behavior (dry run, backups, logging).
    pub output: OutputConfig,
}

/// Re-encoding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// JPEG quality, 1 to 100.
    pub jpeg_quality: u8,
    pub resize_filter: ResizeFilter,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            resize_filter: ResizeFilter::Lanczos3,
        }
    }
}

impl EncodingConfig {
    pub fn codec(&self) -> StandardCodec {
        StandardCodec {
            jpeg_quality: self.jpeg_quality,
            filter: self.resize_filter,
        }
    }
}

/// Output and behavior configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// If `true`, report what would change without modifying any files.
    pub dry_run: bool,
    /// If `true`, create a `.bak` backup before modifying an image.
    pub backup_originals: bool,
    /// Optional path to a log file.
    pub log_file: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup_originals: true,
            log_file: None,
        }
    }
}

impl Config {
    /// Resolve the config file path — same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}
