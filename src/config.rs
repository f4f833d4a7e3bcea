//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` divisa in tre gruppi: `images`, `videos`, `general`
//! - Fornisce valori di default sensati per tutti i parametri
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Applica override parziali campo per campo (i campi assenti restano ai default)
//! - Fornisce validazione robusta dei parametri di input
//!
//! ## Override:
//! Un file JSON può contenere solo una parte dei campi. I gruppi sconosciuti
//! vengono ignorati, i campi mancanti prendono il valore di default:
//! ```json
//! { "images": { "jpeg_quality": 70 }, "videos": { "preset": "slow" } }
//! ```
//!
//! ## Validazione:
//! - `jpeg_quality` 1-100, `png_compression` 0-9, `crf` 0-51
//! - `workers` > 0, risoluzioni massime con dimensioni > 0
//! - Liste di estensioni non vuote (normalizzate a `.ext` minuscolo)

use crate::error::OptimizeError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A width/height bound, serialized as `[width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if a `width x height` frame does not fit inside this bound.
    pub fn is_exceeded_by(&self, width: u32, height: u32) -> bool {
        width > self.width || height > self.height
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl From<Dimensions> for (u32, u32) {
    fn from(d: Dimensions) -> Self {
        (d.width, d.height)
    }
}

impl FromStr for Dimensions {
    type Err = String;

    /// Parses `1920x1080` (also accepts `1920,1080`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X', ','])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width = w.trim().parse::<u32>().map_err(|e| format!("invalid width '{}': {}", w, e))?;
        let height = h.trim().parse::<u32>().map_err(|e| format!("invalid height '{}': {}", h, e))?;
        Ok(Self { width, height })
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// x264/x265 speed/quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VideoPreset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl VideoPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
        }
    }
}

impl fmt::Display for VideoPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image re-encoding options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// PNG compression level (0-9)
    pub png_compression: u8,
    /// Maximum resolution; larger images are downscaled to fit
    pub max_resolution: Option<Dimensions>,
    /// Re-encode PNG files as JPEG
    pub convert_png_to_jpg: bool,
    /// Skip images smaller than `min_size_kb`
    pub ignore_small: bool,
    pub min_size_kb: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            png_compression: 9,
            max_resolution: None,
            convert_png_to_jpg: false,
            ignore_small: true,
            min_size_kb: 100,
        }
    }
}

impl ImageConfig {
    /// Size-based skip decision
    pub fn should_skip(&self, size_bytes: u64) -> bool {
        self.ignore_small && size_bytes < self.min_size_kb.saturating_mul(1024)
    }
}

/// Video transcoding options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Video CRF value (0-51, lower = better quality)
    pub crf: u8,
    /// ffmpeg video codec name
    pub codec: String,
    pub preset: VideoPreset,
    /// AAC audio bitrate (e.g. "128k")
    pub audio_bitrate: String,
    /// Maximum frame size; larger videos are scaled down to fit
    pub max_scale: Option<Dimensions>,
    /// Skip videos smaller than `min_size_mb`
    pub ignore_small: bool,
    pub min_size_mb: u64,
    /// Transcoder executable (name on PATH or explicit path)
    pub ffmpeg_binary: String,
    /// Kill the transcoder after this many seconds
    pub timeout_secs: Option<u64>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            crf: 23,
            codec: "libx264".to_string(),
            preset: VideoPreset::Medium,
            audio_bitrate: "128k".to_string(),
            max_scale: None,
            ignore_small: true,
            min_size_mb: 5,
            ffmpeg_binary: "ffmpeg".to_string(),
            timeout_secs: None,
        }
    }
}

impl VideoConfig {
    /// Size-based skip decision
    pub fn should_skip(&self, size_bytes: u64) -> bool {
        self.ignore_small && size_bytes < self.min_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Run-wide options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Number of parallel workers per phase
    pub workers: usize,
    /// Mirror untouched originals into the backup tree
    pub keep_originals: bool,
    /// Backup root (None = `<input>/originals`)
    pub backup_path: Option<PathBuf>,
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            keep_originals: true,
            backup_path: None,
            image_extensions: [".jpg", ".jpeg", ".png", ".webp"].iter().map(|s| s.to_string()).collect(),
            video_extensions: [".mp4", ".mov", ".avi", ".mkv"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Configuration for media optimization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub images: ImageConfig,
    pub videos: VideoConfig,
    pub general: GeneralConfig,
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> anyhow::Error { OptimizeError::Validation(msg.to_string()).into() };

        if self.images.jpeg_quality == 0 || self.images.jpeg_quality > 100 {
            return Err(invalid("JPEG quality must be between 1 and 100"));
        }

        if self.images.png_compression > 9 {
            return Err(invalid("PNG compression level must be between 0 and 9"));
        }

        if self.videos.crf > 51 {
            return Err(invalid("Video CRF must be between 0 and 51"));
        }

        if self.general.workers == 0 {
            return Err(invalid("Number of workers must be greater than 0"));
        }

        for (name, bound) in [("images.max_resolution", self.images.max_resolution), ("videos.max_scale", self.videos.max_scale)] {
            if let Some(d) = bound {
                if d.width == 0 || d.height == 0 {
                    return Err(OptimizeError::Validation(format!("{} must have non-zero width and height, got {}", name, d)).into());
                }
            }
        }

        if self.videos.codec.trim().is_empty() {
            return Err(invalid("Video codec must not be empty"));
        }

        if self.videos.audio_bitrate.trim().is_empty() {
            return Err(invalid("Audio bitrate must not be empty"));
        }

        if self.videos.ffmpeg_binary.trim().is_empty() {
            return Err(invalid("Transcoder binary must not be empty"));
        }

        if self.general.image_extensions.is_empty() && self.general.video_extensions.is_empty() {
            return Err(invalid("At least one image or video extension is required"));
        }

        Ok(())
    }

    /// Lowercases extension lists and makes sure each entry starts with a dot.
    pub fn normalize(&mut self) {
        fn normalize_list(list: &mut Vec<String>) {
            for ext in list.iter_mut() {
                let lower = ext.trim().to_lowercase();
                *ext = if lower.starts_with('.') { lower } else { format!(".{}", lower) };
            }
            list.retain(|ext| ext.len() > 1);
            list.dedup();
        }

        normalize_list(&mut self.general.image_extensions);
        normalize_list(&mut self.general.video_extensions);
    }

    /// Load configuration from file
    ///
    /// A missing file yields the defaults. Unknown top-level groups are ignored
    /// and missing fields keep their default value.
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| OptimizeError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
