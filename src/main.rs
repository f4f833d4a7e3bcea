//! # Media Archive Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del logging con `tracing` (stderr + file opzionale)
//! - Caricamento della configurazione da file e override da CLI
//! - Gestione di Ctrl-C tramite `StopSignal`
//! - Exit code: 0 su successo o interruzione, 1 su errore fatale
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-archive-optimizer ~/Takeout/Google\ Photos -j 80 --crf 26 -p 8 --verbose
//! ```

use anyhow::Result;
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use media_archive_optimizer::config::{Dimensions, VideoPreset};
use media_archive_optimizer::platform::PlatformCommands;
use media_archive_optimizer::{Config, MediaOptimizer, OptimizeError};

#[derive(Parser, Debug)]
#[command(name = "media-archive-optimizer", version)]
#[command(about = "Shrink a photo/video export: re-encode images, transcode videos, keep sidecars and originals")]
struct Args {
    /// Directory containing the exported media
    input: PathBuf,

    /// Output directory (default: <input>/optimized)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Backup directory for originals (default: <input>/originals)
    #[arg(short, long = "backup-dir")]
    backup_dir: Option<PathBuf>,

    /// Do not keep a backup of the originals
    #[arg(long)]
    no_backup: bool,

    /// JPEG quality (1-100)
    #[arg(short, long)]
    jpeg_quality: Option<u8>,

    /// PNG compression level (0-9)
    #[arg(long)]
    png_compression: Option<u8>,

    /// Downscale images larger than WIDTHxHEIGHT
    #[arg(long, value_name = "WxH")]
    max_resolution: Option<Dimensions>,

    /// Re-encode PNG files as JPEG
    #[arg(long)]
    convert_png: bool,

    /// Number of parallel workers
    #[arg(short = 'p', long)]
    workers: Option<usize>,

    /// Video CRF value (0-51, lower = better quality)
    #[arg(long)]
    crf: Option<u8>,

    /// Video encoding preset
    #[arg(long, value_enum)]
    preset: Option<VideoPreset>,

    /// Video codec passed to ffmpeg
    #[arg(long)]
    codec: Option<String>,

    /// Audio bitrate (e.g. 128k)
    #[arg(long)]
    audio_bitrate: Option<String>,

    /// Downscale videos larger than WIDTHxHEIGHT
    #[arg(long, value_name = "WxH")]
    max_scale: Option<Dimensions>,

    /// ffmpeg executable (name on PATH or full path)
    #[arg(long, value_name = "PATH")]
    ffmpeg: Option<String>,

    /// Also process files below the size thresholds
    #[arg(long)]
    include_small: bool,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

impl Args {
    /// CLI flags override the file configuration field by field
    fn apply_overrides(&self, config: &mut Config) {
        let images = &mut config.images;
        if let Some(quality) = self.jpeg_quality {
            images.jpeg_quality = quality;
        }
        if let Some(level) = self.png_compression {
            images.png_compression = level;
        }
        if self.max_resolution.is_some() {
            images.max_resolution = self.max_resolution;
        }
        if self.convert_png {
            images.convert_png_to_jpg = true;
        }

        let videos = &mut config.videos;
        if let Some(crf) = self.crf {
            videos.crf = crf;
        }
        if let Some(preset) = self.preset {
            videos.preset = preset;
        }
        if let Some(ref codec) = self.codec {
            videos.codec = codec.clone();
        }
        if let Some(ref bitrate) = self.audio_bitrate {
            videos.audio_bitrate = bitrate.clone();
        }
        if self.max_scale.is_some() {
            videos.max_scale = self.max_scale;
        }
        if let Some(ref binary) = self.ffmpeg {
            videos.ffmpeg_binary = binary.clone();
        }

        if self.include_small {
            config.images.ignore_small = false;
            config.videos.ignore_small = false;
        }

        let general = &mut config.general;
        if let Some(workers) = self.workers {
            general.workers = workers;
        }
        if let Some(ref dir) = self.backup_dir {
            general.backup_path = Some(dir.clone());
        }
        if self.no_backup {
            general.keep_originals = false;
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match args.log_file {
        Some(ref path) => Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(File::create(path)?))),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let mut config = match args.config {
        Some(ref path) => {
            if !path.exists() {
                return Err(OptimizeError::Config(format!("Config file not found: {}", path.display())).into());
            }
            Config::from_file(path).await?
        }
        None => Config::default(),
    };
    args.apply_overrides(&mut config);
    config.normalize();
    debug!("Effective configuration: {:?}", config);

    let optimizer = MediaOptimizer::new(&args.input, args.output.as_deref(), config).await?;

    let stop = optimizer.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight files...");
            stop.stop();
        }
    });

    optimizer.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("Error: cannot initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }
    debug!("Platform: {}", PlatformCommands::system_info());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if OptimizeError::is_interruption(&e) => {
            println!("\nProcess interrupted by user.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_only_given_fields() {
        let args = Args::parse_from([
            "media-archive-optimizer",
            "/takeout",
            "-j",
            "70",
            "--max-scale",
            "1280x720",
            "--preset",
            "slow",
            "--no-backup",
            "--include-small",
            "-p",
            "3",
        ]);

        let mut config = Config::default();
        config.videos.crf = 30;
        args.apply_overrides(&mut config);

        assert_eq!(config.images.jpeg_quality, 70);
        assert_eq!(config.images.png_compression, 9);
        assert_eq!(config.videos.max_scale, Some(Dimensions::new(1280, 720)));
        assert_eq!(config.videos.preset, VideoPreset::Slow);
        assert_eq!(config.videos.crf, 30);
        assert!(!config.general.keep_originals);
        assert!(!config.images.ignore_small);
        assert!(!config.videos.ignore_small);
        assert_eq!(config.general.workers, 3);
    }

    #[test]
    fn test_cli_rejects_bad_dimensions() {
        assert!(Args::try_parse_from(["media-archive-optimizer", "/in", "--max-resolution", "big"]).is_err());
    }
}
