//! # Media Optimizer Main Orchestrator
//!
//! Orchestratore principale che delega responsabilità ai moduli specializzati.
//!
//! ## Flusso di una run:
//! 1. Discovery dei file (escludendo output e backup annidati nell'input)
//! 2. Registrazione dei totali per categoria
//! 3. Verifica di ffmpeg, solo se sono stati trovati video; assegnazione
//!    dei nomi di output delle immagini (nessun file ne sovrascrive un altro)
//! 4. Fase immagini, poi fase video: ogni fase usa un `Semaphore` con
//!    `general.workers` permessi e attende tutti i suoi task
//! 5. Report finale su stdout e su file nella directory di output
//!
//! ## Interruzione:
//! Con `stop()` sul `StopSignal` nessun nuovo file viene schedulato, i
//! transcode in corso vengono terminati e `run()` restituisce
//! `OptimizeError::Interrupted` senza report.

use crate::{
    backup::BackupManager,
    cancellation::StopSignal,
    config::Config,
    error::OptimizeError,
    file_manager::FileManager,
    image_processor::ImageProcessor,
    media::{MediaFile, TransformOutcome},
    optimizer::{path_resolver::PathResolver, progress_tracker::ProgressTracker, task_optimizer::TaskOptimizer},
    progress::{ProgressManager, RunStatistics},
    report::Report,
    video_processor::VideoProcessor,
};
use anyhow::Result;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: RunStatistics,
    /// `None` when nothing was discovered
    pub report_path: Option<PathBuf>,
}

/// Orchestratore principale
pub struct MediaOptimizer {
    config: Config,
    paths: PathResolver,
    stop: StopSignal,
}

impl MediaOptimizer {
    /// Validate the configuration and prepare the output (and backup) roots.
    ///
    /// `output` defaults to `<input>/optimized`; the backup root defaults to
    /// `<input>/originals` when `keep_originals` is set.
    pub async fn new(input: &Path, output: Option<&Path>, config: Config) -> Result<Self> {
        config.validate()?;

        let metadata = tokio::fs::metadata(input)
            .await
            .map_err(|e| OptimizeError::Config(format!("Input directory {} does not exist: {}", input.display(), e)))?;
        if !metadata.is_dir() {
            return Err(OptimizeError::Config(format!("Input path is not a directory: {}", input.display())).into());
        }
        let input_root = tokio::fs::canonicalize(input).await?;

        let output_root = Self::prepare_root(output.map(Path::to_path_buf).unwrap_or_else(|| input_root.join("optimized"))).await?;
        if output_root == input_root {
            return Err(OptimizeError::Config("Output directory must differ from the input directory".to_string()).into());
        }

        let backup_root = if config.general.keep_originals {
            let requested = config.general.backup_path.clone().unwrap_or_else(|| input_root.join("originals"));
            let root = Self::prepare_root(requested).await?;
            if root == input_root || root == output_root {
                return Err(OptimizeError::Config(
                    "Backup directory must differ from the input and output directories".to_string(),
                )
                .into());
            }
            Some(root)
        } else {
            None
        };

        Ok(Self {
            config,
            paths: PathResolver::new(input_root, output_root, backup_root),
            stop: StopSignal::new(),
        })
    }

    async fn prepare_root(path: PathBuf) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| OptimizeError::Config(format!("Cannot create directory {}: {}", path.display(), e)))?;
        Ok(tokio::fs::canonicalize(&path).await?)
    }

    /// Handle used to request a stop from another task (Ctrl-C)
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn input_root(&self) -> &Path {
        self.paths.input_root()
    }

    pub fn output_root(&self) -> &Path {
        self.paths.output_root()
    }

    pub fn backup_root(&self) -> Option<&Path> {
        self.paths.backup_root()
    }

    /// Esegue il processo di ottimizzazione
    pub async fn run(&self) -> Result<RunSummary> {
        let stats = Arc::new(Mutex::new(RunStatistics::new()));

        info!("Starting media optimization in: {}", self.input_root().display());
        self.log_configuration();

        let discovered = self.discover().await?;
        stats.lock().await.record_discovery(discovered.images.len(), discovered.videos.len());
        info!("Found {} images and {} videos", discovered.images.len(), discovered.videos.len());

        if discovered.is_empty() {
            warn!("No media files found in {}", self.input_root().display());
            let mut snapshot = stats.lock().await.clone();
            snapshot.finish();
            return Ok(RunSummary { stats: snapshot, report_path: None });
        }

        if !discovered.videos.is_empty() {
            VideoProcessor::check_dependencies(&self.config.videos).await?;
        }

        let backup = BackupManager::new(self.paths.clone());
        let mut images = ImageProcessor::new(self.config.images.clone(), self.paths.clone(), backup.clone());
        images.reserve_outputs(&discovered.images);
        let task = TaskOptimizer::new(
            images,
            VideoProcessor::new(self.config.videos.clone(), self.paths.clone(), backup),
            self.stop.clone(),
        );

        self.run_phase("Images", discovered.images, &task, &stats).await?;
        self.run_phase("Videos", discovered.videos, &task, &stats).await?;

        if self.stop.is_stopped() {
            warn!("Run interrupted; no report written");
            return Err(OptimizeError::Interrupted.into());
        }

        let mut final_stats = stats.lock().await.clone();
        final_stats.finish();

        let report = Report::new(final_stats.clone(), self.input_root(), self.output_root(), self.backup_root());
        println!("\n{}", report.render());
        let report_path = report.save(self.output_root()).await?;

        println!("Process complete! Optimized files saved to: {}", self.output_root().display());
        if let Some(backup_root) = self.backup_root() {
            println!("Original files preserved in: {}", backup_root.display());
        }

        Ok(RunSummary { stats: final_stats, report_path: Some(report_path) })
    }

    async fn discover(&self) -> Result<crate::file_manager::DiscoveredMedia> {
        let root = self.input_root().to_path_buf();
        let general = self.config.general.clone();
        let mut excluded = vec![self.output_root().to_path_buf()];
        excluded.extend(self.backup_root().map(Path::to_path_buf));

        tokio::task::spawn_blocking(move || FileManager::discover(&root, &general, &excluded)).await?
    }

    /// Run one phase with at most `workers` files in flight, waiting for all of them
    async fn run_phase(
        &self,
        phase: &str,
        files: Vec<MediaFile>,
        task: &TaskOptimizer,
        stats: &Arc<Mutex<RunStatistics>>,
    ) -> Result<()> {
        if files.is_empty() || self.stop.is_stopped() {
            return Ok(());
        }

        info!("Optimizing {} {}...", files.len(), phase.to_lowercase());
        let semaphore = Arc::new(Semaphore::new(self.config.general.workers));
        let tracker = ProgressTracker::new(stats.clone(), ProgressManager::new(files.len() as u64, phase));

        let mut scheduled = Vec::with_capacity(files.len());
        let mut handles = Vec::with_capacity(files.len());

        for file in files {
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => permit?,
                _ = self.stop.stopped() => break,
            };
            if self.stop.is_stopped() {
                break;
            }

            let task = task.clone();
            let tracker = tracker.clone();
            let worker_file = file.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = task.process(&worker_file).await;
                tracker.handle_file_completion(&worker_file, &outcome).await;
            }));
            scheduled.push(file);
        }

        if self.stop.is_stopped() {
            debug!("{} phase: stop requested, draining {} scheduled files", phase, scheduled.len());
        }

        for (file, result) in scheduled.iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                error!("Worker for {} panicked: {}", file.path.display(), e);
                let outcome = TransformOutcome::Failed { error: format!("worker panicked: {}", e) };
                tracker.handle_file_completion(file, &outcome).await;
            }
        }

        tracker.finish(&tracker.snapshot().await.format_summary());
        Ok(())
    }

    fn log_configuration(&self) {
        let images = &self.config.images;
        let videos = &self.config.videos;

        info!("Output directory: {}", self.output_root().display());
        match self.backup_root() {
            Some(backup) => info!("Backup directory: {}", backup.display()),
            None => info!("Backup disabled"),
        }
        info!(
            "Images: JPEG quality {}, PNG compression {}, convert PNG to JPG: {}",
            images.jpeg_quality, images.png_compression, images.convert_png_to_jpg
        );
        if let Some(bound) = images.max_resolution {
            info!("Images larger than {} will be downscaled", bound);
        }
        info!("Videos: codec {}, CRF {}, preset {}, audio {}", videos.codec, videos.crf, videos.preset, videos.audio_bitrate);
        if let Some(bound) = videos.max_scale {
            info!("Videos larger than {} will be downscaled", bound);
        }
        info!("Workers: {}", self.config.general.workers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_default_roots() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().canonicalize().unwrap();

        let optimizer = MediaOptimizer::new(&input, None, Config::default()).await.unwrap();

        assert_eq!(optimizer.output_root(), input.join("optimized"));
        assert_eq!(optimizer.backup_root(), Some(input.join("originals").as_path()));
        assert!(input.join("optimized").is_dir());
        assert!(input.join("originals").is_dir());
    }

    #[tokio::test]
    async fn test_rejects_output_equal_to_input() {
        let dir = TempDir::new().unwrap();
        let err = MediaOptimizer::new(dir.path(), Some(dir.path()), Config::default()).await.err().unwrap();
        assert!(matches!(err.downcast_ref::<OptimizeError>(), Some(OptimizeError::Config(_))));
    }

    #[tokio::test]
    async fn test_rejects_backup_equal_to_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut config = Config::default();
        config.general.backup_path = Some(out.clone());

        assert!(MediaOptimizer::new(dir.path(), Some(&out), config).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_input_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = MediaOptimizer::new(&dir.path().join("nope"), None, Config::default()).await.err().unwrap();
        assert!(matches!(err.downcast_ref::<OptimizeError>(), Some(OptimizeError::Config(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_touching_disk() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.images.jpeg_quality = 0;

        let err = MediaOptimizer::new(dir.path(), None, config).await.err().unwrap();
        assert!(matches!(err.downcast_ref::<OptimizeError>(), Some(OptimizeError::Validation(_))));
        assert!(!dir.path().join("optimized").exists());
    }

    #[tokio::test]
    async fn test_stop_before_run_is_interruption() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), vec![0u8; 10]).unwrap();
        let mut config = Config::default();
        config.general.keep_originals = false;

        let optimizer = MediaOptimizer::new(dir.path(), None, config).await.unwrap();
        optimizer.stop_signal().stop();

        let err = optimizer.run().await.unwrap_err();
        assert!(OptimizeError::is_interruption(&err));
        let reports: Vec<_> = fs::read_dir(optimizer.output_root()).unwrap().collect();
        assert!(reports.is_empty());
    }
}
