//! # Video Processing Module
//!
//! Questo modulo gestisce la ricompressione dei video tramite ffmpeg.
//!
//! ## Responsabilità:
//! - Costruzione della richiesta di transcodifica (`TranscodeRequest`)
//! - Esecuzione di ffmpeg come processo figlio, con timeout opzionale
//! - Terminazione del processo su richiesta di stop (Ctrl-C)
//! - Scrittura su file temporaneo + rename, mai output parziali
//! - Verifica della disponibilità del binario ffmpeg
//!
//! ## Parametri di ffmpeg:
//! - Codec video e CRF configurabili (default libx264, CRF 23)
//! - Preset x264 (default medium)
//! - Audio AAC a bitrate configurabile, 48 kHz
//! - `-map_metadata 0` per preservare i metadata del container
//! - `-movflags +faststart` per la riproduzione progressiva
//! - Scale filter opzionale che non fa mai upscale
//!
//! ## Controllo qualità (CRF):
//! - 0-17: Visualmente lossless (file grandi)
//! - 18-23: Alta qualità (raccomandato per archivio)
//! - 24-28: Buona qualità, bilanciato
//! - 29+: File piccoli, qualità in calo
//!
//! ## File temporanei:
//! L'output va in `temp_<stem>.XXXXXX.<ext>` nella directory di destinazione.
//! Il `TempPath` elimina il file quando viene rilasciato, quindi qualunque
//! errore (exit code, timeout, stop) non lascia file parziali.

use crate::args;
use crate::backup::BackupManager;
use crate::cancellation::StopSignal;
use crate::config::{Dimensions, VideoConfig};
use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use crate::media::{MediaFile, TransformOutcome};
use crate::optimizer::path_resolver::PathResolver;
use crate::platform::PlatformCommands;
use crate::sidecar::SidecarResolver;
use crate::utils::to_string_vec;
use anyhow::{anyhow, Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Lines of transcoder stderr kept in the error message
const DIAGNOSTIC_TAIL_LINES: usize = 12;

/// Everything needed to run one transcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub codec: String,
    pub crf: u8,
    pub preset: String,
    pub scale: Option<Dimensions>,
    pub audio_bitrate: String,
}

impl TranscodeRequest {
    pub fn new(settings: &VideoConfig, input: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            output,
            codec: settings.codec.clone(),
            crf: settings.crf,
            preset: settings.preset.as_str().to_string(),
            scale: settings.max_scale,
            audio_bitrate: settings.audio_bitrate.clone(),
        }
    }

    /// Scale filter bounding the frame to `bound` without ever upscaling
    pub fn scale_filter(bound: Dimensions) -> String {
        format!(
            "scale='min({},iw)':'min({},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2",
            bound.width, bound.height
        )
    }

    /// Full ffmpeg argument vector
    pub fn to_args(&self) -> Vec<OsString> {
        let head = to_string_vec(["-hide_banner", "-nostdin", "-y", "-loglevel", "error", "-err_detect", "ignore_err", "-i"]);
        let mut args: Vec<OsString> = head.into_iter().map(OsString::from).collect();
        args.push(self.input.clone().into_os_string());

        let mut encode = args!["-c:v", self.codec, "-crf", self.crf, "-preset", self.preset];
        if let Some(bound) = self.scale {
            encode.extend(args!["-vf", Self::scale_filter(bound)]);
        }
        encode.extend(args![
            "-map_metadata", "0",
            "-max_muxing_queue_size", 1024,
            "-movflags", "+faststart",
            "-c:a", "aac",
            "-b:a", self.audio_bitrate,
            "-strict", "experimental",
            "-ar", 48000,
        ]);

        args.extend(encode.into_iter().map(OsString::from));
        args.push(self.output.clone().into_os_string());
        args
    }
}

/// How the transcoder wait ended
enum WaitOutcome {
    Exited(std::io::Result<ExitStatus>),
    Stopped,
    TimedOut,
}

/// Handles video optimization
#[derive(Debug, Clone)]
pub struct VideoProcessor {
    settings: VideoConfig,
    paths: PathResolver,
    backup: BackupManager,
}

impl VideoProcessor {
    pub fn new(settings: VideoConfig, paths: PathResolver, backup: BackupManager) -> Self {
        Self { settings, paths, backup }
    }

    /// Check that the configured transcoder can be executed
    pub async fn check_dependencies(settings: &VideoConfig) -> Result<()> {
        let platform = PlatformCommands::instance();
        if !platform.is_command_available(&settings.ffmpeg_binary).await {
            return Err(OptimizeError::MissingDependency(format!(
                "{} is required for video processing but was not found",
                settings.ffmpeg_binary
            ))
            .into());
        }
        debug!("Transcoder available: {}", settings.ffmpeg_binary);
        Ok(())
    }

    /// Optimize a single video.
    ///
    /// On any failure the temp output is removed and nothing is written at the destination.
    pub async fn optimize(&self, file: &MediaFile, stop: &StopSignal) -> Result<TransformOutcome> {
        let source = file.path.as_path();
        let original_size = FileManager::file_size(source).await?;

        if self.settings.should_skip(original_size) {
            debug!("Skipping small video: {} ({})", file.file_name(), FileManager::format_size(original_size));
            return Ok(TransformOutcome::Skipped { size: original_size });
        }

        if let Some(sidecar) = SidecarResolver::find(source).await {
            debug!("Sidecar for {}: {}", file.file_name(), sidecar.display());
        }

        let destination = self.paths.output_path(source)?;
        PathResolver::ensure_parent_dirs(&destination).await?;

        self.backup.preserve(source).await?;

        let temp = Self::temp_output(&destination)?;
        let request = TranscodeRequest::new(&self.settings, source.to_path_buf(), temp.to_path_buf());
        self.transcode(&request, stop).await?;

        let produced = tokio::fs::metadata(&temp).await.map(|m| m.len()).unwrap_or(0);
        if produced == 0 {
            return Err(OptimizeError::MissingOutput(temp.to_path_buf()).into());
        }

        if tokio::fs::try_exists(&destination).await? {
            tokio::fs::remove_file(&destination)
                .await
                .with_context(|| format!("Cannot replace stale output {}", destination.display()))?;
        }
        temp.persist(&destination)
            .map_err(|e| anyhow!("Failed to move output into {}: {}", destination.display(), e.error))?;
        FileManager::set_output_permissions(&destination)?;

        SidecarResolver::copy_sidecars(source, &destination).await;

        let final_size = FileManager::file_size(&destination).await?;
        debug!(
            "Video optimized: {} {} -> {}",
            file.file_name(),
            FileManager::format_size(original_size),
            FileManager::format_size(final_size)
        );

        Ok(TransformOutcome::Optimized { output: destination, original_size, final_size })
    }

    /// Reserve `temp_<stem>.XXXXXX.<ext>` next to the destination
    fn temp_output(destination: &Path) -> Result<TempPath> {
        let dir = destination
            .parent()
            .ok_or_else(|| anyhow!("Invalid destination: {}", destination.display()))?;
        let stem = destination.file_stem().unwrap_or_default().to_string_lossy();
        let prefix = format!("temp_{}.", stem);
        let suffix = destination
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(dir)
            .with_context(|| format!("Cannot create temp file in {}", dir.display()))?;
        Ok(temp.into_temp_path())
    }

    /// Run the transcoder, racing it against the stop signal and the timeout.
    async fn transcode(&self, request: &TranscodeRequest, stop: &StopSignal) -> Result<()> {
        let binary = PlatformCommands::instance().get_command(&self.settings.ffmpeg_binary);
        let started = Instant::now();

        let mut child = Command::new(&binary)
            .args(request.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow!("Failed to execute {}: {}", binary, e))?;

        let mut stderr = child.stderr.take().ok_or_else(|| anyhow!("Transcoder stderr not captured"))?;
        let diagnostics = tokio::spawn(async move {
            let mut buffer = Vec::new();
            let _ = stderr.read_to_end(&mut buffer).await;
            buffer
        });

        let timeout = self.settings.timeout_secs;
        let deadline = async move {
            match timeout {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };

        let waited = tokio::select! {
            status = child.wait() => WaitOutcome::Exited(status),
            _ = stop.stopped() => WaitOutcome::Stopped,
            _ = deadline => WaitOutcome::TimedOut,
        };

        let status = match waited {
            WaitOutcome::Exited(status) => status.with_context(|| format!("Failed waiting for {}", binary))?,
            WaitOutcome::Stopped => {
                let _ = child.kill().await;
                diagnostics.abort();
                warn!("Transcode of {} cancelled", request.input.display());
                return Err(OptimizeError::Interrupted.into());
            }
            WaitOutcome::TimedOut => {
                let _ = child.kill().await;
                diagnostics.abort();
                return Err(OptimizeError::Transcoder {
                    status: format!("timed out after {}s", timeout.unwrap_or_default()),
                    diagnostic: "process killed".to_string(),
                }
                .into());
            }
        };

        let raw = diagnostics.await.unwrap_or_default();
        let diagnostic = String::from_utf8_lossy(&raw);
        debug!(
            "Transcoder finished in {:.1}s for {} ({})",
            started.elapsed().as_secs_f64(),
            request.input.display(),
            status
        );

        if !status.success() {
            warn!("Transcoder output for {}:\n{}", request.input.display(), diagnostic.trim());
            return Err(OptimizeError::Transcoder {
                status: status.to_string(),
                diagnostic: diagnostic_tail(&diagnostic),
            }
            .into());
        }

        Ok(())
    }
}

/// Last few non-empty lines of the transcoder's stderr
fn diagnostic_tail(diagnostic: &str) -> String {
    let lines: Vec<&str> = diagnostic.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
    let tail = lines[start..].join(" | ");
    if tail.is_empty() {
        "no diagnostic output".to_string()
    } else {
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VideoPreset;

    #[test]
    fn test_scale_filter_never_upscales() {
        assert_eq!(
            TranscodeRequest::scale_filter(Dimensions::new(1920, 1080)),
            "scale='min(1920,iw)':'min(1080,ih)':force_original_aspect_ratio=decrease:force_divisible_by=2"
        );
    }

    #[test]
    fn test_request_args() {
        let settings = VideoConfig {
            crf: 28,
            preset: VideoPreset::Slow,
            audio_bitrate: "96k".into(),
            max_scale: Some(Dimensions::new(1280, 720)),
            ..Default::default()
        };
        let request = TranscodeRequest::new(&settings, PathBuf::from("/in/clip.mov"), PathBuf::from("/out/temp_clip.x.mov"));
        let args: Vec<String> = request.to_args().into_iter().map(|a| a.to_string_lossy().into_owned()).collect();

        let after = |flag: &str| -> String {
            let pos = args.iter().position(|a| a == flag).unwrap();
            args[pos + 1].clone()
        };

        assert_eq!(after("-i"), "/in/clip.mov");
        assert_eq!(after("-c:v"), "libx264");
        assert_eq!(after("-crf"), "28");
        assert_eq!(after("-preset"), "slow");
        assert_eq!(after("-vf"), TranscodeRequest::scale_filter(Dimensions::new(1280, 720)));
        assert_eq!(after("-map_metadata"), "0");
        assert_eq!(after("-movflags"), "+faststart");
        assert_eq!(after("-c:a"), "aac");
        assert_eq!(after("-b:a"), "96k");
        assert_eq!(after("-ar"), "48000");
        assert!(args.contains(&"-nostdin".to_string()));
        assert_eq!(args.last().unwrap(), "/out/temp_clip.x.mov");
    }

    #[test]
    fn test_request_without_scale_has_no_filter() {
        let request = TranscodeRequest::new(&VideoConfig::default(), PathBuf::from("a.mp4"), PathBuf::from("b.mp4"));
        assert!(!request.to_args().iter().any(|a| a == "-vf"));
    }

    #[test]
    fn test_diagnostic_tail() {
        assert_eq!(diagnostic_tail(""), "no diagnostic output");
        let long: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let tail = diagnostic_tail(&long);
        assert!(tail.starts_with("line 18"));
        assert!(tail.ends_with("line 29"));
    }

    #[tokio::test]
    async fn test_missing_transcoder_is_dependency_error() {
        let settings = VideoConfig { ffmpeg_binary: "/nonexistent/bin/ffmpeg".into(), ..Default::default() };
        let err = VideoProcessor::check_dependencies(&settings).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<OptimizeError>(), Some(OptimizeError::MissingDependency(_))));
    }

    #[cfg(unix)]
    mod fake_transcoder {
        use super::*;
        use crate::media::MediaKind;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        const SUCCEEDS: &str = "#!/bin/sh\nfor last; do :; done\nprintf 'encoded video' > \"$last\"\n";
        const CRASHES: &str =
            "#!/bin/sh\nfor last; do :; done\nprintf 'partial' > \"$last\"\necho 'simulated encoder crash' >&2\nexit 1\n";
        const WRITES_NOTHING: &str = "#!/bin/sh\nexit 0\n";
        const HANGS: &str = "#!/bin/sh\nexec sleep 30\n";

        struct Fixture {
            _dir: TempDir,
            root: PathBuf,
        }

        impl Fixture {
            fn new() -> Self {
                let dir = TempDir::new().unwrap();
                let root = dir.path().canonicalize().unwrap();
                fs::create_dir_all(root.join("in/trip")).unwrap();
                fs::write(root.join("in/trip/clip.mp4"), vec![7u8; 4096]).unwrap();
                fs::write(root.join("in/trip/clip.mp4.json"), b"{}").unwrap();
                Self { _dir: dir, root }
            }

            fn script(&self, body: &str) -> String {
                let path = self.root.join("fake-ffmpeg.sh");
                fs::write(&path, body).unwrap();
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
                path.to_string_lossy().into_owned()
            }

            fn processor(&self, script: &str, timeout_secs: Option<u64>) -> VideoProcessor {
                let settings = VideoConfig {
                    ignore_small: false,
                    ffmpeg_binary: self.script(script),
                    timeout_secs,
                    ..Default::default()
                };
                let paths = PathResolver::new(self.root.join("in"), self.root.join("out"), None);
                VideoProcessor::new(settings, paths.clone(), BackupManager::new(paths))
            }

            fn media(&self) -> MediaFile {
                MediaFile {
                    path: self.root.join("in/trip/clip.mp4"),
                    extension: ".mp4".into(),
                    size: 4096,
                    kind: MediaKind::Video,
                }
            }

            fn output_entries(&self) -> Vec<String> {
                match fs::read_dir(self.root.join("out/trip")) {
                    Ok(entries) => entries.map(|e| e.unwrap().file_name().to_string_lossy().into_owned()).collect(),
                    Err(_) => Vec::new(),
                }
            }
        }

        #[tokio::test]
        async fn test_successful_transcode_replaces_temp_with_destination() {
            let fx = Fixture::new();
            let outcome = fx.processor(SUCCEEDS, None).optimize(&fx.media(), &StopSignal::new()).await.unwrap();

            let destination = fx.root.join("out/trip/clip.mp4");
            assert_eq!(
                outcome,
                TransformOutcome::Optimized { output: destination.clone(), original_size: 4096, final_size: 13 }
            );
            assert_eq!(fs::read(&destination).unwrap(), b"encoded video");
            let mut entries = fx.output_entries();
            entries.sort();
            assert_eq!(entries, vec!["clip.mp4", "clip.mp4.json"]);
        }

        #[tokio::test]
        async fn test_failed_transcode_leaves_no_files() {
            let fx = Fixture::new();
            let err = fx.processor(CRASHES, None).optimize(&fx.media(), &StopSignal::new()).await.unwrap_err();

            match err.downcast_ref::<OptimizeError>() {
                Some(OptimizeError::Transcoder { diagnostic, .. }) => assert!(diagnostic.contains("simulated encoder crash")),
                other => panic!("unexpected error {:?}", other),
            }
            assert!(fx.output_entries().is_empty());
        }

        #[tokio::test]
        async fn test_empty_output_is_missing_output() {
            let fx = Fixture::new();
            let err = fx.processor(WRITES_NOTHING, None).optimize(&fx.media(), &StopSignal::new()).await.unwrap_err();

            assert!(matches!(err.downcast_ref::<OptimizeError>(), Some(OptimizeError::MissingOutput(_))));
            assert!(fx.output_entries().is_empty());
        }

        #[tokio::test]
        async fn test_stop_kills_running_transcoder() {
            let fx = Fixture::new();
            let processor = fx.processor(HANGS, None);
            let stop = StopSignal::new();

            let trigger = {
                let stop = stop.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    stop.stop();
                })
            };

            let started = Instant::now();
            let err = processor.optimize(&fx.media(), &stop).await.unwrap_err();
            trigger.await.unwrap();

            assert!(OptimizeError::is_interruption(&err));
            assert!(started.elapsed() < Duration::from_secs(10));
            assert!(fx.output_entries().is_empty());
        }

        #[tokio::test]
        async fn test_timeout_kills_transcoder() {
            let fx = Fixture::new();
            let started = Instant::now();
            let err = fx.processor(HANGS, Some(1)).optimize(&fx.media(), &StopSignal::new()).await.unwrap_err();

            assert!(matches!(err.downcast_ref::<OptimizeError>(), Some(OptimizeError::Transcoder { .. })));
            assert!(started.elapsed() < Duration::from_secs(10));
            assert!(fx.output_entries().is_empty());
        }

        #[tokio::test]
        async fn test_small_video_skipped_without_running_transcoder() {
            let fx = Fixture::new();
            let mut processor = fx.processor(CRASHES, None);
            processor.settings.ignore_small = true;

            let outcome = processor.optimize(&fx.media(), &StopSignal::new()).await.unwrap();
            assert_eq!(outcome, TransformOutcome::Skipped { size: 4096 });
            assert!(fx.output_entries().is_empty());
        }
    }
}
