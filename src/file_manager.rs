//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file e la discovery di media.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di file media nella directory di input
//! - Classificazione (immagine vs video) tramite le estensioni configurate
//! - Esclusione dei file sidecar (`.json`, `.metadata`) dalla discovery
//! - Esclusione delle directory di output e backup quando annidate nell'input
//! - Copie che preservano la data di modifica e scritture atomiche
//! - Formattazione human-readable delle dimensioni
//!
//! ## Ordine di visita:
//! Deterministico: le entry di ogni directory sono ordinate per nome.
//!
//! ## Esempio:
//! ```rust,ignore
//! let found = FileManager::discover(&input, &config.general, &[output_dir])?;
//! println!("{} images, {} videos", found.images.len(), found.videos.len());
//! ```

use crate::config::GeneralConfig;
use crate::error::OptimizeError;
use crate::media::{MediaFile, MediaKind};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Name suffixes that mark sidecar data rather than media
const SIDECAR_SUFFIXES: &[&str] = &[".json", ".metadata"];

/// Result of a discovery pass, split by category
#[derive(Debug, Default)]
pub struct DiscoveredMedia {
    pub images: Vec<MediaFile>,
    pub videos: Vec<MediaFile>,
}

impl DiscoveredMedia {
    pub fn total(&self) -> usize {
        self.images.len() + self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Get the current size of a file
    pub async fn file_size(path: &Path) -> Result<u64> {
        let metadata = fs::metadata(path)
            .await
            .map_err(OptimizeError::from)
            .with_context(|| format!("Failed to read metadata of {}", path.display()))?;
        Ok(metadata.len())
    }

    /// Find and classify all media files below `root`.
    ///
    /// Directories listed in `excluded` (already canonical) are not descended into.
    pub fn discover(root: &Path, general: &GeneralConfig, excluded: &[PathBuf]) -> Result<DiscoveredMedia> {
        let mut found = DiscoveredMedia::default();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let skip = entry.depth() > 0 && entry.file_type().is_dir() && excluded.iter().any(|ex| entry.path() == ex);
                if skip {
                    debug!("Skipping excluded directory: {}", entry.path().display());
                }
                !skip
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read directory entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if Self::is_sidecar(path) {
                continue;
            }

            let Some(kind) = Self::classify(path, general) else {
                continue;
            };

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    // Il processore rilegge la dimensione e registra l'errore per il file
                    warn!("Cannot read size of {}: {}", path.display(), e);
                    0
                }
            };

            let media = MediaFile {
                path: path.to_path_buf(),
                extension: Self::extension_of(path).unwrap_or_default(),
                size,
                kind,
            };

            match kind {
                MediaKind::Image => found.images.push(media),
                MediaKind::Video => found.videos.push(media),
            }
        }

        Ok(found)
    }

    /// Check if a file is sidecar data (`*.json`, `*.metadata`)
    pub fn is_sidecar(path: &Path) -> bool {
        path.file_name()
            .map(|name| {
                let name = name.to_string_lossy().to_lowercase();
                SIDECAR_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
            })
            .unwrap_or(false)
    }

    /// Lowercase extension with leading dot
    pub fn extension_of(path: &Path) -> Option<String> {
        path.extension().map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
    }

    /// Classify a path using the configured extension lists
    pub fn classify(path: &Path, general: &GeneralConfig) -> Option<MediaKind> {
        let ext = Self::extension_of(path)?;
        if general.image_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            Some(MediaKind::Image)
        } else if general.video_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Copy a file and carry over its modification time.
    ///
    /// The copy inherits the source permissions, so a previous read-only copy is
    /// removed first. The timestamp is best-effort.
    pub async fn copy_preserving_times(source: &Path, destination: &Path) -> Result<u64> {
        let modified = fs::metadata(source)
            .await
            .with_context(|| format!("Failed to read metadata of {}", source.display()))?
            .modified()
            .ok();

        match fs::remove_file(destination).await {
            Ok(()) => debug!("Replacing existing copy at {}", destination.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!("Cannot remove existing {}: {}", destination.display(), e),
        }

        let bytes = fs::copy(source, destination)
            .await
            .with_context(|| format!("Failed to copy {} to {}", source.display(), destination.display()))?;

        if let Some(modified) = modified {
            Self::set_modified_time(destination, modified).await;
        }

        Ok(bytes)
    }

    /// Set the modification time through a read-only handle; failures are only logged.
    async fn set_modified_time(path: &Path, modified: std::time::SystemTime) {
        let result = match fs::File::open(path).await {
            Ok(file) => file.into_std().await.set_modified(modified),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!("Cannot preserve modification time of {}: {}", path.display(), e);
        }
    }

    /// Write `data` to a temp file next to `destination`, then rename it into place.
    pub async fn write_atomically(destination: &Path, data: Vec<u8>) -> Result<()> {
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            use std::io::Write;

            let dir = destination
                .parent()
                .ok_or_else(|| anyhow::anyhow!("Invalid destination: {}", destination.display()))?;
            let mut temp = tempfile::Builder::new().prefix(".temp_").tempfile_in(dir)?;
            temp.write_all(&data)?;
            temp.as_file().sync_all()?;
            temp.persist(&destination)
                .map_err(|e| anyhow::anyhow!("Failed to move output into {}: {}", destination.display(), e.error))?;
            Self::set_output_permissions(&destination)?;
            Ok(())
        })
        .await?
    }

    /// Temp files are created owner-only; finished outputs get regular file permissions.
    pub fn set_output_permissions(path: &Path) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))?;
        }
        #[cfg(not(unix))]
        let _ = path;
        Ok(())
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
