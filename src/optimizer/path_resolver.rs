//! # Path Resolution Module
//!
//! Centralizza tutta la logica di calcolo dei path di output e di backup.
//! Evita duplicazione tra ImageProcessor, VideoProcessor e BackupManager.
//!
//! Ogni path di destinazione è `<root> / <path relativo all'input>`.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Roots of a run and the mirroring between them
#[derive(Debug, Clone)]
pub struct PathResolver {
    input_root: PathBuf,
    output_root: PathBuf,
    backup_root: Option<PathBuf>,
}

impl PathResolver {
    pub fn new(input_root: PathBuf, output_root: PathBuf, backup_root: Option<PathBuf>) -> Self {
        Self { input_root, output_root, backup_root }
    }

    pub fn input_root(&self) -> &Path {
        &self.input_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn backup_root(&self) -> Option<&Path> {
        self.backup_root.as_deref()
    }

    /// Path of `input_path` relative to the input root
    pub fn relative_path<'a>(&self, input_path: &'a Path) -> Result<&'a Path> {
        input_path.strip_prefix(&self.input_root).map_err(|_| {
            anyhow::anyhow!(
                "{} is not inside input directory {}",
                input_path.display(),
                self.input_root.display()
            )
        })
    }

    /// Calcola il path di output per un file dato
    pub fn output_path(&self, input_path: &Path) -> Result<PathBuf> {
        let result = self.output_root.join(self.relative_path(input_path)?);
        debug!("Resolved output path: {} -> {}", input_path.display(), result.display());
        Ok(result)
    }

    /// Backup location for `input_path`, if backups are enabled
    pub fn backup_path(&self, input_path: &Path) -> Result<Option<PathBuf>> {
        match self.backup_root {
            Some(ref root) => Ok(Some(root.join(self.relative_path(input_path)?))),
            None => Ok(None),
        }
    }

    /// Crea le directory parent se necessario
    pub async fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create parent directories for {}: {}", path.display(), e))?;
        }
        Ok(())
    }
}
