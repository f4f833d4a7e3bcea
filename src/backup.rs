//! # Backup Module
//!
//! Copia gli originali (e i loro sidecar) in un albero di backup prima di ogni
//! trasformazione, mantenendo la struttura relativa alla directory di input.
//!
//! Se il backup è disabilitato tutte le operazioni sono no-op.

use crate::file_manager::FileManager;
use crate::optimizer::path_resolver::PathResolver;
use crate::sidecar::SidecarResolver;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Mirrors originals into the backup tree
#[derive(Debug, Clone)]
pub struct BackupManager {
    paths: PathResolver,
}

impl BackupManager {
    pub fn new(paths: PathResolver) -> Self {
        Self { paths }
    }

    pub fn is_enabled(&self) -> bool {
        self.paths.backup_root().is_some()
    }

    /// Copy `source` and its sidecars into the backup tree.
    ///
    /// Returns the backup path, or `None` when backups are disabled.
    /// A failure copying the original is an error; sidecar failures are only logged.
    pub async fn preserve(&self, source: &Path) -> Result<Option<PathBuf>> {
        let Some(backup_path) = self.paths.backup_path(source)? else {
            return Ok(None);
        };

        PathResolver::ensure_parent_dirs(&backup_path).await?;
        FileManager::copy_preserving_times(source, &backup_path)
            .await
            .with_context(|| format!("Backup of {} failed", source.display()))?;
        SidecarResolver::copy_sidecars(source, &backup_path).await;

        debug!("Backed up {} -> {}", source.display(), backup_path.display());
        Ok(Some(backup_path))
    }
}
