//! # Optimization Report
//!
//! Snapshot finale delle statistiche, stampato su stdout e salvato come
//! `optimization_report_<YYYYmmdd_HHMMSS>.txt` nella directory di output.
//! Console e file ricevono lo stesso testo.

use crate::progress::RunStatistics;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

const RULE_WIDTH: usize = 50;

/// Write-once summary of a finished run
#[derive(Debug, Clone)]
pub struct Report {
    pub stats: RunStatistics,
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub backup_root: Option<PathBuf>,
    pub generated_at: DateTime<Local>,
}

impl Report {
    pub fn new(stats: RunStatistics, input_root: &Path, output_root: &Path, backup_root: Option<&Path>) -> Self {
        Self {
            stats,
            input_root: input_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            backup_root: backup_root.map(Path::to_path_buf),
            generated_at: Local::now(),
        }
    }

    /// File name derived from the generation timestamp
    pub fn file_name(&self) -> String {
        format!("optimization_report_{}.txt", self.generated_at.format("%Y%m%d_%H%M%S"))
    }

    pub fn render(&self) -> String {
        let s = &self.stats;
        let mut out = String::new();

        // write! su String non fallisce
        let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
        let _ = writeln!(out, "MEDIA OPTIMIZATION REPORT");
        let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
        let _ = writeln!(out, "Date: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "Input directory: {}", self.input_root.display());
        let _ = writeln!(out, "Output directory: {}", self.output_root.display());
        if let Some(ref backup) = self.backup_root {
            let _ = writeln!(out, "Backup directory: {}", backup.display());
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Processing time: {:.2} seconds", s.elapsed_secs());
        let _ = writeln!(out, "Files processed: {}", s.total_files());
        let _ = writeln!(out, "  - Images optimized: {} of {}", s.images.optimized, s.images.total);
        let _ = writeln!(out, "  - Videos optimized: {} of {}", s.videos.optimized, s.videos.total);
        let _ = writeln!(out, "  - Files skipped: {}", s.skipped());
        let _ = writeln!(out, "  - Errors: {}", s.errors());
        let _ = writeln!(out, "Original size: {:.2} MB", s.original_mb());
        let _ = writeln!(out, "Final size: {:.2} MB", s.final_mb());
        let _ = writeln!(out, "Space saved: {:.2} MB ({:.2}%)", s.saved_mb(), s.reduction_percent());
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
        out
    }

    /// Persist the rendering into `dir`, returning the report path
    pub async fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, self.render())
            .await
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report saved to: {}", path.display());
        Ok(path)
    }
}
