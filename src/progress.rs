//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche della run.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif`, una per fase (immagini, video)
//! - Contatori per categoria: totale, ottimizzati, saltati, falliti
//! - Totali in byte (originali, finali, risparmiati) sui soli file ottimizzati
//! - Timestamp di inizio/fine e tempo trascorso
//!
//! ## Invarianti:
//! - Per categoria: `optimized + skipped + failed == total` a fine run
//! - `original_bytes - final_bytes == saved_bytes` (i file saltati o falliti
//!   non contribuiscono a nessuno dei totali)
//! - `saved_bytes` è con segno: un re-encode che ingrandisce il file produce
//!   un risparmio negativo
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:02:15] [========================================>] 150/150 (100%) photo.jpg: 45.20% saved
//! ```

use crate::media::{MediaKind, TransformOutcome};
use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Manages progress reporting for one phase
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64, phase: &str) -> Self {
        let bar = ProgressBar::new(total_files);

        let style = ProgressStyle::default_bar()
            .template("{prefix:.bold} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_prefix(phase.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Progress bar that draws nothing (tests, non-interactive runs)
    pub fn hidden() -> Self {
        Self { bar: ProgressBar::hidden() }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Counters for one media category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub total: usize,
    pub optimized: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CategoryStats {
    /// Files that reached a final state
    pub fn processed(&self) -> usize {
        self.optimized + self.skipped + self.failed
    }
}

/// Aggregated statistics for a whole run
#[derive(Debug, Clone)]
pub struct RunStatistics {
    pub images: CategoryStats,
    pub videos: CategoryStats,
    pub original_bytes: u64,
    pub final_bytes: u64,
    pub saved_bytes: i64,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStatistics {
    pub fn new() -> Self {
        Self {
            images: CategoryStats::default(),
            videos: CategoryStats::default(),
            original_bytes: 0,
            final_bytes: 0,
            saved_bytes: 0,
            started_at: Local::now(),
            finished_at: None,
        }
    }

    /// Record discovery totals. Called once per run.
    pub fn record_discovery(&mut self, images: usize, videos: usize) {
        self.images.total = images;
        self.videos.total = videos;
    }

    fn category_mut(&mut self, kind: MediaKind) -> &mut CategoryStats {
        match kind {
            MediaKind::Image => &mut self.images,
            MediaKind::Video => &mut self.videos,
        }
    }

    /// Account one finished file
    pub fn record(&mut self, kind: MediaKind, outcome: &TransformOutcome) {
        match outcome {
            TransformOutcome::Optimized { original_size, final_size, .. } => {
                self.category_mut(kind).optimized += 1;
                self.original_bytes += original_size;
                self.final_bytes += final_size;
                self.saved_bytes += outcome.saved_bytes();
            }
            TransformOutcome::Skipped { .. } => self.category_mut(kind).skipped += 1,
            TransformOutcome::Failed { .. } => self.category_mut(kind).failed += 1,
        }
    }

    pub fn total_files(&self) -> usize {
        self.images.total + self.videos.total
    }

    pub fn optimized(&self) -> usize {
        self.images.optimized + self.videos.optimized
    }

    pub fn skipped(&self) -> usize {
        self.images.skipped + self.videos.skipped
    }

    pub fn errors(&self) -> usize {
        self.images.failed + self.videos.failed
    }

    /// `saved / original * 100`, 0 when nothing was optimized
    pub fn reduction_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            0.0
        } else {
            self.saved_bytes as f64 / self.original_bytes as f64 * 100.0
        }
    }

    pub fn original_mb(&self) -> f64 {
        self.original_bytes as f64 / BYTES_PER_MB
    }

    pub fn final_mb(&self) -> f64 {
        self.final_bytes as f64 / BYTES_PER_MB
    }

    pub fn saved_mb(&self) -> f64 {
        self.saved_bytes as f64 / BYTES_PER_MB
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }

    /// Seconds between start and finish (or now, if still running)
    pub fn elapsed_secs(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Local::now);
        (end - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Optimized: {} | Skipped: {} | Errors: {} | Saved: {:.2} MB ({:.2}%)",
            self.images.processed() + self.videos.processed(),
            self.optimized(),
            self.skipped(),
            self.errors(),
            self.saved_mb(),
            self.reduction_percent()
        )
    }
}
