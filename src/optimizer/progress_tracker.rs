//! # Progress Tracking Module
//!
//! Unifica statistiche condivise e progress bar in un singolo tracker
//! clonabile fra i worker. Ogni completamento aggiorna le statistiche con
//! una sola acquisizione del lock.

use crate::{
    file_manager::FileManager,
    media::{MediaFile, TransformOutcome},
    progress::{ProgressManager, RunStatistics},
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Thread-safe tracker shared by the workers of one phase
#[derive(Clone)]
pub struct ProgressTracker {
    stats: Arc<Mutex<RunStatistics>>,
    progress_manager: ProgressManager,
}

impl ProgressTracker {
    pub fn new(stats: Arc<Mutex<RunStatistics>>, progress_manager: ProgressManager) -> Self {
        Self { stats, progress_manager }
    }

    /// Account a finished file and advance the bar
    pub async fn handle_file_completion(&self, file: &MediaFile, outcome: &TransformOutcome) {
        self.stats.lock().await.record(file.kind, outcome);

        let message = match outcome {
            TransformOutcome::Optimized { original_size, final_size, .. } => format!(
                "[OK] {}: {:.2}% saved",
                file.file_name(),
                FileManager::calculate_reduction(*original_size, *final_size)
            ),
            TransformOutcome::Skipped { .. } => format!("[SKIP] {}: below size threshold", file.file_name()),
            TransformOutcome::Failed { .. } => format!("[ERROR] {}", file.file_name()),
        };
        self.progress_manager.update(&message);
    }

    /// Finalizza progress bar
    pub fn finish(&self, summary: &str) {
        self.progress_manager.finish(summary);
    }

    /// Copy of the current statistics
    pub async fn snapshot(&self) -> RunStatistics {
        self.stats.lock().await.clone()
    }
}
