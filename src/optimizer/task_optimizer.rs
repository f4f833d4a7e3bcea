//! # Task Optimizer Module
//!
//! Worker per l'ottimizzazione di singoli file.
//! Separato dall'orchestratore principale per maggiore modularità.
//!
//! Ogni errore di un singolo file viene loggato con path e causa e
//! convertito in `TransformOutcome::Failed`: la run continua sempre.

use crate::{
    cancellation::StopSignal,
    error::OptimizeError,
    image_processor::ImageProcessor,
    media::{MediaFile, MediaKind, TransformOutcome},
    video_processor::VideoProcessor,
};
use tracing::{error, warn};

/// Dispatches one file to the processor for its category
#[derive(Debug, Clone)]
pub struct TaskOptimizer {
    image_processor: ImageProcessor,
    video_processor: VideoProcessor,
    stop: StopSignal,
}

impl TaskOptimizer {
    pub fn new(image_processor: ImageProcessor, video_processor: VideoProcessor, stop: StopSignal) -> Self {
        Self { image_processor, video_processor, stop }
    }

    /// Processa un singolo file
    pub async fn process(&self, file: &MediaFile) -> TransformOutcome {
        let result = match file.kind {
            MediaKind::Image => self.image_processor.optimize(file).await,
            MediaKind::Video => self.video_processor.optimize(file, &self.stop).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                if OptimizeError::is_interruption(&e) {
                    warn!("Interrupted while processing {}", file.path.display());
                } else {
                    error!("Failed to process {} {}: {:#}", file.kind, file.path.display(), e);
                }
                TransformOutcome::Failed { error: format!("{:#}", e) }
            }
        }
    }
}
