//! # Optimizer Module
//!
//! Separa le responsabilità dell'orchestrazione in sottomoduli:
//! - `media_optimizer`: Orchestratore principale (discovery, fasi, report)
//! - `task_optimizer`: Worker per singoli file
//! - `progress_tracker`: Statistiche condivise + progress bar
//! - `path_resolver`: Logica di calcolo path centralizzata

pub mod media_optimizer;
pub mod path_resolver;
pub mod progress_tracker;
pub mod task_optimizer;

pub use media_optimizer::{MediaOptimizer, RunSummary};
pub use path_resolver::PathResolver;
pub use progress_tracker::ProgressTracker;
pub use task_optimizer::TaskOptimizer;
