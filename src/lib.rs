//! # Media Archive Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per i test di integrazione
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione a gruppi (images, videos, general) e validazione
//! - `error`: Tipi di errore custom
//! - `media`: Modello dati condiviso (MediaFile, TransformOutcome)
//! - `file_manager`: Operazioni sui file e discovery media
//! - `sidecar`: Risoluzione e copia dei JSON di metadata
//! - `backup`: Copia degli originali prima della trasformazione
//! - `image_processor`: Ottimizzazione immagini (JPEG/PNG/WebP)
//! - `video_processor`: Ricompressione video con ffmpeg
//! - `optimizer`: Orchestratore a due fasi con worker pool
//! - `progress`: Progress bar e statistiche della run
//! - `report`: Report finale su console e su file
//! - `cancellation`: Segnale di stop per Ctrl-C
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use media_archive_optimizer::{Config, MediaOptimizer};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let optimizer = MediaOptimizer::new(Path::new("/takeout"), None, Config::default()).await?;
//! let summary = optimizer.run().await?;
//! println!("{}", summary.stats.format_summary());
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod cancellation;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod media;
pub mod optimizer;
pub mod platform;
pub mod progress;
pub mod report;
pub mod sidecar;
pub mod utils;
pub mod video_processor;

pub use cancellation::StopSignal;
pub use config::Config;
pub use error::OptimizeError;
pub use media::{MediaFile, MediaKind, TransformOutcome};
pub use optimizer::{MediaOptimizer, RunSummary};
pub use progress::RunStatistics;
