//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per categorizzare gli errori del batch
//! - Distingue errori fatali (configurazione, dipendenze) da errori per-file
//! - Integra con `thiserror` per automatic error conversion
//! - Permette al main di riconoscere l'interruzione utente con `downcast_ref`
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (file non trovati, permessi, etc.)
//! - `Image`: Errori di decode/encode immagini (file corrotti o troncati)
//! - `OutputConflict`: due sorgenti mappano sullo stesso file di output
//! - `Transcoder`: ffmpeg terminato con errore, con diagnostica stderr
//! - `MissingOutput`: ffmpeg non ha prodotto un file utilizzabile
//! - `MissingDependency`: Tool esterno mancante (ffmpeg)
//! - `Validation`: Parametri di configurazione fuori range
//! - `Config`: Directory di input/output non valide
//! - `Interrupted`: Interruzione richiesta dall'utente (Ctrl-C)
//!
//! ## Esempio:
//! ```rust,ignore
//! if !tool_exists {
//!     return Err(OptimizeError::MissingDependency("ffmpeg".to_string()).into());
//! }
//! ```

use std::path::PathBuf;

/// Custom error types for media optimization
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Output name already taken by {}", .0.display())]
    OutputConflict(PathBuf),

    #[error("Transcoder failed ({status}): {diagnostic}")]
    Transcoder { status: String, diagnostic: String },

    #[error("Transcoder produced no usable output at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Invalid configuration value: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Processing interrupted by user")]
    Interrupted,
}

impl OptimizeError {
    /// Returns true when the error (anywhere in the chain) is a user interruption.
    pub fn is_interruption(error: &anyhow::Error) -> bool {
        error
            .chain()
            .any(|cause| matches!(cause.downcast_ref::<OptimizeError>(), Some(OptimizeError::Interrupted)))
    }
}
