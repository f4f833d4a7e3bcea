//! # Media Data Model
//!
//! Tipi condivisi fra discovery, processori e statistiche.
//!
//! - `MediaKind`: categoria del file (immagine o video)
//! - `MediaFile`: file scoperto durante la discovery, consumato una sola volta
//! - `TransformOutcome`: risultato dell'elaborazione di un singolo file

use std::fmt;
use std::path::PathBuf;

/// Category of a discovered file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A media file found under the input root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    /// Lowercase extension including the leading dot
    pub extension: String,
    /// Size at discovery time
    pub size: u64,
    pub kind: MediaKind,
}

impl MediaFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Result of processing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    Optimized {
        output: PathBuf,
        original_size: u64,
        final_size: u64,
    },
    Skipped {
        size: u64,
    },
    Failed {
        error: String,
    },
}

impl TransformOutcome {
    /// Bytes saved by this file (negative when the re-encode grew it)
    pub fn saved_bytes(&self) -> i64 {
        match self {
            Self::Optimized { original_size, final_size, .. } => *original_size as i64 - *final_size as i64,
            _ => 0,
        }
    }
}
