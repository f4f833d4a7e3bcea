//! # Sidecar Metadata Module
//!
//! Gestisce i file JSON di metadata che accompagnano ogni media nelle
//! esportazioni (es. Google Takeout).
//!
//! ## Convenzioni (in ordine di priorità):
//! 1. `<nome>.<ext>.supplemental-metadata.json` (forma lunga)
//! 2. `<nome>.<ext>.json` (forma corta)
//!
//! Il contenuto non viene mai interpretato: i sidecar sono copiati così come sono.
//! Tutte le operazioni sono best-effort: un errore produce un warning e il
//! file media viene elaborato comunque.

use crate::file_manager::FileManager;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Naming conventions for sidecar files, in lookup priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarConvention {
    /// `<file>.supplemental-metadata.json`
    Supplemental,
    /// `<file>.json`
    Plain,
}

impl SidecarConvention {
    pub const ALL: [SidecarConvention; 2] = [Self::Supplemental, Self::Plain];

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Supplemental => ".supplemental-metadata.json",
            Self::Plain => ".json",
        }
    }

    /// Sidecar path for `media` under this convention
    pub fn path_for(&self, media: &Path) -> PathBuf {
        let mut name: OsString = media.as_os_str().to_owned();
        name.push(self.suffix());
        PathBuf::from(name)
    }
}

/// Resolves and copies sidecar files
pub struct SidecarResolver;

impl SidecarResolver {
    /// Find the sidecar of `media`, long-form convention first.
    pub async fn find(media: &Path) -> Option<PathBuf> {
        for convention in SidecarConvention::ALL {
            let candidate = convention.path_for(media);
            match tokio::fs::try_exists(&candidate).await {
                Ok(true) => return Some(candidate),
                Ok(false) => {}
                Err(e) => {
                    warn!("Cannot check sidecar {}: {}", candidate.display(), e);
                    return None;
                }
            }
        }
        None
    }

    /// Copy every sidecar that exists next to `source` so it sits next to `destination`.
    ///
    /// Returns the number of sidecars copied. Failures are logged, never propagated.
    pub async fn copy_sidecars(source: &Path, destination: &Path) -> usize {
        let mut copied = 0;

        for convention in SidecarConvention::ALL {
            let from = convention.path_for(source);
            if !tokio::fs::try_exists(&from).await.unwrap_or(false) {
                continue;
            }

            let to = convention.path_for(destination);
            match FileManager::copy_preserving_times(&from, &to).await {
                Ok(_) => {
                    debug!("Copied sidecar {} -> {}", from.display(), to.display());
                    copied += 1;
                }
                Err(e) => warn!("Failed to copy sidecar {}: {:#}", from.display(), e),
            }
        }

        copied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_convention_paths() {
        let media = Path::new("/photos/IMG_0001.jpg");
        assert_eq!(
            SidecarConvention::Supplemental.path_for(media),
            PathBuf::from("/photos/IMG_0001.jpg.supplemental-metadata.json")
        );
        assert_eq!(SidecarConvention::Plain.path_for(media), PathBuf::from("/photos/IMG_0001.jpg.json"));
    }

    #[tokio::test]
    async fn test_find_prefers_long_form() {
        let dir = TempDir::new().unwrap();
        let media = dir.path().join("IMG.jpg");
        fs::write(&media, b"x").unwrap();
        assert_eq!(SidecarResolver::find(&media).await, None);

        fs::write(dir.path().join("IMG.jpg.json"), b"{}").unwrap();
        assert_eq!(SidecarResolver::find(&media).await, Some(dir.path().join("IMG.jpg.json")));

        fs::write(dir.path().join("IMG.jpg.supplemental-metadata.json"), b"{}").unwrap();
        assert_eq!(
            SidecarResolver::find(&media).await,
            Some(dir.path().join("IMG.jpg.supplemental-metadata.json"))
        );
    }

    #[tokio::test]
    async fn test_copy_sidecars_copies_existing_conventions_only() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let media = src.path().join("clip.mp4");
        fs::write(&media, b"x").unwrap();
        fs::write(src.path().join("clip.mp4.supplemental-metadata.json"), br#"{"title":"clip"}"#).unwrap();

        let copied = SidecarResolver::copy_sidecars(&media, &dst.path().join("clip.mp4")).await;

        assert_eq!(copied, 1);
        assert_eq!(
            fs::read(dst.path().join("clip.mp4.supplemental-metadata.json")).unwrap(),
            br#"{"title":"clip"}"#
        );
        assert!(!dst.path().join("clip.mp4.json").exists());
    }

    #[tokio::test]
    async fn test_copy_sidecars_follows_renamed_destination() {
        let src = TempDir::new().unwrap();
        let media = src.path().join("shot.png");
        fs::write(&media, b"x").unwrap();
        fs::write(src.path().join("shot.png.json"), b"{}").unwrap();

        let copied = SidecarResolver::copy_sidecars(&media, &src.path().join("out/shot.jpg")).await;

        // parent directory missing: best-effort, nothing copied, no panic
        assert_eq!(copied, 0);

        fs::create_dir_all(src.path().join("out")).unwrap();
        let copied = SidecarResolver::copy_sidecars(&media, &src.path().join("out/shot.jpg")).await;
        assert_eq!(copied, 1);
        assert!(src.path().join("out/shot.jpg.json").exists());
    }
}
