//! # Image Processing Module
//!
//! Questo modulo gestisce l'ottimizzazione delle immagini direttamente in
//! memoria tramite la crate `image` (decode, resize, encode).
//!
//! ## Pipeline per singolo file
//!
//! 1. **Soglia minima**: se `ignore_small` è attivo e il file è sotto
//!    `min_size_kb`, il file viene saltato
//! 2. **Sidecar**: risoluzione del JSON associato (solo informativa)
//! 3. **Path output**: `<output>/<path relativo>`, directory create al volo
//! 4. **Backup**: copia dell'originale e dei sidecar prima di ogni scrittura
//! 5. **Decode + resize**: Lanczos3, mantiene l'aspect ratio, mai upscale
//! 6. **Encode**: formato scelto in base all'estensione sorgente
//! 7. **Sidecar**: copia accanto al file di output (anche se rinominato)
//!
//! ## Politica di formato
//!
//! | Sorgente      | Opzione              | Output              |
//! |---------------|----------------------|---------------------|
//! | `.jpg/.jpeg`  | -                    | JPEG, `jpeg_quality`|
//! | `.png`        | `convert_png_to_jpg` | `.jpg`, JPEG        |
//! | `.png`        | -                    | PNG, `png_compression` |
//! | altri         | -                    | `.jpg`, JPEG        |
//!
//! ## Collisioni di nome
//!
//! Con la rinomina in `.jpg`, `x.png` (o `x.webp`) e `x.jpg` nella stessa
//! cartella finirebbero sullo stesso output. `reserve_outputs` assegna ogni
//! nome una sola volta: vince il file che mantiene il proprio nome, poi il
//! primo in ordine di discovery. Gli altri falliscono con
//! `OptimizeError::OutputConflict` senza scrivere nulla.
//!
//! ## Error handling
//!
//! Decode e encode girano in `spawn_blocking` (lavoro CPU-bound). File
//! corrotti o troncati producono un errore per quel file soltanto; l'output
//! viene scritto tramite file temporaneo + rename, mai parzialmente.

use crate::backup::BackupManager;
use crate::config::{Dimensions, ImageConfig};
use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use crate::media::{MediaFile, TransformOutcome};
use crate::optimizer::path_resolver::PathResolver;
use crate::sidecar::SidecarResolver;
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Encoder selected for an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png { compression: u8 },
}

/// Output format plus the (possibly re-extensioned) destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodePlan {
    pub format: OutputFormat,
    pub destination: PathBuf,
}

/// Handles image optimization
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    settings: ImageConfig,
    paths: PathResolver,
    backup: BackupManager,
    /// Source -> source that owns the output name it would be written to
    conflicts: Arc<HashMap<PathBuf, PathBuf>>,
}

impl ImageProcessor {
    pub fn new(settings: ImageConfig, paths: PathResolver, backup: BackupManager) -> Self {
        Self { settings, paths, backup, conflicts: Arc::default() }
    }

    /// Assign every output name to exactly one source of this run.
    ///
    /// Sources keeping their own name claim it first, renamed ones follow in
    /// discovery order. Names are compared case-insensitively.
    pub fn reserve_outputs(&mut self, images: &[MediaFile]) {
        let (native, renamed): (Vec<_>, Vec<_>) = images
            .iter()
            .map(|file| (file, self.plan(&file.extension, file.path.clone()).destination))
            .partition(|(file, destination)| *destination == file.path);

        let mut owners: HashMap<String, &Path> = HashMap::new();
        for (file, destination) in &native {
            owners.entry(output_key(destination)).or_insert(file.path.as_path());
        }

        let mut conflicts = HashMap::new();
        for (file, destination) in &renamed {
            match owners.entry(output_key(destination)) {
                Entry::Occupied(owner) => {
                    warn!("{} would overwrite the output of {}", file.path.display(), owner.get().display());
                    conflicts.insert(file.path.clone(), owner.get().to_path_buf());
                }
                Entry::Vacant(slot) => {
                    slot.insert(file.path.as_path());
                }
            }
        }

        self.conflicts = Arc::new(conflicts);
    }

    /// Pick the encoder for a source extension and adjust the destination.
    pub fn plan(&self, extension: &str, destination: PathBuf) -> EncodePlan {
        let jpeg = OutputFormat::Jpeg { quality: self.settings.jpeg_quality };

        match extension.to_lowercase().as_str() {
            ".jpg" | ".jpeg" => EncodePlan { format: jpeg, destination },
            ".png" if !self.settings.convert_png_to_jpg => EncodePlan {
                format: OutputFormat::Png { compression: self.settings.png_compression },
                destination,
            },
            _ => EncodePlan { format: jpeg, destination: destination.with_extension("jpg") },
        }
    }

    /// Optimize a single image.
    ///
    /// Errors are returned to the caller, which accounts them as failures.
    pub async fn optimize(&self, file: &MediaFile) -> Result<TransformOutcome> {
        let source = file.path.as_path();
        let original_size = FileManager::file_size(source).await?;

        if self.settings.should_skip(original_size) {
            debug!("Skipping small image: {} ({})", file.file_name(), FileManager::format_size(original_size));
            return Ok(TransformOutcome::Skipped { size: original_size });
        }

        if let Some(owner) = self.conflicts.get(source) {
            return Err(OptimizeError::OutputConflict(owner.clone()).into());
        }

        if let Some(sidecar) = SidecarResolver::find(source).await {
            debug!("Sidecar for {}: {}", file.file_name(), sidecar.display());
        }

        let destination = self.paths.output_path(source)?;
        PathResolver::ensure_parent_dirs(&destination).await?;

        self.backup.preserve(source).await?;

        let plan = self.plan(&file.extension, destination);
        let max_resolution = self.settings.max_resolution;
        let input = source.to_path_buf();
        let format = plan.format;

        let encoded = tokio::task::spawn_blocking(move || Self::reencode(&input, max_resolution, format))
            .await
            .context("Image worker panicked")?
            .with_context(|| format!("Cannot re-encode {}", source.display()))?;

        FileManager::write_atomically(&plan.destination, encoded).await?;
        SidecarResolver::copy_sidecars(source, &plan.destination).await;

        let final_size = FileManager::file_size(&plan.destination).await?;
        debug!(
            "Image optimized: {} {} -> {}",
            file.file_name(),
            FileManager::format_size(original_size),
            FileManager::format_size(final_size)
        );

        Ok(TransformOutcome::Optimized { output: plan.destination, original_size, final_size })
    }

    /// Decode, bound and encode an image entirely in memory.
    fn reencode(source: &Path, max_resolution: Option<Dimensions>, format: OutputFormat) -> Result<Vec<u8>> {
        let mut img = image::io::Reader::open(source)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(OptimizeError::from)?
            .decode()
            .map_err(OptimizeError::from)?;

        if let Some(bound) = max_resolution {
            if bound.is_exceeded_by(img.width(), img.height()) {
                let (w, h) = (img.width(), img.height());
                img = img.resize(bound.width, bound.height, FilterType::Lanczos3);
                debug!("Resized {}: {}x{} -> {}x{}", source.display(), w, h, img.width(), img.height());
            }
        }

        Self::encode(&img, format)
    }

    fn encode(img: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();

        match format {
            OutputFormat::Jpeg { quality } => {
                // JPEG non supporta alpha
                let rgb = img.to_rgb8();
                let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
                encoder.encode_image(&rgb).map_err(OptimizeError::from)?;
            }
            OutputFormat::Png { compression } => {
                let encoder = PngEncoder::new_with_quality(&mut buffer, png_compression(compression), PngFilter::Adaptive);
                encoder
                    .write_image(img.as_bytes(), img.width(), img.height(), img.color())
                    .map_err(OptimizeError::from)?;
            }
        }

        Ok(buffer)
    }
}

fn output_key(destination: &Path) -> String {
    destination.to_string_lossy().to_lowercase()
}

/// Map a zlib-style 0-9 level onto the encoder presets
fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use image::{ImageBuffer, Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        input: PathBuf,
        output: PathBuf,
        backup: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().canonicalize().unwrap();
            let input = root.join("in");
            fs::create_dir_all(&input).unwrap();
            Self { output: root.join("out"), backup: root.join("backup"), input, _dir: dir }
        }

        fn processor(&self, settings: ImageConfig, with_backup: bool) -> ImageProcessor {
            let paths = PathResolver::new(
                self.input.clone(),
                self.output.clone(),
                with_backup.then(|| self.backup.clone()),
            );
            ImageProcessor::new(settings, paths.clone(), BackupManager::new(paths))
        }

        fn media(&self, relative: &str) -> MediaFile {
            let path = self.input.join(relative);
            MediaFile {
                extension: FileManager::extension_of(&path).unwrap(),
                size: fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
                kind: MediaKind::Image,
                path,
            }
        }
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]))
    }

    fn no_threshold() -> ImageConfig {
        ImageConfig { ignore_small: false, ..Default::default() }
    }

    #[test]
    fn test_plan_by_extension() {
        let fx = Fixture::new();
        let dest = PathBuf::from("/out/a.png");

        let keep = fx.processor(no_threshold(), false);
        assert_eq!(keep.plan(".png", dest.clone()).format, OutputFormat::Png { compression: 9 });
        assert_eq!(keep.plan(".png", dest.clone()).destination, dest);
        assert_eq!(keep.plan(".JPEG", PathBuf::from("/out/b.JPEG")).destination, PathBuf::from("/out/b.JPEG"));
        assert_eq!(keep.plan(".webp", PathBuf::from("/out/c.webp")).destination, PathBuf::from("/out/c.jpg"));
        assert_eq!(keep.plan(".webp", PathBuf::from("/out/c.webp")).format, OutputFormat::Jpeg { quality: 85 });

        let convert = fx.processor(ImageConfig { convert_png_to_jpg: true, ..no_threshold() }, false);
        let plan = convert.plan(".png", dest);
        assert_eq!(plan.destination, PathBuf::from("/out/a.jpg"));
        assert_eq!(plan.format, OutputFormat::Jpeg { quality: 85 });
    }

    #[test]
    fn test_png_compression_mapping() {
        assert!(matches!(png_compression(0), CompressionType::Fast));
        assert!(matches!(png_compression(5), CompressionType::Default));
        assert!(matches!(png_compression(9), CompressionType::Best));
    }

    #[tokio::test]
    async fn test_optimize_jpeg_keeps_name_and_mirrors_tree() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.input.join("album")).unwrap();
        gradient(64, 48).save(fx.input.join("album/photo.jpg")).unwrap();

        let outcome = fx.processor(no_threshold(), false).optimize(&fx.media("album/photo.jpg")).await.unwrap();

        let expected = fx.output.join("album/photo.jpg");
        match outcome {
            TransformOutcome::Optimized { output, final_size, .. } => {
                assert_eq!(output, expected);
                assert_eq!(final_size, fs::metadata(&expected).unwrap().len());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let decoded = image::open(&expected).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[tokio::test]
    async fn test_resize_preserves_aspect_and_never_upscales() {
        let fx = Fixture::new();
        gradient(400, 200).save(fx.input.join("wide.png")).unwrap();
        gradient(50, 40).save(fx.input.join("tiny.png")).unwrap();

        let settings = ImageConfig { max_resolution: Some(Dimensions::new(100, 100)), ..no_threshold() };
        let processor = fx.processor(settings, false);
        processor.optimize(&fx.media("wide.png")).await.unwrap();
        processor.optimize(&fx.media("tiny.png")).await.unwrap();

        let wide = image::open(fx.output.join("wide.png")).unwrap();
        assert_eq!((wide.width(), wide.height()), (100, 50));
        let tiny = image::open(fx.output.join("tiny.png")).unwrap();
        assert_eq!((tiny.width(), tiny.height()), (50, 40));
    }

    #[tokio::test]
    async fn test_png_conversion_renames_output_and_sidecar() {
        let fx = Fixture::new();
        gradient(32, 32).save(fx.input.join("shot.png")).unwrap();
        fs::write(fx.input.join("shot.png.json"), br#"{"photoTakenTime":{}}"#).unwrap();

        let settings = ImageConfig { convert_png_to_jpg: true, ..no_threshold() };
        let outcome = fx.processor(settings, false).optimize(&fx.media("shot.png")).await.unwrap();

        assert!(matches!(outcome, TransformOutcome::Optimized { ref output, .. } if output == &fx.output.join("shot.jpg")));
        assert!(!fx.output.join("shot.png").exists());
        assert!(fx.output.join("shot.jpg.json").exists());
        assert_eq!(image::ImageFormat::from_path(fx.output.join("shot.jpg")).unwrap(), image::ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_small_image_is_skipped_untouched() {
        let fx = Fixture::new();
        fs::write(fx.input.join("small.jpg"), vec![0u8; 50 * 1024]).unwrap();

        let outcome = fx.processor(ImageConfig::default(), true).optimize(&fx.media("small.jpg")).await.unwrap();

        assert_eq!(outcome, TransformOutcome::Skipped { size: 50 * 1024 });
        assert!(!fx.output.join("small.jpg").exists());
        assert!(!fx.backup.join("small.jpg").exists());
    }

    #[tokio::test]
    async fn test_backup_written_before_output() {
        let fx = Fixture::new();
        gradient(16, 16).save(fx.input.join("keep.jpg")).unwrap();
        let original = fs::read(fx.input.join("keep.jpg")).unwrap();

        fx.processor(no_threshold(), true).optimize(&fx.media("keep.jpg")).await.unwrap();

        assert_eq!(fs::read(fx.backup.join("keep.jpg")).unwrap(), original);
        assert!(fx.output.join("keep.jpg").exists());
    }

    #[tokio::test]
    async fn test_corrupt_and_truncated_images_fail_without_output() {
        let fx = Fixture::new();
        fs::write(fx.input.join("garbage.jpg"), b"definitely not a jpeg").unwrap();

        gradient(64, 64).save(fx.input.join("cut.png")).unwrap();
        let bytes = fs::read(fx.input.join("cut.png")).unwrap();
        fs::write(fx.input.join("cut.png"), &bytes[..40]).unwrap();

        let processor = fx.processor(no_threshold(), false);
        for name in ["garbage.jpg", "cut.png"] {
            let err = processor.optimize(&fx.media(name)).await.unwrap_err();
            assert!(matches!(err.downcast_ref::<OptimizeError>(), Some(OptimizeError::Image(_))), "{:#}", err);
        }

        assert!(!fx.output.join("garbage.jpg").exists());
        assert!(!fx.output.join("cut.png").exists());
    }

    #[tokio::test]
    async fn test_renamed_sources_never_share_an_output() {
        let fx = Fixture::new();
        gradient(40, 30).save(fx.input.join("x.jpg")).unwrap();
        gradient(20, 10).save(fx.input.join("x.png")).unwrap();
        gradient(24, 24).save(fx.input.join("y.png")).unwrap();
        gradient(12, 12).save_with_format(fx.input.join("y.webp"), image::ImageFormat::Jpeg).unwrap();
        let files: Vec<_> = ["x.jpg", "x.png", "y.png", "y.webp"].iter().map(|name| fx.media(name)).collect();

        let mut processor = fx.processor(ImageConfig { convert_png_to_jpg: true, ..no_threshold() }, true);
        processor.reserve_outputs(&files);

        assert!(processor.optimize(&files[0]).await.is_ok());
        let err = processor.optimize(&files[1]).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<OptimizeError>(), Some(OptimizeError::OutputConflict(owner)) if owner == &files[0].path));
        assert!(processor.optimize(&files[2]).await.is_ok());
        assert!(processor.optimize(&files[3]).await.is_err());

        let x = image::open(fx.output.join("x.jpg")).unwrap();
        assert_eq!((x.width(), x.height()), (40, 30));
        let y = image::open(fx.output.join("y.jpg")).unwrap();
        assert_eq!((y.width(), y.height()), (24, 24));
        assert!(!fx.backup.join("x.png").exists());
    }
}
