// Braille Orchestrator: image bytes to Braille text, Spanish text and annotated image

use anyhow::{Context, Result};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

use crate::core::config::{Config, DetectorOverrides};
use crate::core::errors::{ConfigError, InputError, PipelineError, PipelineResult};
use crate::core::types::{CellDetection, ProcessOutcome, Transliteration};
use crate::services::decoder::{self, UNRECOGNIZED_CELL};
use crate::services::detection::{self, CellDetector};
use crate::services::translation::{HttpTranslator, TextTranslator, Transliterator};
use crate::utils::{image_ops, Metrics};

/// Everything read from one image
#[derive(Debug, Clone)]
pub struct BrailleReading {
    pub braille: String,
    pub transliteration: Transliteration,
    pub detection: CellDetection,
}

/// Main workflow coordinator
pub struct BrailleOrchestrator {
    config: Arc<Config>,
    detector: Arc<CellDetector>,
    transliterator: Arc<Transliterator>,
    detection_semaphore: Arc<Semaphore>,
    metrics: Metrics,
}

impl BrailleOrchestrator {
    /// Create the orchestrator, wiring the HTTP translator when one is configured
    #[instrument(skip(config, metrics))]
    pub fn new(config: Arc<Config>, metrics: Metrics) -> Result<Self> {
        let translator = HttpTranslator::from_config(&config.translator, Some(metrics.clone()))
            .context("Failed to create translation client")?
            .map(|t| Arc::new(t) as Arc<dyn TextTranslator>);

        match config.translator.endpoint {
            Some(ref endpoint) => info!(
                "Translator: {} at {} (timeout {:?})",
                config.translator.model, endpoint, config.translator.timeout
            ),
            None => info!("Translator: none, using table transliteration only"),
        }

        let transliterator = Transliterator::new(translator, &config.translator, Some(metrics.clone()));
        let orchestrator = Self::with_transliterator(config, transliterator, metrics)?;

        info!(
            "✓ Ready (detections: {} concurrent)",
            orchestrator.config.max_concurrent_detections()
        );
        Ok(orchestrator)
    }

    /// Create with a caller-supplied transliterator
    pub fn with_transliterator(
        config: Arc<Config>,
        transliterator: Transliterator,
        metrics: Metrics,
    ) -> Result<Self, ConfigError> {
        let detector = CellDetector::new(config.detector.clone())?;
        let detection_semaphore = Arc::new(Semaphore::new(config.max_concurrent_detections()));

        Ok(Self {
            config,
            detector: Arc::new(detector),
            transliterator: Arc::new(transliterator),
            detection_semaphore,
            metrics,
        })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn transliterator(&self) -> &Transliterator {
        &self.transliterator
    }

    fn detector_for(&self, overrides: Option<&DetectorOverrides>) -> PipelineResult<Arc<CellDetector>> {
        match overrides {
            Some(o) if !o.is_empty() => {
                let config = self
                    .detector
                    .config()
                    .with_overrides(o)
                    .map_err(|e| InputError::InvalidOverrides(e.to_string()))?;
                let detector =
                    CellDetector::new(config).map_err(|e| InputError::InvalidOverrides(e.to_string()))?;
                Ok(Arc::new(detector))
            }
            _ => Ok(Arc::clone(&self.detector)),
        }
    }

    /// Detect cells on the blocking pool, bounded by the detection semaphore
    async fn detect(&self, detector: Arc<CellDetector>, img: DynamicImage) -> PipelineResult<CellDetection> {
        let _permit = Arc::clone(&self.detection_semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::QueueClosed)?;

        tokio::task::spawn_blocking(move || detector.detect(&img))
            .await
            .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))
    }

    /// Read one decoded image
    #[instrument(skip(self, img, overrides), fields(width = img.width(), height = img.height()))]
    pub async fn read_image(
        &self,
        img: DynamicImage,
        overrides: Option<&DetectorOverrides>,
    ) -> PipelineResult<BrailleReading> {
        if let Err(e) = detection::validate_image(&img) {
            self.metrics.record_image_failure();
            return Err(e.into());
        }
        let detector = self.detector_for(overrides)?;

        let start = Instant::now();
        let detection = self.detect(detector, img).await?;
        let braille = decoder::decode_cells(&detection.cells);
        let unrecognized = braille.chars().filter(|&c| c == UNRECOGNIZED_CELL).count();
        self.metrics.record_image(
            detection.cells.len(),
            unrecognized,
            detection.notes.len(),
            start.elapsed(),
        );

        debug!(
            "Decoded {} cells ({} unrecognized, {} blobs dropped)",
            detection.cells.len(),
            unrecognized,
            detection.notes.len()
        );

        let transliteration = self.transliterator.transliterate(&braille).await;

        Ok(BrailleReading {
            braille,
            transliteration,
            detection,
        })
    }

    /// Full request: decode bytes, read, encode the annotated image
    #[instrument(skip(self, bytes, overrides), fields(bytes = bytes.len()))]
    pub async fn process_bytes(
        &self,
        bytes: Vec<u8>,
        overrides: Option<&DetectorOverrides>,
    ) -> PipelineResult<ProcessOutcome> {
        let start = Instant::now();

        let img = match image_ops::load_image_from_memory_async(bytes).await {
            Ok(img) => img,
            Err(e) => {
                self.metrics.record_image_failure();
                return Err(e);
            }
        };

        let reading = self.read_image(img, overrides).await?;
        let cells = reading.detection.cells.len();
        let dots = reading.detection.dots.len();
        let processed_image = image_ops::encode_jpeg_base64_async(reading.detection.annotated).await?;

        let processing_time = start.elapsed().as_secs_f64();
        info!(
            "Read {} cells from {} dots in {:.2}s",
            cells, dots, processing_time
        );

        Ok(ProcessOutcome {
            braille: reading.braille,
            spanish: reading.transliteration.text,
            processed_image,
            processing_time,
            cells,
            dots,
            enhanced: reading.transliteration.enhanced,
            notes: reading.detection.notes,
            success: true,
        })
    }

    /// Transliterate a Braille string without an image
    pub async fn translate_braille(&self, braille: &str) -> Transliteration {
        self.transliterator.transliterate(braille).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::detection::tests::render_cells;
    use image::ImageFormat;
    use std::io::Cursor;

    fn orchestrator() -> BrailleOrchestrator {
        BrailleOrchestrator::with_transliterator(
            Arc::new(Config::default()),
            Transliterator::basic(),
            Metrics::new(),
        )
        .unwrap()
    }

    fn abc_png() -> Vec<u8> {
        let page = render_cells(
            &[Some([1, 0, 0, 0, 0, 0]), Some([1, 1, 0, 0, 0, 0]), Some([1, 0, 0, 1, 0, 0])],
            200,
            110,
        );
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(page)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_reads_abc_end_to_end() {
        let orchestrator = orchestrator();
        let outcome = orchestrator.process_bytes(abc_png(), None).await.unwrap();

        assert_eq!(outcome.braille, "⠁⠃⠉");
        assert_eq!(outcome.spanish, "abc");
        assert_eq!(outcome.cells, 3);
        assert!(outcome.success);
        assert!(!outcome.enhanced);
        assert!(!outcome.processed_image.is_empty());

        let snapshot = orchestrator.metrics().snapshot();
        assert_eq!(snapshot.images_processed, 1);
        assert_eq!(snapshot.cells_detected, 3);
    }

    #[tokio::test]
    async fn test_blank_image_reads_empty() {
        let blank = DynamicImage::new_luma8(64, 64);
        let mut inverted = blank.to_luma8();
        image::imageops::invert(&mut inverted);

        let reading = orchestrator()
            .read_image(DynamicImage::ImageLuma8(inverted), None)
            .await
            .unwrap();
        assert_eq!(reading.braille, "");
        assert_eq!(reading.transliteration.text, "");
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_client_errors() {
        let orchestrator = orchestrator();
        let err = orchestrator
            .process_bytes(b"definitely not an image".to_vec(), None)
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(orchestrator.metrics().snapshot().images_failed, 1);
    }

    #[tokio::test]
    async fn test_invalid_overrides_are_client_errors() {
        let overrides = DetectorOverrides {
            min_blob_area: Some(1000),
            ..Default::default()
        };
        let err = orchestrator()
            .process_bytes(abc_png(), Some(&overrides))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Input(InputError::InvalidOverrides(_))));

        let huge_pitch = DetectorOverrides {
            dot_spacing: Some(1e30),
            ..Default::default()
        };
        let err = orchestrator()
            .process_bytes(abc_png(), Some(&huge_pitch))
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_fixed_dot_spacing_override() {
        let overrides = DetectorOverrides {
            dot_spacing: Some(16.0),
            ..Default::default()
        };
        let outcome = orchestrator()
            .process_bytes(abc_png(), Some(&overrides))
            .await
            .unwrap();
        assert_eq!(outcome.spanish, "abc");
    }

    #[tokio::test]
    async fn test_translate_braille_without_image() {
        let result = orchestrator().translate_braille("⠓⠕⠇⠁").await;
        assert_eq!(result.text, "hola");
    }
}
