use crate::core::errors::ConfigError;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Largest fixed dot pitch a caller may set, in pixels
pub const MAX_DOT_SPACING: f32 = 1000.0;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    pub max_body_bytes: usize,
}

/// Cell detector knobs
///
/// Distances that depend on the Braille geometry are expressed in dot pitches
/// (the distance between two adjacent dot positions inside one cell), so the
/// same settings hold across scan resolutions. Pixel areas do not scale; the
/// defaults suit scans around 150-300 DPI where a dot is 3-10 px across.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Smallest blob (in pixels) accepted as a dot
    pub min_blob_area: u32,
    /// Largest blob (in pixels) accepted as a dot
    pub max_blob_area: u32,
    /// Fraction of the dot pitch within which a blob counts as occupying a
    /// canonical dot position, also used to split column bands
    pub intra_cell_spacing_tolerance: f32,
    /// Horizontal gap between cells, in dot pitches, that marks a word boundary
    pub word_gap_threshold: f32,
    /// Gaussian smoothing sigma; 0 disables the blur
    pub blur_sigma: f32,
    /// Radius of the local-mean window used for adaptive thresholding
    pub threshold_block_radius: u32,
    /// Intensity levels a pixel must sit below its local mean to be foreground
    pub threshold_offset: u8,
    /// Minimum area / bounding-box area for a blob to count as round
    pub min_fill_ratio: f32,
    /// Maximum bounding-box elongation for a blob to count as round
    pub max_aspect_ratio: f32,
    /// Fixed dot pitch in pixels; estimated from the image when unset
    pub dot_spacing: Option<f32>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_blob_area: 10,
            max_blob_area: 600,
            intra_cell_spacing_tolerance: 0.4,
            word_gap_threshold: 2.75,
            blur_sigma: 1.0,
            threshold_block_radius: 15,
            threshold_offset: 12,
            min_fill_ratio: 0.45,
            max_aspect_ratio: 2.0,
            dot_spacing: None,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_blob_area == 0 || self.min_blob_area > self.max_blob_area {
            return Err(ConfigError::InvalidBlobArea {
                min: self.min_blob_area,
                max: self.max_blob_area,
            });
        }

        if !(self.intra_cell_spacing_tolerance > 0.0 && self.intra_cell_spacing_tolerance <= 0.5) {
            return Err(ConfigError::InvalidSpacingTolerance(
                self.intra_cell_spacing_tolerance,
            ));
        }

        if !(self.word_gap_threshold > 1.0) || !self.word_gap_threshold.is_finite() {
            return Err(ConfigError::InvalidWordGap(self.word_gap_threshold));
        }

        if !(self.blur_sigma >= 0.0) || !self.blur_sigma.is_finite() {
            return Err(ConfigError::InvalidDetectorConfig(format!(
                "blur_sigma must be >= 0, got {}",
                self.blur_sigma
            )));
        }

        if self.threshold_block_radius == 0 {
            return Err(ConfigError::InvalidDetectorConfig(
                "threshold_block_radius must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_fill_ratio) {
            return Err(ConfigError::InvalidDetectorConfig(format!(
                "min_fill_ratio must be between 0.0 and 1.0, got {}",
                self.min_fill_ratio
            )));
        }

        if !(self.max_aspect_ratio >= 1.0) {
            return Err(ConfigError::InvalidDetectorConfig(format!(
                "max_aspect_ratio must be >= 1.0, got {}",
                self.max_aspect_ratio
            )));
        }

        if let Some(spacing) = self.dot_spacing {
            if !(spacing > 1.0 && spacing <= MAX_DOT_SPACING) {
                return Err(ConfigError::InvalidDetectorConfig(format!(
                    "dot_spacing must be between 1 and {} px, got {}",
                    MAX_DOT_SPACING, spacing
                )));
            }
        }

        Ok(())
    }

    /// Apply per-request overrides, validating the merged result
    pub fn with_overrides(&self, overrides: &DetectorOverrides) -> Result<Self, ConfigError> {
        let mut merged = self.clone();
        if let Some(v) = overrides.min_blob_area {
            merged.min_blob_area = v;
        }
        if let Some(v) = overrides.max_blob_area {
            merged.max_blob_area = v;
        }
        if let Some(v) = overrides.intra_cell_spacing_tolerance {
            merged.intra_cell_spacing_tolerance = v;
        }
        if let Some(v) = overrides.word_gap_threshold {
            merged.word_gap_threshold = v;
        }
        if let Some(v) = overrides.dot_spacing {
            merged.dot_spacing = Some(v);
        }
        merged.validate()?;
        Ok(merged)
    }
}

/// Detector knobs a caller may override for a single request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectorOverrides {
    pub min_blob_area: Option<u32>,
    pub max_blob_area: Option<u32>,
    pub intra_cell_spacing_tolerance: Option<f32>,
    pub word_gap_threshold: Option<f32>,
    pub dot_spacing: Option<f32>,
}

impl DetectorOverrides {
    pub fn is_empty(&self) -> bool {
        self.min_blob_area.is_none()
            && self.max_blob_area.is_none()
            && self.intra_cell_spacing_tolerance.is_none()
            && self.word_gap_threshold.is_none()
            && self.dot_spacing.is_none()
    }
}

/// External translation collaborator configuration
#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    /// HTTP endpoint of the translation model; the stage is off when unset
    pub endpoint: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub cache_entries: usize,
    pub failure_threshold: usize,
    pub recovery_timeout: Duration,
}

/// Feedback store configuration
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    pub path: String,
}

/// Simulated training job configuration
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub total_steps: u32,
    pub step_interval: Duration,
}

/// Request concurrency configuration
#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    /// Maximum number of detections running at once
    pub max_concurrent_detections: usize,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub detector: DetectorConfig,
    pub translator: TranslatorConfig,
    pub feedback: FeedbackConfig,
    pub training: TrainingConfig,
    pub concurrency: ConcurrencyConfig,
}

impl Default for Config {
    /// Built-in defaults, ignoring the environment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 5000,
                host: "0.0.0.0".to_string(),
                log_level: Level::INFO,
                max_body_bytes: 16 * 1024 * 1024,
            },
            detector: DetectorConfig::default(),
            translator: TranslatorConfig {
                endpoint: None,
                model: "Helsinki-NLP/opus-mt-en-es".to_string(),
                timeout: Duration::from_millis(5_000),
                cache_entries: 1_000,
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(30),
            },
            feedback: FeedbackConfig {
                path: "feedback_data.json".to_string(),
            },
            training: TrainingConfig {
                total_steps: 10,
                step_interval: Duration::from_millis(1_000),
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_detections: num_cpus::get().max(1),
            },
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let defaults = DetectorConfig::default();

        Self {
            server: ServerConfig {
                port: env_or("PORT", 5000),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
                max_body_bytes: env_or("MAX_BODY_BYTES", 16 * 1024 * 1024),
            },
            detector: DetectorConfig {
                min_blob_area: env_or("MIN_BLOB_AREA", defaults.min_blob_area),
                max_blob_area: env_or("MAX_BLOB_AREA", defaults.max_blob_area),
                intra_cell_spacing_tolerance: env_or(
                    "INTRA_CELL_SPACING_TOLERANCE",
                    defaults.intra_cell_spacing_tolerance,
                ),
                word_gap_threshold: env_or("WORD_GAP_THRESHOLD", defaults.word_gap_threshold),
                blur_sigma: env_or("BLUR_SIGMA", defaults.blur_sigma),
                threshold_block_radius: env_or(
                    "THRESHOLD_BLOCK_RADIUS",
                    defaults.threshold_block_radius,
                ),
                threshold_offset: env_or("THRESHOLD_OFFSET", defaults.threshold_offset),
                min_fill_ratio: env_or("MIN_FILL_RATIO", defaults.min_fill_ratio),
                max_aspect_ratio: env_or("MAX_ASPECT_RATIO", defaults.max_aspect_ratio),
                dot_spacing: env::var("DOT_SPACING")
                    .ok()
                    .and_then(|s| s.trim().parse().ok()),
            },
            translator: TranslatorConfig {
                endpoint: env::var("TRANSLATOR_ENDPOINT")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
                model: env::var("TRANSLATOR_MODEL")
                    .unwrap_or_else(|_| "Helsinki-NLP/opus-mt-en-es".to_string()),
                timeout: Duration::from_millis(env_or("TRANSLATOR_TIMEOUT_MS", 5_000)),
                cache_entries: env_or("TRANSLATOR_CACHE_ENTRIES", 1_000),
                failure_threshold: env_or("TRANSLATOR_FAILURE_THRESHOLD", 3),
                recovery_timeout: Duration::from_secs(env_or("TRANSLATOR_RECOVERY_SECONDS", 30)),
            },
            feedback: FeedbackConfig {
                path: env::var("FEEDBACK_PATH")
                    .unwrap_or_else(|_| "feedback_data.json".to_string()),
            },
            training: TrainingConfig {
                total_steps: env_or("TRAINING_STEPS", 10),
                step_interval: Duration::from_millis(env_or("TRAINING_STEP_MS", 1_000)),
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_detections: env_or(
                    "MAX_CONCURRENT_DETECTIONS",
                    num_cpus::get().max(1),
                ),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;

        if let Some(ref endpoint) = self.translator.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::InvalidTranslatorConfig(format!(
                    "endpoint must be an http(s) URL, got {}",
                    endpoint
                )));
            }
        }

        if self.translator.timeout.is_zero() {
            return Err(ConfigError::InvalidTranslatorConfig(
                "timeout must be > 0".to_string(),
            ));
        }

        if self.translator.cache_entries == 0 {
            return Err(ConfigError::InvalidTranslatorConfig(
                "cache_entries must be > 0".to_string(),
            ));
        }

        if self.translator.failure_threshold == 0 {
            return Err(ConfigError::InvalidTranslatorConfig(
                "failure_threshold must be > 0".to_string(),
            ));
        }

        let feedback_path = Path::new(&self.feedback.path);
        if let Some(parent) = feedback_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidFeedbackPath(format!(
                    "Parent directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        if self.training.total_steps == 0 {
            return Err(ConfigError::InvalidTrainingConfig(
                "total_steps must be > 0".to_string(),
            ));
        }

        if self.concurrency.max_concurrent_detections == 0 {
            return Err(ConfigError::InvalidConcurrency(
                self.concurrency.max_concurrent_detections,
            ));
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn max_concurrent_detections(&self) -> usize {
        self.concurrency.max_concurrent_detections
    }
}
