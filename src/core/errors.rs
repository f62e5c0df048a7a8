// Error types for the Braille reading workflow
//
// One thiserror enum per concern. Only input errors may fail a read request;
// everything downstream of detection degrades instead of failing.

use std::time::Duration;
use thiserror::Error;

/// Input validation errors, raised before detection begins
#[derive(Debug, Error)]
pub enum InputError {
    #[error("No image provided (send a multipart field 'image' or a JSON body with an 'image' key)")]
    MissingImage,

    #[error("Invalid base64 image payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Image could not be decoded: {0}")]
    Undecodable(#[from] image::ImageError),

    #[error("Invalid image dimensions: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    #[error("Invalid detector overrides: {0}")]
    InvalidOverrides(String),
}

/// External translation collaborator errors
///
/// These never leave the transliterator; they are logged and replaced by the
/// basic per-character result.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Translation request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Translation service returned HTTP {0}")]
    BadStatus(u16),

    #[error("Translation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Circuit breaker is open, translation service unavailable")]
    CircuitOpen,

    #[error("Invalid translation response: {0}")]
    InvalidResponse(String),
}

/// Feedback persistence errors
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Failed to save feedback to {path}: {source}")]
    SaveFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Feedback serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Training job errors
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("A training run is already in progress ({progress}%)")]
    AlreadyRunning { progress: u8 },
}

/// Pipeline orchestration errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Annotated image encoding failed: {0}")]
    EncodingFailed(image::ImageError),

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),

    #[error("Detection queue closed")]
    QueueClosed,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Blob area range is empty: min {min} > max {max}")]
    InvalidBlobArea { min: u32, max: u32 },

    #[error("Spacing tolerance must be in (0.0, 0.5], got {0}")]
    InvalidSpacingTolerance(f32),

    #[error("Word gap threshold must be greater than 1.0 dot pitch, got {0}")]
    InvalidWordGap(f32),

    #[error("Invalid detector config: {0}")]
    InvalidDetectorConfig(String),

    #[error("Invalid translator config: {0}")]
    InvalidTranslatorConfig(String),

    #[error("Invalid feedback path: {0}")]
    InvalidFeedbackPath(String),

    #[error("Invalid training config: {0}")]
    InvalidTrainingConfig(String),

    #[error("Concurrency limit must be > 0, got {0}")]
    InvalidConcurrency(usize),
}

pub type InputResult<T> = Result<T, InputError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type FeedbackResult<T> = Result<T, FeedbackError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

impl PipelineError {
    /// True when the caller sent something unusable (maps to HTTP 400)
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Input(_))
    }
}
