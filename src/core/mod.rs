pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::{Config, DetectorConfig, DetectorOverrides};
pub use errors::{
    ConfigError, FeedbackError, InputError, PipelineError, TrainingError, TranslationError,
};
pub use types::{Cell, CellDetection, Dot, DotPattern, ProcessOutcome, Transliteration};
