// Library exports for the Braille image reading workflow

// Core modules
pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::{Config, DetectorConfig, DetectorOverrides},
    errors::{ConfigError, FeedbackError, InputError, PipelineError, TrainingError, TranslationError},
    types::{Cell, CellDetection, Dot, DotPattern, ProcessOutcome, Transliteration},
};

pub use middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use orchestration::{BrailleOrchestrator, BrailleReading};

pub use services::decoder::{decode_cells, decode_pattern, decode_patterns, UNRECOGNIZED_CELL};
pub use services::translation::transliterate_basic;
pub use services::{
    CellDetector, FeedbackRequest, FeedbackStore, HttpTranslator, TextTranslator, TrainingTracker,
    Transliterator,
};

pub use utils::{load_image_from_memory_async, Metrics};
