pub mod decoder;
pub mod detection;
pub mod feedback;
pub mod training;
pub mod translation;

// Re-export commonly used services
pub use detection::CellDetector;
pub use feedback::{FeedbackRequest, FeedbackStore};
pub use training::{TrainingStatus, TrainingTracker};
pub use translation::{HttpTranslator, TextTranslator, TranslationCache, Transliterator};
