pub mod braille_orchestrator;

pub use braille_orchestrator::{BrailleOrchestrator, BrailleReading};
