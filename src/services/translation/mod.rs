pub mod api_client;
pub mod cache;
pub mod transliterator;

use async_trait::async_trait;

use crate::core::errors::TranslationResult;

pub use api_client::HttpTranslator;
pub use cache::TranslationCache;
pub use transliterator::{transliterate_basic, Transliterator};

/// External text translation stage (a neural model behind some transport)
#[async_trait]
pub trait TextTranslator: Send + Sync {
    /// Model or service name, used in logs and cache keys
    fn name(&self) -> &str;

    async fn translate(&self, text: &str) -> TranslationResult<String>;
}
