use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::core::config::TranslatorConfig;
use crate::core::errors::TranslationError;
use crate::core::types::Transliteration;
use crate::services::translation::{TextTranslator, TranslationCache};
use crate::utils::Metrics;

/// Braille letter cells to Spanish letters; both space forms map to ' '
const TRANSLITERATION_TABLE: [(char, char); 28] = [
    ('⠁', 'a'),
    ('⠃', 'b'),
    ('⠉', 'c'),
    ('⠙', 'd'),
    ('⠑', 'e'),
    ('⠋', 'f'),
    ('⠛', 'g'),
    ('⠓', 'h'),
    ('⠊', 'i'),
    ('⠚', 'j'),
    ('⠅', 'k'),
    ('⠇', 'l'),
    ('⠍', 'm'),
    ('⠝', 'n'),
    ('⠕', 'o'),
    ('⠏', 'p'),
    ('⠟', 'q'),
    ('⠗', 'r'),
    ('⠎', 's'),
    ('⠞', 't'),
    ('⠥', 'u'),
    ('⠧', 'v'),
    ('⠺', 'w'),
    ('⠭', 'x'),
    ('⠽', 'y'),
    ('⠵', 'z'),
    ('⠀', ' '),
    (' ', ' '),
];

fn transliterate_char(ch: char) -> char {
    TRANSLITERATION_TABLE
        .iter()
        .find(|(braille, _)| *braille == ch)
        .map_or(ch, |&(_, letter)| letter)
}

/// Per-character table lookup; characters without an entry pass through
pub fn transliterate_basic(braille: &str) -> String {
    braille.chars().map(transliterate_char).collect()
}

/// Table transliteration with an optional external translation stage
///
/// The external stage only ever improves on the table result: on error,
/// timeout or an empty answer the basic transliteration is returned.
pub struct Transliterator {
    translator: Option<Arc<dyn TextTranslator>>,
    cache: TranslationCache,
    timeout: Duration,
    metrics: Option<Metrics>,
}

impl Transliterator {
    /// Table-only transliterator
    pub fn basic() -> Self {
        Self {
            translator: None,
            cache: TranslationCache::new(1, None),
            timeout: Duration::ZERO,
            metrics: None,
        }
    }

    pub fn new(
        translator: Option<Arc<dyn TextTranslator>>,
        config: &TranslatorConfig,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            translator,
            cache: TranslationCache::new(config.cache_entries, metrics.clone()),
            timeout: config.timeout,
            metrics,
        }
    }

    pub fn translator_name(&self) -> Option<&str> {
        self.translator.as_deref().map(|t| t.name())
    }

    #[instrument(skip(self, braille), fields(chars = braille.chars().count()))]
    pub async fn transliterate(&self, braille: &str) -> Transliteration {
        let basic = transliterate_basic(braille);

        let translator = match &self.translator {
            Some(t) if !basic.trim().is_empty() => t,
            _ => return Self::fallback(basic),
        };

        let input = basic.to_lowercase();

        let key = TranslationCache::generate_key(translator.name(), &input);
        if let Some(text) = self.cache.get(key) {
            debug!("Translation cache hit");
            return Transliteration {
                basic,
                text,
                enhanced: true,
            };
        }

        let outcome = match tokio::time::timeout(self.timeout, translator.translate(&input)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Ok(text),
            Ok(Ok(_)) => Err(TranslationError::InvalidResponse("empty translation".to_string())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TranslationError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(text) => {
                self.cache.put(key, text.clone());
                Transliteration {
                    basic,
                    text,
                    enhanced: true,
                }
            }
            Err(e) => {
                warn!(
                    "Translator '{}' failed, using basic transliteration: {}",
                    translator.name(),
                    e
                );
                if let Some(ref m) = self.metrics {
                    m.record_translator_fallback();
                }
                Self::fallback(basic)
            }
        }
    }

    fn fallback(basic: String) -> Transliteration {
        Transliteration {
            text: basic.clone(),
            basic,
            enhanced: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::TranslationResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Upper {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextTranslator for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn translate(&self, text: &str) -> TranslationResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_uppercase())
        }
    }

    struct Broken;

    #[async_trait]
    impl TextTranslator for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn translate(&self, _text: &str) -> TranslationResult<String> {
            Err(TranslationError::BadStatus(503))
        }
    }

    struct Slow;

    #[async_trait]
    impl TextTranslator for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn translate(&self, text: &str) -> TranslationResult<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(text.to_string())
        }
    }

    struct Silent;

    #[async_trait]
    impl TextTranslator for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn translate(&self, _text: &str) -> TranslationResult<String> {
            Ok("   ".to_string())
        }
    }

    fn config() -> TranslatorConfig {
        TranslatorConfig {
            endpoint: None,
            model: "test".to_string(),
            timeout: Duration::from_millis(100),
            cache_entries: 8,
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
        }
    }

    fn with(translator: Arc<dyn TextTranslator>, metrics: Option<Metrics>) -> Transliterator {
        Transliterator::new(Some(translator), &config(), metrics)
    }

    #[test]
    fn test_basic_abc() {
        assert_eq!(transliterate_basic("⠁⠃⠉"), "abc");
    }

    #[test]
    fn test_basic_full_alphabet() {
        let braille = "⠁⠃⠉⠙⠑⠋⠛⠓⠊⠚⠅⠇⠍⠝⠕⠏⠟⠗⠎⠞⠥⠧⠺⠭⠽⠵";
        assert_eq!(transliterate_basic(braille), "abcdefghijklmnopqrstuvwxyz");
    }

    #[test]
    fn test_basic_passes_through_unmapped() {
        assert_eq!(transliterate_basic("⠁?⠃"), "a?b");
        assert_eq!(transliterate_basic("⠁⠀⠃ ⠉"), "a b c");
        assert_eq!(transliterate_basic("Hola, 123!"), "Hola, 123!");
        assert_eq!(transliterate_basic(""), "");
    }

    #[test]
    fn test_basic_is_idempotent_on_plain_text() {
        let once = transliterate_basic("⠓⠕⠇⠁ mundo");
        assert_eq!(transliterate_basic(&once), once);
    }

    #[tokio::test]
    async fn test_without_translator_returns_basic() {
        let result = Transliterator::basic().transliterate("⠁⠃⠉").await;
        assert_eq!(result.text, "abc");
        assert_eq!(result.basic, "abc");
        assert!(!result.enhanced);
    }

    #[tokio::test]
    async fn test_translator_success_and_cache() {
        let upper = Arc::new(Upper {
            calls: AtomicUsize::new(0),
        });
        let transliterator = with(upper.clone(), None);

        let first = transliterator.transliterate("⠁⠃⠉").await;
        assert_eq!(first.text, "ABC");
        assert_eq!(first.basic, "abc");
        assert!(first.enhanced);

        let second = transliterator.transliterate("⠁⠃⠉").await;
        assert_eq!(second.text, "ABC");
        assert_eq!(upper.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_translator_failure_falls_back() {
        let metrics = Metrics::new();
        let result = with(Arc::new(Broken), Some(metrics.clone()))
            .transliterate("⠁⠃⠉")
            .await;

        assert_eq!(result.text, "abc");
        assert!(!result.enhanced);
        assert_eq!(metrics.snapshot().translator_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_translator_timeout_falls_back() {
        let started = std::time::Instant::now();
        let result = with(Arc::new(Slow), None).transliterate("⠁⠃⠉").await;

        assert_eq!(result.text, "abc");
        assert!(!result.enhanced);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_empty_answer_falls_back() {
        let result = with(Arc::new(Silent), None).transliterate("⠁").await;
        assert_eq!(result.text, "a");
        assert!(!result.enhanced);
    }

    #[tokio::test]
    async fn test_blank_input_skips_translator() {
        let upper = Arc::new(Upper {
            calls: AtomicUsize::new(0),
        });
        let result = with(upper.clone(), None).transliterate("  ").await;
        assert_eq!(result.text, "  ");
        assert_eq!(upper.calls.load(Ordering::SeqCst), 0);
    }
}
