use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::core::config::TranslatorConfig;
use crate::core::errors::{TranslationError, TranslationResult};
use crate::middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
use crate::services::translation::TextTranslator;
use crate::utils::Metrics;

const SOURCE_LANGUAGE: &str = "en";
const TARGET_LANGUAGE: &str = "es";

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    model: &'a str,
    source: &'a str,
    target: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translation: String,
}

/// Translation model served over HTTP, guarded by a circuit breaker
///
/// Sends `{"text","model","source","target"}` and expects
/// `{"translation": "..."}` back.
pub struct HttpTranslator {
    endpoint: String,
    model: String,
    http_client: reqwest::Client,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Metrics>,
}

impl HttpTranslator {
    pub fn new(endpoint: String, config: &TranslatorConfig, metrics: Option<Metrics>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .pool_max_idle_per_host(4)
            .build()
            .context("Failed to create HTTP client")?;

        let circuit_breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.failure_threshold,
            recovery_timeout: config.recovery_timeout,
        });

        Ok(Self {
            endpoint,
            model: config.model.clone(),
            http_client,
            circuit_breaker,
            metrics,
        })
    }

    /// Build from config; None when no endpoint is configured
    pub fn from_config(config: &TranslatorConfig, metrics: Option<Metrics>) -> Result<Option<Self>> {
        config
            .endpoint
            .clone()
            .map(|endpoint| Self::new(endpoint, config, metrics))
            .transpose()
    }

    pub fn circuit_stats(&self) -> CircuitBreakerStats {
        self.circuit_breaker.stats()
    }

    async fn send(&self, text: &str) -> TranslationResult<String> {
        let body = TranslateRequest {
            text,
            model: &self.model,
            source: SOURCE_LANGUAGE,
            target: TARGET_LANGUAGE,
        };

        let response = self.http_client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranslationError::BadStatus(status.as_u16()));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;
        Ok(parsed.translation)
    }
}

#[async_trait]
impl TextTranslator for HttpTranslator {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, text), fields(model = %self.model, chars = text.chars().count()))]
    async fn translate(&self, text: &str) -> TranslationResult<String> {
        let Some(permit) = self.circuit_breaker.permit() else {
            warn!("Circuit breaker is open, failing fast");
            return Err(TranslationError::CircuitOpen);
        };

        let start = Instant::now();
        let result = self.send(text).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(_) => {
                debug!("Translation answered in {:.0}ms", elapsed.as_secs_f64() * 1000.0);
                permit.success();
            }
            Err(e) => {
                warn!("Translation request failed after {:?}: {}", elapsed, e);
                permit.failure();
            }
        }
        if let Some(ref m) = self.metrics {
            m.record_translator_call(result.is_ok(), elapsed);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::CircuitState;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/translate", addr)
    }

    fn config() -> TranslatorConfig {
        TranslatorConfig {
            endpoint: None,
            model: "test-model".to_string(),
            timeout: Duration::from_secs(2),
            cache_entries: 16,
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_translate_success() {
        let router = Router::new().route(
            "/translate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["target"], "es");
                let text = body["text"].as_str().unwrap_or_default().to_uppercase();
                Json(json!({ "translation": text }))
            }),
        );
        let endpoint = serve(router).await;

        let metrics = Metrics::new();
        let translator = HttpTranslator::new(endpoint, &config(), Some(metrics.clone())).unwrap();
        assert_eq!(translator.translate("hola").await.unwrap(), "HOLA");
        assert_eq!(metrics.snapshot().translator_success, 1);
    }

    #[tokio::test]
    async fn test_bad_status_opens_circuit() {
        let router = Router::new().route(
            "/translate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
        );
        let endpoint = serve(router).await;
        let translator = HttpTranslator::new(endpoint, &config(), None).unwrap();

        for _ in 0..2 {
            assert!(matches!(
                translator.translate("hola").await,
                Err(TranslationError::BadStatus(500))
            ));
        }
        assert_eq!(translator.circuit_stats().state, CircuitState::Open);
        assert!(matches!(
            translator.translate("hola").await,
            Err(TranslationError::CircuitOpen)
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let router = Router::new().route("/translate", post(|| async { Json(json!({ "text": 1 })) }));
        let endpoint = serve(router).await;
        let translator = HttpTranslator::new(endpoint, &config(), None).unwrap();

        assert!(matches!(
            translator.translate("hola").await,
            Err(TranslationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_from_config_without_endpoint() {
        assert!(HttpTranslator::from_config(&config(), None).unwrap().is_none());
    }
}
