// Main entry point for the Braille image reading service

use braille_workflow::{
    core::{Config, DetectorOverrides, FeedbackError, PipelineError, ProcessOutcome, TrainingError},
    orchestration::BrailleOrchestrator,
    services::{FeedbackRequest, FeedbackStore, TrainingTracker},
    utils::{decode_base64_image, Metrics},
};

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<BrailleOrchestrator>,
    feedback: FeedbackStore,
    training: TrainingTracker,
    metrics: Metrics,
}

/// Error body: `{"error": "...", "success": false}`
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.message, "success": false })),
        )
            .into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        if e.is_client_error() {
            warn!("Rejected image: {}", e);
            Self::bad_request(e.to_string())
        } else {
            error!("Image processing failed: {:?}", e);
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("Processing failed: {}", e),
            }
        }
    }
}

impl From<FeedbackError> for ApiError {
    fn from(e: FeedbackError) -> Self {
        match e {
            FeedbackError::MissingField(_) => Self::bad_request(e.to_string()),
            other => {
                error!("Feedback failed: {:?}", other);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: other.to_string(),
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "braille_workflow={}",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== BRAILLE IMAGE READER ===");
    info!(
        "Detector: blob area {}..{}px, tolerance {}, word gap {} pitches",
        config.detector.min_blob_area,
        config.detector.max_blob_area,
        config.detector.intra_cell_spacing_tolerance,
        config.detector.word_gap_threshold
    );

    let metrics = Metrics::new();
    let orchestrator = Arc::new(BrailleOrchestrator::new(config.clone(), metrics.clone())?);
    let feedback = FeedbackStore::load(&config.feedback.path, Some(metrics.clone())).await;
    let training = TrainingTracker::new(&config.training, Some(metrics.clone()));

    let state = AppState {
        orchestrator,
        feedback,
        training,
        metrics,
    };
    let app = app(state, config.server.max_body_bytes);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /                  - Root endpoint");
    info!("  GET  /health            - Health check");
    info!("  GET  /metrics           - Prometheus metrics");
    info!("  GET  /stats             - Detailed statistics");
    info!("  POST /process-image     - Read Braille from an image (multipart or JSON)");
    info!("  POST /translate-braille - Transliterate a Braille string");
    info!("  POST /feedback          - Submit a correction");
    info!("  POST /train             - Start a training run");
    info!("  GET  /training-status   - Training progress");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn app(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/process-image", post(process_image))
        .route("/translate-braille", post(translate_braille))
        .route("/feedback", post(receive_feedback))
        .route("/train", post(start_training))
        .route("/training-status", get(training_status))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
}

async fn root() -> &'static str {
    "Braille Image Reader - Rust Version"
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.metrics.record_endpoint_request("/health");
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "translator": state.orchestrator.transliterator().translator_name(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    serde_json::to_value(state.metrics.snapshot())
        .map(Json)
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("Failed to serialize metrics: {}", e),
        })
}

#[derive(Debug, Deserialize)]
struct ProcessImageBody {
    image: Option<String>,
    #[serde(default)]
    config: Option<DetectorOverrides>,
}

async fn read_multipart(mut multipart: Multipart) -> Result<(Option<Vec<u8>>, Option<DetectorOverrides>), ApiError> {
    let mut image = None;
    let mut overrides = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Multipart error: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "image" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Read error: {}", e)))?;
                image = Some(data.to_vec());
            }
            "config" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Config read error: {}", e)))?;
                overrides = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| ApiError::bad_request(format!("Invalid config JSON: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    Ok((image, overrides))
}

/// Read Braille from an image
///
/// # Request Format:
/// - multipart/form-data with field "image" (any common format) and an
///   optional "config" field holding detector overrides as JSON
/// - or a JSON body `{"image": "<base64 or data URL>", "config": {...}}`
async fn process_image(State(state): State<AppState>, request: Request) -> Result<Json<ProcessOutcome>, ApiError> {
    state.metrics.record_endpoint_request("/process-image");

    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let (image, overrides) = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        read_multipart(multipart).await?
    } else {
        let Json(body) = Json::<ProcessImageBody>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        let image = body
            .image
            .as_deref()
            .map(decode_base64_image)
            .transpose()
            .map_err(PipelineError::from)?;
        (image, body.config)
    };

    let Some(bytes) = image else {
        return Err(PipelineError::from(braille_workflow::InputError::MissingImage).into());
    };

    info!("Received image ({} bytes)", bytes.len());
    let outcome = state
        .orchestrator
        .process_bytes(bytes, overrides.as_ref())
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct TranslateBody {
    #[serde(default)]
    braille: String,
}

async fn translate_braille(
    State(state): State<AppState>,
    Json(body): Json<TranslateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.record_endpoint_request("/translate-braille");

    if body.braille.is_empty() {
        return Err(ApiError::bad_request("No Braille text provided"));
    }

    let result = state.orchestrator.translate_braille(&body.braille).await;
    Ok(Json(json!({
        "spanish": result.text,
        "basic": result.basic,
        "enhanced": result.enhanced,
        "success": true,
    })))
}

async fn receive_feedback(
    State(state): State<AppState>,
    Json(body): Json<FeedbackRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.record_endpoint_request("/feedback");

    state.feedback.submit(body).await?;
    info!("Feedback received ({} total)", state.feedback.len());
    Ok(Json(json!({
        "message": "Feedback received",
        "success": true,
    })))
}

async fn start_training(State(state): State<AppState>) -> Response {
    state.metrics.record_endpoint_request("/train");

    match state.training.start() {
        Ok(()) => Json(json!({
            "message": "Training started",
            "success": true,
        }))
        .into_response(),
        Err(e @ TrainingError::AlreadyRunning { progress }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": e.to_string(),
                "progress": progress,
                "success": false,
            })),
        )
            .into_response(),
    }
}

async fn training_status(State(state): State<AppState>) -> Json<braille_workflow::services::TrainingStatus> {
    state.metrics.record_endpoint_request("/training-status");
    Json(state.training.status())
}
