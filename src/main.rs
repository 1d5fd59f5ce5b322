//! OCR Overlay - upload an image or PDF, run a selectable OCR engine, and get
//! the recognized text back with its regions drawn over the page.

mod config;
mod correlate;
mod error;
mod ingest;
mod ocr;
mod overlay;
mod pdf;
mod pipeline;
mod region;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use config::Settings;
use error::AppError;
use ingest::Upload;
use ocr::{EngineKind, ExtractOptions, Strategy};
use pipeline::{OcrResponse, Pipeline};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_overlay=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();
    info!(
        "Engines: tesseract={} ({}), easyocr={}, unstructured={}",
        settings.tesseract.command,
        settings.tesseract.languages,
        settings.easyocr.url,
        settings.unstructured.url
    );

    let state = AppState {
        pipeline: Arc::new(Pipeline::new(&settings, reqwest::Client::new())),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/engines", get(list_engines))
        .route("/ocr", post(run_ocr))
        .route("/ocr/overlay.png", post(run_overlay_png))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

#[derive(serde::Serialize)]
struct EngineList {
    engines: Vec<&'static str>,
    strategies: Vec<&'static str>,
}

/// List selectable engines and Unstructured strategies.
async fn list_engines() -> Json<EngineList> {
    Json(EngineList {
        engines: EngineKind::ALL.iter().map(|k| k.as_str()).collect(),
        strategies: Strategy::ALL.iter().map(|s| s.as_str()).collect(),
    })
}

#[derive(Debug, Default, serde::Deserialize)]
struct OcrQuery {
    engine: Option<String>,
    strategy: Option<String>,
}

impl OcrQuery {
    fn selection(&self) -> Result<(EngineKind, ExtractOptions), AppError> {
        let engine = match self.engine.as_deref() {
            None => EngineKind::default(),
            Some(name) => EngineKind::parse(name).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Unknown engine: {}. Available: {:?}",
                    name,
                    EngineKind::ALL.map(EngineKind::as_str)
                ))
            })?,
        };
        let strategy = match self.strategy.as_deref() {
            None => Strategy::default(),
            Some(name) => Strategy::parse(name).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Unknown strategy: {}. Available: {:?}",
                    name,
                    Strategy::ALL.map(Strategy::as_str)
                ))
            })?,
        };
        Ok((engine, ExtractOptions { strategy }))
    }
}

/// Upload a document and run OCR on it.
async fn run_ocr(
    State(state): State<AppState>,
    Query(query): Query<OcrQuery>,
    multipart: Multipart,
) -> Result<Json<OcrResponse>, AppError> {
    let (engine, options) = query.selection()?;
    let upload = read_upload(multipart).await?;
    let response = state.pipeline.run(&upload, engine, options).await?;
    info!("OCR complete: {} ({})", upload.filename, engine.as_str());
    Ok(Json(response))
}

/// Upload an image and get the overlay back as a PNG.
async fn run_overlay_png(
    State(state): State<AppState>,
    Query(query): Query<OcrQuery>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let (engine, options) = query.selection()?;
    let upload = read_upload(multipart).await?;
    let png = state.pipeline.overlay_png(&upload, engine, options).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// Read the `file` field of a multipart form.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read file: {}", e)))?
                .to_vec();

            if data.is_empty() {
                return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
            }
            info!("Received file: {} ({} bytes)", filename, data.len());
            return Ok(Upload {
                filename,
                content_type,
                data,
            });
        }
    }

    Err(AppError::BadRequest("No file uploaded".to_string()))
}
