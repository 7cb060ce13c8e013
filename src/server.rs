//! Relay HTTP server.
//!
//! Sits between the web UI and the external detection API: accepts media
//! uploads and text, forwards them through a [`DetectionApi`], and serves
//! the per-category analysis history.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/health` | Status, storage backend, and upstream configuration |
//! | `POST` | `/api/upload` | Store a media file (multipart field `file`) |
//! | `POST` | `/api/proxy/deepfake` | Relay a video (field `video`) |
//! | `POST` | `/api/proxy/audio` | Relay an audio clip (field `audio`) |
//! | `POST` | `/api/proxy/image` | Relay an image (field `image`) |
//! | `POST` | `/api/proxy/misinformation` | Relay `{"text": "..."}` |
//! | `GET`  | `/api/history` | Per-category record counts |
//! | `GET`  | `/api/history/{category}` | Partition, newest first, with verdicts |
//! | `POST` | `/api/history/{category}` | Save a result |
//! | `DELETE` | `/api/history/{category}` | Clear a partition |
//! | `GET`  | `/uploads/*` | Stored uploads, read-only |
//!
//! # Error Contract
//!
//! Every error response has the same shape:
//!
//! ```json
//! { "message": "No video file provided", "code": "NO_VIDEO_FILE" }
//! ```
//!
//! `details` carries the upstream body or transport error when there is
//! one, and `status` the upstream HTTP status when the detection API
//! answered. Unknown `/api/*` routes answer 404 `ROUTE_NOT_FOUND`.
//!
//! # CORS
//!
//! All origins are permitted for `GET`, `POST`, `PUT`, `DELETE`, and
//! `OPTIONS` with `Content-Type` and `Authorization` headers.

use axum::{
    body::Bytes,
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use verity_core::store::memory::InMemoryKvStore;
use verity_core::{AnalysisHistory, AnalysisRecord, Category, ResultFields, Verdict};

use crate::config::Config;
use crate::relay::{create_api, upload_field, AnalysisInput, DetectionApi, RelayError, RelayErrorKind};
use crate::sqlite_store::open_history;
use crate::uploads::{self, UploadError};

/// Multipart framing allowance on top of the configured upload limit.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

const PERMISSIONS_POLICY: &str =
    "accelerometer=(), camera=(), geolocation=(), gyroscope=(), magnetometer=(), microphone=(), usb=()";
const FEATURE_POLICY: &str = "accelerometer 'none'; camera 'none'; geolocation 'none'; gyroscope 'none'; magnetometer 'none'; microphone 'none'; usb 'none'";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    api: Arc<dyn DetectionApi>,
    history: Arc<AnalysisHistory>,
    /// `"sqlite"` or `"memory"`, reported by the health check.
    storage: &'static str,
}

impl AppState {
    pub fn new(
        config: Config,
        api: Arc<dyn DetectionApi>,
        history: Arc<AnalysisHistory>,
        storage: &'static str,
    ) -> Self {
        Self {
            config: Arc::new(config),
            api,
            history,
            storage,
        }
    }
}

/// Starts the relay server.
///
/// Creates the upload directories, opens the history store (SQLite, or
/// memory when `server.ephemeral_history` is set), binds to
/// `[server].bind`, and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    uploads::ensure_dirs(&config.uploads.dir)?;

    let api: Arc<dyn DetectionApi> = Arc::from(create_api(&config.upstream)?);
    let (history, storage) = if config.server.ephemeral_history {
        let store = Arc::new(InMemoryKvStore::new());
        (AnalysisHistory::new(store), "memory")
    } else {
        (open_history(config).await?, "sqlite")
    };

    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), api, Arc::new(history), storage);
    let app = build_router(state);

    println!("Verity relay listening on http://{}", bind_addr);
    println!("  upstream: {} ({})", config.upstream.base_url, config.upstream.mode);
    println!("  uploads:  {}", config.uploads.dir.display());
    println!("  history:  {}", storage);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router with all routes and layers.
pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.uploads.max_bytes.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let uploads_service = ServeDir::new(&state.config.uploads.dir);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/upload", post(handle_upload))
        .route("/api/proxy/deepfake", post(handle_proxy_deepfake))
        .route("/api/proxy/audio", post(handle_proxy_audio))
        .route("/api/proxy/image", post(handle_proxy_image))
        .route(
            "/api/proxy/misinformation",
            post(handle_proxy_misinformation),
        )
        .route("/api/history", get(handle_history_stats))
        .route(
            "/api/history/{category}",
            get(handle_history_load)
                .post(handle_history_save)
                .delete(handle_history_clear),
        )
        .nest_service("/uploads", uploads_service)
        .fallback(handle_not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static(PERMISSIONS_POLICY),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("feature-policy"),
            HeaderValue::from_static(FEATURE_POLICY),
        ))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
    /// Upstream HTTP status, when the detection API answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    details: Option<Value>,
    upstream_status: Option<u16>,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
            details: None,
            upstream_status: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(Value::String(details.into()));
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            message: self.message,
            code: self.code,
            details: self.details,
            status: self.upstream_status,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        if !matches!(err.kind, RelayErrorKind::NoInput) {
            log::error!("relay error ({}): {}", err.code(), err);
        }
        Self {
            status: StatusCode::from_u16(err.status()).unwrap_or(StatusCode::BAD_GATEWAY),
            code: err.code(),
            message: err.to_string(),
            details: err.details(),
            upstream_status: err.upstream_status(),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        let status =
            StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = err.to_string();
        match err {
            UploadError::Io(e) => {
                log::error!("upload failed: {}", e);
                AppError::new(status, "UPLOAD_FAILED", "File upload failed")
                    .with_details(e.to_string())
            }
            other => AppError::new(status, other.code(), message),
        }
    }
}

/// Constructs a 500 error for history storage failures.
fn history_error(err: anyhow::Error) -> AppError {
    log::error!("history store failure: {:#}", err);
    AppError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "Internal server error",
    )
    .with_details(err.to_string())
}

fn unknown_category(name: &str) -> AppError {
    AppError::new(
        StatusCode::NOT_FOUND,
        "ROUTE_NOT_FOUND",
        format!("Unknown history category: {}", name),
    )
}

/// Map a multipart read failure; an oversized body becomes 413.
fn multipart_error(err: MultipartError, max_bytes: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::from(UploadError::TooLarge { max_bytes })
    } else {
        AppError::new(
            StatusCode::BAD_REQUEST,
            "INVALID_MULTIPART",
            "Malformed multipart request",
        )
        .with_details(err.body_text())
    }
}

// ============ Multipart ============

/// One file read from a multipart body.
struct UploadedFile {
    file_name: String,
    content_type: String,
    bytes: Bytes,
}

/// Read the first field named `name`, skipping any others.
async fn read_file_field(
    multipart: &mut Multipart,
    name: &str,
) -> Result<Option<UploadedFile>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(name) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await?;
        return Ok(Some(UploadedFile {
            file_name,
            content_type,
            bytes,
        }));
    }
    Ok(None)
}

// ============ GET /api/health ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: String,
    storage: &'static str,
    upload_dir: String,
    config: HealthConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthConfig {
    bind: String,
    mode: String,
    detector: String,
    api_base_url: String,
    deepfake_api_endpoint: String,
    audio_api_endpoint: String,
    image_api_endpoint: String,
    misinformation_api_endpoint: String,
}

/// Handler for `GET /api/health`.
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = &state.config;
    let upstream = &config.upstream;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        storage: state.storage,
        upload_dir: config.uploads.dir.display().to_string(),
        config: HealthConfig {
            bind: config.server.bind.clone(),
            mode: upstream.mode.clone(),
            detector: state.api.name().to_string(),
            api_base_url: upstream.base_url.clone(),
            deepfake_api_endpoint: upstream.video_path.clone(),
            audio_api_endpoint: upstream.audio_path.clone(),
            image_api_endpoint: upstream.image_path.clone(),
            misinformation_api_endpoint: upstream.endpoint(Category::Misinfo),
        },
    })
}

// ============ POST /api/upload ============

/// Handler for `POST /api/upload`.
async fn handle_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<uploads::StoredUpload>, AppError> {
    let no_file = || AppError::new(StatusCode::BAD_REQUEST, "NO_FILE", "No file uploaded");
    let max_bytes = state.config.uploads.max_bytes;

    let mut multipart = multipart.map_err(|_| no_file())?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let stored = stream_to_disk(field, &state.config.uploads.dir, max_bytes).await?;
        return Ok(Json(stored));
    }
    Err(no_file())
}

/// Stream one multipart field into the upload directory. The partial file
/// is removed if the field is rejected or the body ends early.
async fn stream_to_disk(
    mut field: Field<'_>,
    root: &std::path::Path,
    max_bytes: u64,
) -> Result<uploads::StoredUpload, AppError> {
    let file_name = field.file_name().unwrap_or("upload").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    let mut writer = uploads::begin_upload(root, max_bytes, &file_name, &content_type).await?;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        writer.write_chunk(&chunk).await?;
    }
    Ok(writer.finish().await?)
}

// ============ POST /api/proxy/* ============

/// Shared body of the three media proxy handlers.
async fn proxy_media(
    state: &AppState,
    category: Category,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    let no_input = || AppError::from(RelayError::new(category, RelayErrorKind::NoInput));
    let field = upload_field(category).unwrap_or("file");

    let mut multipart = multipart.map_err(|_| no_input())?;
    let file = read_file_field(&mut multipart, field)
        .await
        .map_err(|e| multipart_error(e, state.config.uploads.max_bytes))?
        .ok_or_else(no_input)?;

    log::info!(
        "proxying {} analysis: {} ({}, {} bytes)",
        category,
        file.file_name,
        file.content_type,
        file.bytes.len()
    );

    let input = AnalysisInput::Media {
        category,
        file_name: file.file_name,
        content_type: file.content_type,
        bytes: file.bytes,
    };
    let body = state.api.analyze(input).await?;
    Ok(Json(body))
}

async fn handle_proxy_deepfake(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    proxy_media(&state, Category::Deepfake, multipart).await
}

async fn handle_proxy_audio(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    proxy_media(&state, Category::Audio, multipart).await
}

async fn handle_proxy_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    proxy_media(&state, Category::Image, multipart).await
}

/// Handler for `POST /api/proxy/misinformation`.
///
/// A body that is not JSON, or has no `text` string, is treated as
/// missing text.
async fn handle_proxy_misinformation(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let text = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| v.get("text").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default();

    let body = state.api.analyze(AnalysisInput::Text(text)).await?;
    Ok(Json(body))
}

// ============ /api/history ============

/// A stored record with its history-card verdict.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryItem {
    #[serde(flatten)]
    record: AnalysisRecord,
    verdict: Verdict,
    css_class: &'static str,
}

impl From<AnalysisRecord> for HistoryItem {
    fn from(record: AnalysisRecord) -> Self {
        let verdict = record.verdict();
        Self {
            record,
            verdict,
            css_class: verdict.severity.css_class(),
        }
    }
}

#[derive(Serialize)]
struct HistoryResponse {
    category: Category,
    items: Vec<HistoryItem>,
}

#[derive(Serialize)]
struct SaveResponse {
    saved: bool,
    items: Vec<HistoryItem>,
}

#[derive(Serialize)]
struct ClearResponse {
    cleared: bool,
    category: Category,
}

/// Handler for `GET /api/history`.
async fn handle_history_stats(
    State(state): State<AppState>,
) -> Json<verity_core::HistoryStats> {
    Json(state.history.stats().await)
}

/// Handler for `GET /api/history/{category}`.
async fn handle_history_load(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let category = Category::parse(&name).ok_or_else(|| unknown_category(&name))?;
    let items = state
        .history
        .load(category)
        .await
        .into_iter()
        .map(HistoryItem::from)
        .collect();
    Ok(Json(HistoryResponse { category, items }))
}

/// Handler for `POST /api/history/{category}`.
///
/// An unknown category is accepted and ignored (`saved: false`) whatever
/// the body holds. A known category with an unreadable body is a 400.
async fn handle_history_save(
    State(state): State<AppState>,
    Path(name): Path<String>,
    fields: Result<Json<ResultFields>, JsonRejection>,
) -> Result<Json<SaveResponse>, AppError> {
    let Some(category) = Category::parse(&name) else {
        log::warn!("ignoring save for unknown category '{}'", name);
        return Ok(Json(SaveResponse {
            saved: false,
            items: Vec::new(),
        }));
    };

    let Json(fields) = fields.map_err(|e| {
        AppError::new(StatusCode::BAD_REQUEST, "INVALID_BODY", e.body_text())
    })?;

    let records = state
        .history
        .save_to(category, fields)
        .await
        .map_err(history_error)?;

    Ok(Json(SaveResponse {
        saved: true,
        items: records.into_iter().map(HistoryItem::from).collect(),
    }))
}

/// Handler for `DELETE /api/history/{category}`.
async fn handle_history_clear(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ClearResponse>, AppError> {
    let category = Category::parse(&name).ok_or_else(|| unknown_category(&name))?;
    state
        .history
        .clear(category)
        .await
        .map_err(history_error)?;
    Ok(Json(ClearResponse {
        cleared: true,
        category,
    }))
}

// ============ Fallback ============

async fn handle_not_found(method: Method, uri: Uri) -> AppError {
    if uri.path().starts_with("/api/") || uri.path() == "/api" {
        log::warn!("404 - API route not found: {} {}", method, uri);
        AppError::new(
            StatusCode::NOT_FOUND,
            "ROUTE_NOT_FOUND",
            "API route not found",
        )
    } else {
        AppError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Not found")
    }
}
