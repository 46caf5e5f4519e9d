use crate::config::ApiConfig;
use crate::error::{LocationError, PersistenceError, QrCodeError, QrCodeUrlError};
use crate::location_service::{GenerateLocationRequest, LocationCreated, LocationService};
use crate::qr_generator::generate_qr_code;
use crate::record_store::LocationRecord;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub locations: Arc<LocationService>,
    pub presigned_url_expiry: Duration,
    pub max_qr_dimension: u32,
}

/// Body of `POST /api/v1/qr-codes`
#[derive(Debug, Deserialize)]
pub struct QrCodeRequest {
    pub data: String,
    pub width: u32,
    pub height: u32,
}

/// Presigned URL for a location's QR code
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeUrlResponse {
    pub object_id: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

impl From<QrCodeError> for ApiError {
    fn from(e: QrCodeError) -> Self {
        match e {
            QrCodeError::Encoding(_) => {
                api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string(), "ENCODING_ERROR")
            }
            QrCodeError::InvalidDimensions { .. } => {
                api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_DIMENSIONS")
            }
            QrCodeError::Io(_) => {
                api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "IO_ERROR")
            }
        }
    }
}

impl From<PersistenceError> for ApiError {
    fn from(e: PersistenceError) -> Self {
        api_error(StatusCode::BAD_GATEWAY, e.to_string(), "PERSISTENCE_ERROR")
    }
}

impl From<QrCodeUrlError> for ApiError {
    fn from(e: QrCodeUrlError) -> Self {
        match e {
            QrCodeUrlError::Persistence(e) => e.into(),
            QrCodeUrlError::Presign { .. } => api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate presigned URL",
                "PRESIGN_ERROR",
            ),
        }
    }
}

impl From<LocationError> for ApiError {
    fn from(e: LocationError) -> Self {
        match e {
            LocationError::QrCode(e) => e.into(),
            LocationError::Upload(e) => {
                api_error(StatusCode::BAD_GATEWAY, e.to_string(), "UPLOAD_ERROR")
            }
            LocationError::Persistence(e) => e.into(),
        }
    }
}

fn location_not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "Location not found", "NOT_FOUND")
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/qr-codes", post(create_qr_code))
        .route("/api/v1/locations", post(create_location))
        .route("/api/v1/locations/:object_id", get(get_location))
        .route("/api/v1/locations/:object_id/qr-code-url", get(get_qr_code_url))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "location-service"
    }))
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.locations.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Render a QR code and return it as `image/png`
#[instrument(skip(state, request), fields(width = request.width, height = request.height))]
async fn create_qr_code(
    State(state): State<AppState>,
    Json(request): Json<QrCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.width > state.max_qr_dimension || request.height > state.max_qr_dimension {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("Dimensions must not exceed {}", state.max_qr_dimension),
            "INVALID_DIMENSIONS",
        ));
    }

    let png = generate_qr_code(&request.data, request.width, request.height)?;

    metrics::counter!("qr_codes.generated").increment(1);

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// Register a location
#[instrument(skip(state, request))]
async fn create_location(
    State(state): State<AppState>,
    Json(request): Json<GenerateLocationRequest>,
) -> Result<(StatusCode, Json<LocationCreated>), ApiError> {
    let created = state
        .locations
        .generate_location(&request)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to register location");
            ApiError::from(e)
        })?;

    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state))]
async fn get_location(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
) -> Result<Json<LocationRecord>, ApiError> {
    let record = state.locations.get_location(&object_id).await.map_err(|e| {
        error!(error = %e, "Failed to get location");
        ApiError::from(e)
    })?;

    record.map(Json).ok_or_else(location_not_found)
}

#[instrument(skip(state))]
async fn get_qr_code_url(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
) -> Result<Json<QrCodeUrlResponse>, ApiError> {
    let presigned = state
        .locations
        .qr_code_url(&object_id, state.presigned_url_expiry)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to generate QR code URL");
            ApiError::from(e)
        })?;

    let (url, expires_at) = presigned.ok_or_else(location_not_found)?;

    Ok(Json(QrCodeUrlResponse {
        object_id,
        url,
        expires_at,
    }))
}

/// Start the HTTP API server, returning when `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting location API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
