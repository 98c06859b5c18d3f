use crate::domain::{extract_write_key, IngestionService};
use crate::http::ApiError;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use common::domain::EventType;
use std::sync::Arc;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionService>,
}

impl AppState {
    pub fn new(ingestion: Arc<IngestionService>) -> Self {
        Self { ingestion }
    }
}

/// POST /api/identify
pub async fn identify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    accept(&state, EventType::Identify, &headers, &body).await
}

/// POST /api/track
pub async fn track(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    accept(&state, EventType::Track, &headers, &body).await
}

/// GET /health
pub async fn health_check() -> &'static str {
    "OK"
}

async fn accept(
    state: &AppState,
    kind: EventType,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<StatusCode, ApiError> {
    // A non UTF-8 header counts as missing
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    state
        .ingestion
        .ingest(kind, body, extract_write_key(authorization))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
