//! Liveness endpoint.

use axum::Json;

use crate::models::HealthResponse;

/// `GET /health`. Runs outside every pipeline, so it needs no tenant.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: edugate_core::version().into(),
    })
}
