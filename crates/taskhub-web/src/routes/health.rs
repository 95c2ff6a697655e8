//! Health check endpoint: GET /api/health

use axum::response::Json;
use serde::Serialize;

use crate::error::Result;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// GET /api/health - Liveness check, no authentication
pub async fn health_check() -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}
