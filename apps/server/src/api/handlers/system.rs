//! Root and health endpoints

use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API description
pub async fn root() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "message": "FHIR patient graph API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "health": "/health",
                "patients": "/patients",
                "patient_details": "/patients/{id}",
                "patient_encounters": "/patients/{id}/encounters",
            }
        })),
    )
        .into_response()
}

/// Probe the graph store. 503 when it cannot be reached.
pub async fn health(State(state): State<AppState>) -> Response {
    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "connected" })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": "Database connection unhealthy" })),
            )
                .into_response()
        }
    }
}
