//! Health check endpoints.

use axum::{Json, Router, extract::State, routing::get};
use sea_orm::ConnectionTrait;
use serde::Serialize;
use tracing::warn;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Database reachability.
    pub database: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.db.execute_unprepared("SELECT 1").await {
        Ok(_) => "up",
        Err(e) => {
            warn!(error = %e, "database ping failed");
            "down"
        }
    };

    Json(HealthResponse {
        status: "healthy",
        database,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Creates health check routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
