//! Liveness probe
//!
//! Answers from the process alone; the engine connection is not consulted.

use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use super::response::Response;

/// `GET /health` body: the common envelope plus the crate version
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub response: Response,
    pub version: String,
}

pub fn health_routes() -> Router {
    Router::new().route("/health", get(health))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        response: Response::ok(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
