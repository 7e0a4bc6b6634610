// HTTP API routes
//
// Handlers are thin: they parse, call into the dispatch core, and map the
// outcome to a status code. Store access runs on the blocking pool.

pub mod artifacts;
pub mod common;
pub mod generate;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Json, Router};
use genpool_dispatch::{AdmissionGate, ArtifactStore, WorkerPool};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::{OpenApi, ToSchema};

use crate::openapi::ApiDoc;

pub use common::ErrorResponse;

/// App state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AdmissionGate>,
    pub store: ArtifactStore,
    pub pool: Arc<WorkerPool>,
    pub listing_page_size: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /health - Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "health"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the complete application router
pub fn router(state: AppState, cors_origins: Vec<HeaderValue>) -> Router {
    let app = Router::new()
        .route("/health", get(health))
        .route("/api-doc/openapi.json", get(openapi_json))
        .merge(generate::routes(state.clone()))
        .merge(artifacts::routes(state));

    // CORS only when origins are configured; same-origin otherwise
    let app = if cors_origins.is_empty() {
        app
    } else {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN]),
        )
    };

    app.layer(TraceLayer::new_for_http())
}
