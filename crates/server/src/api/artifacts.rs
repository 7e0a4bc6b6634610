// Read-only routes over the output store

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use genpool_dispatch::store::is_visible_image;
use genpool_dispatch::{ArtifactName, StoreError};
use genpool_schemas::{MetadataRecord, StatsResponse};

use super::common::{blocking, store_error, ApiError, ErrorResponse};
use super::AppState;

/// Create artifact routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/stats", get(stats))
        .route("/api/images", get(list_images))
        .route("/api/meta/:filename", get(get_metadata))
        .route("/img/:filename", get(get_image))
        .with_state(state)
}

/// GET /api/stats - Queue depth, published images and live workers
#[utoipa::path(
    get,
    path = "/api/stats",
    responses(
        (status = 200, description = "Current counters", body = StatsResponse),
        (status = 500, description = "Output store unreadable", body = ErrorResponse)
    ),
    tag = "artifacts"
)]
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let store = state.store.clone();
    let total = blocking(move || store.count()).await?;

    Ok(Json(StatsResponse {
        queue: state.gate.queue().len(),
        total,
        workers: state.pool.live_workers(),
    }))
}

/// GET /api/images - Newest published images
#[utoipa::path(
    get,
    path = "/api/images",
    responses(
        (status = 200, description = "Image names, newest first", body = Vec<String>),
        (status = 500, description = "Output store unreadable", body = ErrorResponse)
    ),
    tag = "artifacts"
)]
pub async fn list_images(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let store = state.store.clone();
    let limit = state.listing_page_size;
    let names = blocking(move || store.list_recent(limit)).await?;
    Ok(Json(names))
}

/// GET /api/meta/:filename - Metadata for one image
#[utoipa::path(
    get,
    path = "/api/meta/{filename}",
    params(("filename" = String, Path, description = "Image file name")),
    responses(
        (status = 200, description = "Recorded or reconstructed metadata", body = MetadataRecord),
        (status = 400, description = "Invalid file name", body = ErrorResponse),
        (status = 404, description = "No such image", body = ErrorResponse)
    ),
    tag = "artifacts"
)]
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<MetadataRecord>, ApiError> {
    let name = ArtifactName::parse(&filename).map_err(store_error)?;
    let store = state.store.clone();
    let record = blocking(move || store.metadata(&name)).await?;
    Ok(Json(record))
}

/// GET /img/:filename - PNG bytes of one image
#[utoipa::path(
    get,
    path = "/img/{filename}",
    params(("filename" = String, Path, description = "Image file name")),
    responses(
        (status = 200, description = "PNG image", body = Vec<u8>, content_type = "image/png"),
        (status = 400, description = "Invalid file name", body = ErrorResponse),
        (status = 404, description = "No such image", body = ErrorResponse)
    ),
    tag = "artifacts"
)]
pub async fn get_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let name = ArtifactName::parse(&filename).map_err(store_error)?;
    if !is_visible_image(name.as_str()) {
        return Err(store_error(StoreError::NotFound(filename)));
    }

    let store = state.store.clone();
    let bytes = blocking(move || store.read_image(&name)).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    )
        .into_response())
}
