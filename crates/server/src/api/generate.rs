// Task submission route

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use genpool_schemas::{GenerateAccepted, GenerateRequest};

use super::common::{rejection_status, ApiError, ErrorResponse};
use super::AppState;

/// Create submission routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .with_state(state)
}

/// POST /api/generate - Submit a generation task
///
/// A body that is not a JSON object is treated as an empty request, which
/// the gate then rejects for its missing prompt (unless the queue is full).
#[utoipa::path(
    post,
    path = "/api/generate",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Task admitted", body = GenerateAccepted),
        (status = 400, description = "Empty prompt or unreadable field", body = ErrorResponse),
        (status = 429, description = "Queue is full", body = ErrorResponse),
        (status = 503, description = "Service is shutting down", body = ErrorResponse)
    ),
    tag = "generation"
)]
pub async fn generate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<GenerateAccepted>, ApiError> {
    let request = parse_request(&body);

    match state.gate.submit(&request) {
        Ok(admitted) => Ok(Json(GenerateAccepted::new(
            admitted.seed,
            admitted.width,
            admitted.height,
            admitted.queue_position,
        ))),
        Err(rejection) => {
            let status = rejection_status(rejection.reason());
            Err(ErrorResponse::from(rejection).into_response(status))
        }
    }
}

fn parse_request(body: &[u8]) -> GenerateRequest {
    if body.is_empty() {
        return GenerateRequest::default();
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "Unreadable submission body, treating as empty");
        GenerateRequest::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_tolerates_garbage() {
        assert_eq!(parse_request(b""), GenerateRequest::default());
        assert_eq!(parse_request(b"not json"), GenerateRequest::default());
        assert_eq!(parse_request(b"[1, 2]"), GenerateRequest::default());
        assert_eq!(
            parse_request(br#"{"prompt": "a cat"}"#),
            GenerateRequest::new("a cat")
        );
    }
}
