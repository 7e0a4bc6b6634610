// Common DTOs and error mapping for the HTTP API

use axum::http::StatusCode;
use axum::Json;
use genpool_dispatch::{AdmissionRejection, StoreError};
use genpool_schemas::AdmissionReason;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Standard error response for API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message describing what went wrong.
    pub error: String,
    /// Machine-readable rejection reason, present on admission rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<AdmissionReason>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: AdmissionReason) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Convert to axum response tuple
    pub fn into_response(self, status: StatusCode) -> (StatusCode, Json<Self>) {
        (status, Json(self))
    }
}

/// Error half of every handler result
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status for an admission rejection
pub fn rejection_status(reason: AdmissionReason) -> StatusCode {
    match reason {
        AdmissionReason::QueueFull => StatusCode::TOO_MANY_REQUESTS,
        AdmissionReason::EmptyPrompt | AdmissionReason::InvalidType => StatusCode::BAD_REQUEST,
        AdmissionReason::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<AdmissionRejection> for ErrorResponse {
    fn from(rejection: AdmissionRejection) -> Self {
        ErrorResponse::new(rejection.to_string()).with_reason(rejection.reason())
    }
}

/// Map a store failure to a response
pub fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::InvalidName(name) => {
            ErrorResponse::new(format!("invalid file name: {name}"))
                .into_response(StatusCode::BAD_REQUEST)
        }
        StoreError::NotFound(name) => {
            ErrorResponse::new(format!("not found: {name}")).into_response(StatusCode::NOT_FOUND)
        }
        other => {
            tracing::error!(error = %other, "Output store failure");
            ErrorResponse::new("internal error").into_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Run a blocking store operation off the async workers
pub async fn blocking<T, F>(op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(result) => result.map_err(store_error),
        Err(e) => {
            tracing::error!(error = %e, "Blocking store task failed");
            Err(ErrorResponse::new("internal error").into_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}
