use crate::core::landmarks::DetectorError;
use crate::core::recommender::RecommenderError;
use crate::core::uploads::UploadError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

static HIDE_INTERNAL_DETAILS: OnceLock<bool> = OnceLock::new();

/// Set once at startup from `Config::is_production`.
pub fn hide_internal_details(hide: bool) {
    if HIDE_INTERNAL_DETAILS.set(hide).is_err() {
        tracing::warn!("internal error detail policy was already set");
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("No face detected in the uploaded image")]
    NoFaceDetected,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NoFaceDetected => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(format!("I/O error: {}", err))
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::TooLarge { max_bytes } => {
                ApiError::PayloadTooLarge(format!("maximum size is {} bytes", max_bytes))
            }
            UploadError::RequestTooLarge => {
                ApiError::PayloadTooLarge("request body exceeds the server limit".to_string())
            }
            UploadError::Io(e) => ApiError::from(e),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<DetectorError> for ApiError {
    fn from(err: DetectorError) -> Self {
        match err {
            DetectorError::NoFace => ApiError::NoFaceDetected,
            DetectorError::InvalidLandmarks(msg) => ApiError::Upstream(msg),
            other => ApiError::Upstream(format!("landmark service: {}", other)),
        }
    }
}

impl From<RecommenderError> for ApiError {
    fn from(err: RecommenderError) -> Self {
        match err {
            RecommenderError::NotConfigured => {
                ApiError::Unavailable("recommendation service is not configured".to_string())
            }
            RecommenderError::RateLimited => ApiError::Unavailable(
                "recommendation service is busy, try again shortly".to_string(),
            ),
            other => ApiError::Upstream(format!("recommendation service: {}", other)),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    detail: String,
}

impl ApiError {
    fn render(self, hide_internal: bool) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::warn!("request rejected: {}", self);
        }

        let detail = match &self {
            ApiError::Internal(_) if hide_internal => "An internal error occurred".to_string(),
            _ => self.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                status: "error",
                detail,
            }),
        )
            .into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hide_internal = HIDE_INTERNAL_DETAILS.get().copied().unwrap_or(false);
        self.render(hide_internal)
    }
}
