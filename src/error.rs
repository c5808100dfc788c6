use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures of the image enhancement pipeline itself.
#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Enhance(#[from] EnhanceError),

    #[error("Text extraction failed ({provider}): {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error("Essay evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Unknown text extraction provider: {0}")]
    UnknownProvider(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Enhance(EnhanceError::Decode(_)) => "DECODE_ERROR",
            AppError::Enhance(EnhanceError::Encode(_)) => "ENCODE_ERROR",
            AppError::Provider { .. } => "PROVIDER_ERROR",
            AppError::EvaluationFailed(_) => "EVALUATION_FAILED",
            AppError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            AppError::NotConfigured(_) => "PROVIDER_NOT_CONFIGURED",
            AppError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            AppError::MissingFile => "MISSING_FILE",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::Settings(_) => "SETTINGS_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Enhance(EnhanceError::Decode(_)) => StatusCode::BAD_REQUEST,
            AppError::Enhance(EnhanceError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Provider { .. } | AppError::EvaluationFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::UnknownProvider(_) => StatusCode::NOT_FOUND,
            AppError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::MissingFile | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Settings(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        } else {
            tracing::warn!(code = self.code(), "{}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_maps_to_bad_request() {
        let err = AppError::from(EnhanceError::Decode("bad bytes".to_string()));
        assert_eq!(err.code(), "DECODE_ERROR");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Failed to decode image: bad bytes");
    }

    #[test]
    fn test_provider_error_is_bad_gateway() {
        let err = AppError::provider("vision", "quota exceeded");
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            err.to_string(),
            "Text extraction failed (vision): quota exceeded"
        );
    }
}
