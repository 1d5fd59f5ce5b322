//! Request-level error taxonomy.
//!
//! Engine failures never show up here: adapters turn them into inline error
//! text. What remains are input problems and missing environment pieces, both
//! of which halt the current request without touching the process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed request (missing file, unknown engine or strategy)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// File type outside PNG/JPEG/PDF
    #[error("Unsupported file type: {0}. Please upload a PDF or image file")]
    UnsupportedType(String),

    /// Upload could not be decoded as the type it claims to be
    #[error("Could not read {kind}: {reason}")]
    CorruptInput { kind: &'static str, reason: String },

    /// Missing external system dependency (e.g. the PDF rasterizer)
    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::CorruptInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Environment(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::UnsupportedType("docx".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            AppError::CorruptInput { kind: "PDF", reason: "eof".into() }.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Environment("pdftoppm missing".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(anyhow::anyhow!("x")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
