use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CILensError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid webhook: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, CILensError>;

impl CILensError {
    /// HTTP status reported to the webhook sender for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CILensError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Client errors carry their message; server errors are logged and
        // reported generically.
        let message = match &self {
            Self::Authentication(_) | Self::Validation(_) => self.to_string(),
            Self::Config(_) => "webhook receiver is not configured".to_string(),
            _ => {
                error!("Webhook request failed: {self}");
                "internal server error".to_string()
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            CILensError::Authentication("bad".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            CILensError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CILensError::Config("no secret".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            CILensError::Task("join".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_server_errors_hide_details() {
        let response = CILensError::Task("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
