//! Error handling at the HTTP boundary

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, info};

use crate::pipeline::PipelineFailure;

/// Errors a handler can return. Pipeline failures are not in here, they are
/// reported in the response body, see [`crate::web`].
#[derive(Debug)]
pub enum PetstyleError {
    /// A required form field was missing
    MissingField(&'static str),
    /// The request body couldn't be read
    BadRequest(String),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl std::fmt::Display for PetstyleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "Missing required field: {field}"),
            Self::BadRequest(message) => write!(f, "Invalid request: {message}"),
            Self::InternalServerError(_) => write!(f, "Internal server error"),
        }
    }
}

impl std::error::Error for PetstyleError {}

impl From<axum::extract::multipart::MultipartError> for PetstyleError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        PetstyleError::BadRequest(err.body_text())
    }
}

impl From<axum::extract::multipart::MultipartRejection> for PetstyleError {
    fn from(rejection: axum::extract::multipart::MultipartRejection) -> Self {
        PetstyleError::BadRequest(rejection.body_text())
    }
}

impl From<std::io::Error> for PetstyleError {
    fn from(err: std::io::Error) -> Self {
        PetstyleError::InternalServerError(err.to_string())
    }
}

impl IntoResponse for PetstyleError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            PetstyleError::MissingField(field) => {
                info!("Rejected request without {field}");
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PetstyleError::BadRequest(message) => {
                info!("Bad request received: {message}");
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PetstyleError::InternalServerError(message) => {
                error!("Internal server error: {}", message);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Body returned when a pipeline run fails. The HTTP status stays 200.
pub fn failure_body(failure: &PipelineFailure) -> serde_json::Value {
    error!("Image pipeline failed during {}: {}", failure.stage, failure.error);
    json!({ "error": failure.error.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn missing_field_is_unprocessable_json() {
        let response = PetstyleError::MissingField("file").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await["error"],
            "Missing required field: file"
        );
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let response =
            PetstyleError::InternalServerError("disk on fire".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "Internal server error");
    }
}
